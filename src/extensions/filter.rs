//! Inclusion filters: decide whether a gathered path becomes a picture.

use super::{ExtensionError, FilterRegistry};
use crate::registry::query_param;
use crate::store::PictureStore;
use regex::Regex;
use std::sync::Arc;
use url::Url;

pub trait Filter: Send + Sync {
    /// `true` keeps the path. Must not have side effects.
    fn accept(&self, store: &dyn PictureStore, path: &str) -> bool;
}

/// Logical AND over child filters; the first rejection short-circuits.
/// An empty set accepts everything.
pub struct MultiFilter {
    filters: Vec<Arc<dyn Filter>>,
}

impl MultiFilter {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for MultiFilter {
    fn accept(&self, store: &dyn PictureStore, path: &str) -> bool {
        self.filters.iter().all(|f| f.accept(store, path))
    }
}

/// `any://`
pub struct AnyFilter;

impl Filter for AnyFilter {
    fn accept(&self, _: &dyn PictureStore, _: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Include,
    Exclude,
}

/// `regexp://include?pattern=...` or `regexp://exclude?pattern=...`,
/// matched against the picture's store path.
pub struct RegexpFilter {
    mode: Mode,
    pattern: Regex,
}

impl RegexpFilter {
    pub fn new(mode: Mode, pattern: &str) -> Result<Self, ExtensionError> {
        let pattern =
            Regex::new(pattern).map_err(|e| ExtensionError::invalid("pattern", e.to_string()))?;
        Ok(Self { mode, pattern })
    }

    pub fn from_uri(url: &Url) -> Result<Self, ExtensionError> {
        let mode = match url.host_str().unwrap_or("") {
            "" | "include" => Mode::Include,
            "exclude" => Mode::Exclude,
            other => {
                return Err(ExtensionError::invalid(
                    "mode",
                    format!("expected 'include' or 'exclude', got '{other}'"),
                ));
            }
        };
        let pattern = query_param(url, "pattern")
            .ok_or_else(|| ExtensionError::invalid("pattern", "missing"))?;
        Self::new(mode, &pattern)
    }
}

impl Filter for RegexpFilter {
    fn accept(&self, _: &dyn PictureStore, path: &str) -> bool {
        let matched = self.pattern.is_match(path);
        match self.mode {
            Mode::Include => matched,
            Mode::Exclude => !matched,
        }
    }
}

pub fn register_defaults(registry: &FilterRegistry) -> Result<(), ExtensionError> {
    registry.register("any", |_: &Url| -> Result<Arc<dyn Filter>, ExtensionError> {
        Ok(Arc::new(AnyFilter))
    })?;
    registry.register("regexp", |url: &Url| -> Result<Arc<dyn Filter>, ExtensionError> {
        Ok(Arc::new(RegexpFilter::from_uri(url)?))
    })?;
    Ok(())
}
