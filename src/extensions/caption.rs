//! Captions: short strings drawn under each picture.
//!
//! An empty string means "no caption". Built-ins:
//!
//! - `none://` never captions
//! - `filename://` uses the file name; `?parent=true` prefixes the folder
//! - `modtime://` formats the modification time (`?format=` strftime,
//!   default `%B %d, %Y`)
//! - `json:///path/to/captions.json` looks the store path up in a JSON object

use super::{CaptionRegistry, ExtensionError};
use crate::registry::{query_flag, query_param};
use crate::store::{self, PictureStore};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub const DEFAULT_MODTIME_FORMAT: &str = "%B %d, %Y";

pub trait Caption: Send + Sync {
    fn text(&self, store: &dyn PictureStore, path: &str) -> Result<String, ExtensionError>;
}

/// Runs child captions in order.
///
/// By default the first non-empty result wins. With `combined` every
/// non-empty result is joined with a space. With `allow_empty == false` an
/// all-empty outcome is an error, which skips the picture.
pub struct MultiCaption {
    captions: Vec<Arc<dyn Caption>>,
    combined: bool,
    allow_empty: bool,
}

impl MultiCaption {
    pub fn new(captions: Vec<Arc<dyn Caption>>) -> Self {
        Self {
            captions,
            combined: false,
            allow_empty: true,
        }
    }

    pub fn combined(mut self, combined: bool) -> Self {
        self.combined = combined;
        self
    }

    pub fn allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }
}

impl Caption for MultiCaption {
    fn text(&self, store: &dyn PictureStore, path: &str) -> Result<String, ExtensionError> {
        let mut parts = Vec::new();

        for caption in &self.captions {
            let text = caption.text(store, path)?;
            if text.is_empty() {
                continue;
            }
            if !self.combined {
                return Ok(text);
            }
            parts.push(text);
        }

        let joined = parts.join(" ");
        if joined.is_empty() && !self.allow_empty {
            return Err(ExtensionError::Failed(format!(
                "unable to derive caption for {path}"
            )));
        }
        Ok(joined)
    }
}

pub struct NoCaption;

impl Caption for NoCaption {
    fn text(&self, _: &dyn PictureStore, _: &str) -> Result<String, ExtensionError> {
        Ok(String::new())
    }
}

pub struct FilenameCaption {
    parent: bool,
}

impl FilenameCaption {
    pub fn new(parent: bool) -> Self {
        Self { parent }
    }
}

impl Caption for FilenameCaption {
    fn text(&self, _: &dyn PictureStore, path: &str) -> Result<String, ExtensionError> {
        let name = store::file_name(path);
        let folder = store::file_name(store::parent(path));
        if self.parent && !folder.is_empty() {
            Ok(format!("{folder}/{name}"))
        } else {
            Ok(name.to_string())
        }
    }
}

pub struct ModtimeCaption {
    format: String,
}

impl ModtimeCaption {
    pub fn new(format: &str) -> Result<Self, ExtensionError> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ExtensionError::invalid(
                "format",
                format!("'{format}' is not a valid strftime format"),
            ));
        }
        Ok(Self {
            format: format.to_string(),
        })
    }
}

impl Caption for ModtimeCaption {
    fn text(&self, store: &dyn PictureStore, path: &str) -> Result<String, ExtensionError> {
        let attrs = store.attributes(path)?;
        let local: DateTime<Local> = attrs.modified.into();
        Ok(local.format(&self.format).to_string())
    }
}

/// Path → string lookup loaded from a JSON object on the local disk.
pub(crate) fn load_lookup_table(url: &Url) -> Result<HashMap<String, String>, ExtensionError> {
    let path = local_path(url)?;
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// The percent-decoded filesystem path of a `json:///...` style URI.
fn local_path(url: &Url) -> Result<PathBuf, ExtensionError> {
    if url.path().is_empty() || url.path() == "/" {
        return Err(ExtensionError::invalid("path", "missing JSON file path"));
    }
    let not_local = || {
        ExtensionError::invalid("path", format!("'{}' is not a local path", url.path()))
    };
    let mut file = Url::parse("file:///").map_err(|_| not_local())?;
    file.set_path(url.path());
    file.to_file_path().map_err(|_| not_local())
}

pub struct JsonCaption {
    table: HashMap<String, String>,
}

impl JsonCaption {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }
}

impl Caption for JsonCaption {
    fn text(&self, _: &dyn PictureStore, path: &str) -> Result<String, ExtensionError> {
        Ok(self.table.get(path).cloned().unwrap_or_default())
    }
}

pub fn register_defaults(registry: &CaptionRegistry) -> Result<(), ExtensionError> {
    registry.register("none", |_: &Url| -> Result<Arc<dyn Caption>, ExtensionError> {
        Ok(Arc::new(NoCaption))
    })?;
    registry.register("filename", |url: &Url| -> Result<Arc<dyn Caption>, ExtensionError> {
        Ok(Arc::new(FilenameCaption::new(query_flag(url, "parent"))))
    })?;
    registry.register("modtime", |url: &Url| -> Result<Arc<dyn Caption>, ExtensionError> {
        let format = query_param(url, "format").unwrap_or_else(|| DEFAULT_MODTIME_FORMAT.into());
        Ok(Arc::new(ModtimeCaption::new(&format)?))
    })?;
    registry.register("json", |url: &Url| -> Result<Arc<dyn Caption>, ExtensionError> {
        Ok(Arc::new(JsonCaption::new(load_lookup_table(url)?)))
    })?;
    Ok(())
}
