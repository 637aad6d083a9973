//! Scheme-keyed factory lookup shared by every extension point.
//!
//! Strategies are named by URI (`regexp://include?pattern=^2024`,
//! `modtime://`, `file:///photos`). The scheme selects a registered factory;
//! everything after it belongs to the strategy. One [`ExtensionRegistry`]
//! exists per extension point and they all live in an explicit
//! [`Extensions`](crate::extensions::Extensions) value created at startup, so
//! there is no process-global state to race on.
//!
//! ```text
//! register("regexp", factory)      ─┐
//! create("regexp://include?p=..")  ─┴→ factory(&Url) → Arc<dyn Filter>
//! list_schemes()                    →  ["any://", "regexp://"]
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{kind} scheme '{scheme}' is already registered")]
    DuplicateScheme { kind: &'static str, scheme: String },
    #[error("unknown {kind} scheme '{scheme}://'")]
    UnknownScheme { kind: &'static str, scheme: String },
    #[error("invalid URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
}

/// Factory invoked with the parsed URI of the strategy being created.
pub type Factory<T, E> = Arc<dyn Fn(&Url) -> Result<Arc<T>, E> + Send + Sync>;

/// Generic scheme → factory table.
///
/// `T` is the (unsized) capability trait, e.g. `dyn Filter`; `E` is the error
/// type factories report. Registry failures are converted into `E` so callers
/// see a single error type per extension point.
pub struct ExtensionRegistry<T: ?Sized, E> {
    kind: &'static str,
    factories: OnceLock<RwLock<BTreeMap<String, Factory<T, E>>>>,
}

impl<T: ?Sized, E: From<RegistryError>> ExtensionRegistry<T, E> {
    pub const fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: OnceLock::new(),
        }
    }

    /// Human-readable name of the extension point ("filter", "caption", ...).
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn table(&self) -> &RwLock<BTreeMap<String, Factory<T, E>>> {
        self.factories.get_or_init(|| RwLock::new(BTreeMap::new()))
    }

    /// Bind `scheme` to `factory`. Rebinding an existing scheme is an error.
    pub fn register<F>(&self, scheme: &str, factory: F) -> Result<(), E>
    where
        F: Fn(&Url) -> Result<Arc<T>, E> + Send + Sync + 'static,
    {
        let scheme = scheme.trim_end_matches("://").to_ascii_lowercase();
        let mut table = self.table().write().unwrap_or_else(PoisonError::into_inner);

        if table.contains_key(&scheme) {
            return Err(RegistryError::DuplicateScheme {
                kind: self.kind,
                scheme,
            }
            .into());
        }

        table.insert(scheme, Arc::new(factory));
        Ok(())
    }

    /// Instantiate the strategy named by `uri`.
    ///
    /// A bare scheme (`"modtime"`) is accepted and treated as `"modtime://"`.
    pub fn create(&self, uri: &str) -> Result<Arc<T>, E> {
        let uri = normalize_uri(uri);
        let parsed = Url::parse(&uri).map_err(|source| RegistryError::InvalidUri {
            uri: uri.clone(),
            source,
        })?;

        // Clone the factory out so the lock is not held while it runs; factories
        // are allowed to consult other registries.
        let factory = {
            let table = self.table().read().unwrap_or_else(PoisonError::into_inner);
            table.get(parsed.scheme()).cloned()
        };

        match factory {
            Some(factory) => factory(&parsed),
            None => Err(RegistryError::UnknownScheme {
                kind: self.kind,
                scheme: parsed.scheme().to_string(),
            }
            .into()),
        }
    }

    pub fn contains(&self, scheme: &str) -> bool {
        let scheme = scheme.trim_end_matches("://").to_ascii_lowercase();
        self.table()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&scheme)
    }

    /// Registered schemes, sorted, each rendered as `"<scheme>://"`.
    pub fn list_schemes(&self) -> Vec<String> {
        // BTreeMap keys are already sorted.
        self.table()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|scheme| format!("{scheme}://"))
            .collect()
    }
}

/// Append `://` to a bare scheme name so it parses as a URI.
pub fn normalize_uri(uri: &str) -> String {
    let uri = uri.trim();
    if uri.contains("://") {
        uri.to_string()
    } else {
        format!("{uri}://")
    }
}

/// Read a query parameter from a strategy URI.
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Read a boolean query parameter (`true`/`1`/`yes`), defaulting to `false`.
pub fn query_flag(url: &Url, key: &str) -> bool {
    query_param(url, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}
