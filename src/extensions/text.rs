//! Long-form text placed on its own page before a picture.

use super::caption::load_lookup_table;
use super::{ExtensionError, TextRegistry};
use crate::store::PictureStore;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

pub trait Text: Send + Sync {
    /// Prose for `path`; empty means no text page.
    fn body(&self, store: &dyn PictureStore, path: &str) -> Result<String, ExtensionError>;
}

pub struct NoText;

impl Text for NoText {
    fn body(&self, _: &dyn PictureStore, _: &str) -> Result<String, ExtensionError> {
        Ok(String::new())
    }
}

/// `json:///path/to/texts.json`
pub struct JsonText {
    table: HashMap<String, String>,
}

impl JsonText {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }
}

impl Text for JsonText {
    fn body(&self, _: &dyn PictureStore, path: &str) -> Result<String, ExtensionError> {
        Ok(self.table.get(path).cloned().unwrap_or_default())
    }
}

pub fn register_defaults(registry: &TextRegistry) -> Result<(), ExtensionError> {
    registry.register("none", |_: &Url| -> Result<Arc<dyn Text>, ExtensionError> {
        Ok(Arc::new(NoText))
    })?;
    registry.register("json", |url: &Url| -> Result<Arc<dyn Text>, ExtensionError> {
        Ok(Arc::new(JsonText::new(load_lookup_table(url)?)))
    })?;
    Ok(())
}
