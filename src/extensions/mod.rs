//! Extension points of the pipeline.
//!
//! Each stage of the per-picture pipeline is a trait object looked up by URI
//! scheme in its own [`ExtensionRegistry`]:
//!
//! | Trait | Stage | Composite |
//! |---|---|---|
//! | [`Filter`] | include or skip a path | [`MultiFilter`] (logical AND) |
//! | [`Caption`] | short text under the image | [`MultiCaption`] |
//! | [`Text`] | prose on a page before the image | — |
//! | [`Process`] | transform into a temp artifact | [`MultiProcess`] (chained) |
//! | [`Sorter`] | reorder the gathered set | — |
//! | [`ProgressMonitor`] | advisory progress reporting | — |
//!
//! All registries are owned by one [`Extensions`] value built at startup and
//! passed by reference, never stored in globals.

pub mod caption;
pub mod filter;
pub mod process;
pub mod progress;
pub mod sort;
pub mod text;

pub use caption::{Caption, MultiCaption};
pub use filter::{Filter, MultiFilter};
pub use process::{MultiProcess, Process, Processed};
pub use progress::{Event, ProgressMonitor};
pub use sort::Sorter;
pub use text::Text;

use crate::registry::{ExtensionRegistry, RegistryError};
use crate::store::{self, StoreError, StoreRegistry};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] crate::imaging::BackendError),
    #[error("{0}")]
    Artifact(#[from] crate::artifacts::ArtifactError),
    #[error("{0}")]
    Failed(String),
}

impl ExtensionError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ExtensionError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type FilterRegistry = ExtensionRegistry<dyn Filter, ExtensionError>;
pub type CaptionRegistry = ExtensionRegistry<dyn Caption, ExtensionError>;
pub type TextRegistry = ExtensionRegistry<dyn Text, ExtensionError>;
pub type ProcessRegistry = ExtensionRegistry<dyn Process, ExtensionError>;
pub type SorterRegistry = ExtensionRegistry<dyn Sorter, ExtensionError>;
pub type MonitorRegistry = ExtensionRegistry<dyn ProgressMonitor, ExtensionError>;

/// Every registry a run resolves URIs against.
pub struct Extensions {
    pub filters: FilterRegistry,
    pub captions: CaptionRegistry,
    pub texts: TextRegistry,
    pub processes: ProcessRegistry,
    pub sorters: SorterRegistry,
    pub monitors: MonitorRegistry,
    pub stores: StoreRegistry,
}

impl Extensions {
    /// Empty registries, for callers that want full control.
    pub fn new() -> Self {
        Self {
            filters: ExtensionRegistry::new("filter"),
            captions: ExtensionRegistry::new("caption"),
            texts: ExtensionRegistry::new("text"),
            processes: ExtensionRegistry::new("process"),
            sorters: ExtensionRegistry::new("sort"),
            monitors: ExtensionRegistry::new("progress monitor"),
            stores: ExtensionRegistry::new("store"),
        }
    }

    /// Registries pre-populated with the built-in strategies and drivers.
    pub fn with_defaults() -> Result<Self, ExtensionError> {
        let ext = Self::new();
        filter::register_defaults(&ext.filters)?;
        caption::register_defaults(&ext.captions)?;
        text::register_defaults(&ext.texts)?;
        process::register_defaults(&ext.processes)?;
        sort::register_defaults(&ext.sorters)?;
        progress::register_defaults(&ext.monitors)?;
        store::register_defaults(&ext.stores)?;
        Ok(ext)
    }

    /// `(kind, schemes)` for every registry, in a stable order.
    pub fn catalogue(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            (self.filters.kind(), self.filters.list_schemes()),
            (self.captions.kind(), self.captions.list_schemes()),
            (self.texts.kind(), self.texts.list_schemes()),
            (self.processes.kind(), self.processes.list_schemes()),
            (self.sorters.kind(), self.sorters.list_schemes()),
            (self.monitors.kind(), self.monitors.list_schemes()),
            (self.stores.kind(), self.stores.list_schemes()),
        ]
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::new()
    }
}
