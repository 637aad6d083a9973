//! Storage abstraction for the three locations a run touches.
//!
//! A run opens three [`PictureStore`]s: **source** (walked for pictures),
//! **target** (receives the finished PDF) and **temporary** (scratch space
//! for rotated, processed or re-encoded artifacts). Paths inside a store are
//! `/`-separated keys relative to the store root, so a picture's path never
//! reveals which driver holds it.
//!
//! Drivers are looked up through an [`ExtensionRegistry`] like every other
//! strategy:
//!
//! | Scheme | Driver |
//! |---|---|
//! | `file://` | [`FsStore`], local directory |
//! | `mem://` | [`MemoryStore`], in-process map (tests and dry runs) |
//!
//! A bare filesystem path is promoted to a `file://` URI by [`ensure_scheme`].

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::registry::{ExtensionRegistry, RegistryError};
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid storage location '{0}'")]
    InvalidLocation(String),
    #[error("walk failed: {0}")]
    Walk(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.into())
        } else {
            StoreError::Io {
                path: path.into(),
                source,
            }
        }
    }
}

/// Size and modification time of one stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub modified: SystemTime,
    pub size: u64,
}

/// Readable, seekable stream handed out by [`PictureStore::new_reader`].
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Lazy sequence of leaf paths. Dropping it stops the walk.
pub type PathIter<'a> = Box<dyn Iterator<Item = Result<String, StoreError>> + Send + 'a>;

pub trait PictureStore: Send + Sync {
    /// The URI this store was opened from.
    fn uri(&self) -> &str;

    /// Recursively enumerate every leaf object under each root, depth-first,
    /// in name order. An empty root means the whole store.
    fn gather_pictures<'a>(&'a self, roots: &'a [String]) -> PathIter<'a>;

    fn new_reader(&self, path: &str) -> Result<Box<dyn ReadSeek>, StoreError>;

    /// Open `path` for writing, creating intermediate folders. The object is
    /// complete once the writer has been flushed or dropped.
    fn new_writer(&self, path: &str) -> Result<Box<dyn Write + Send>, StoreError>;

    fn delete(&self, path: &str) -> Result<(), StoreError>;

    fn attributes(&self, path: &str) -> Result<Attributes, StoreError>;

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Read a whole object into memory.
    fn read_all(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let mut reader = self.new_reader(path)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| StoreError::io(path, e))?;
        Ok(bytes)
    }

    /// Write a whole object.
    fn write_all(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut writer = self.new_writer(path)?;
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| StoreError::io(path, e))
    }
}

pub type StoreRegistry = ExtensionRegistry<dyn PictureStore, StoreError>;

/// Register the built-in drivers.
pub fn register_defaults(registry: &StoreRegistry) -> Result<(), StoreError> {
    registry.register("file", |url: &Url| -> Result<Arc<dyn PictureStore>, StoreError> {
        Ok(Arc::new(FsStore::open(url)?))
    })?;
    registry.register("mem", |url: &Url| -> Result<Arc<dyn PictureStore>, StoreError> {
        Ok(Arc::new(MemoryStore::new(url.as_str())))
    })?;
    Ok(())
}

/// Turn a bare path into a `file://` URI; URIs pass through untouched.
///
/// Relative paths are resolved against the current working directory.
pub fn ensure_scheme(location: &str) -> Result<String, StoreError> {
    if location.contains("://") {
        return Ok(location.to_string());
    }

    let path = Path::new(location);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| StoreError::io(location, e))?
            .join(path)
    };

    Url::from_directory_path(&absolute)
        .map(|url| url.to_string())
        .map_err(|_| StoreError::InvalidLocation(location.to_string()))
}

/// Final path component of a store key.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent folder of a store key, or `""` at the root.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}
