use super::{Attributes, PathIter, PictureStore, ReadSeek, StoreError};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

/// Store backed by a local directory.
#[derive(Debug)]
pub struct FsStore {
    uri: String,
    root: PathBuf,
}

impl FsStore {
    /// Open the directory named by a `file://` URI. The directory must exist.
    pub fn open(url: &Url) -> Result<Self, StoreError> {
        let root = url
            .to_file_path()
            .map_err(|_| StoreError::InvalidLocation(url.to_string()))?;
        Self::at(root).map(|mut store| {
            store.uri = url.to_string();
            store
        })
    }

    pub fn at(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::NotFound(root.display().to_string()));
        }
        let uri = Url::from_directory_path(&root)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| root.display().to_string());
        Ok(Self { uri, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store key onto the filesystem, refusing keys that escape the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoreError::InvalidLocation(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Result<String, StoreError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| StoreError::InvalidLocation(path.display().to_string()))?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Ok(parts.join("/"))
    }

    fn walk<'a>(&'a self, root: &str) -> PathIter<'a> {
        let dir = match self.resolve(root) {
            Ok(dir) => dir,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        if !dir.exists() {
            return Box::new(std::iter::once(Err(StoreError::NotFound(root.to_string()))));
        }

        let entries = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(self.key_for(entry.path())),
                Ok(_) => None,
                Err(e) => Some(Err(StoreError::Walk(e.to_string()))),
            });
        Box::new(entries)
    }
}

impl PictureStore for FsStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn gather_pictures<'a>(&'a self, roots: &'a [String]) -> PathIter<'a> {
        Box::new(roots.iter().flat_map(move |root| self.walk(root)))
    }

    fn new_reader(&self, path: &str) -> Result<Box<dyn ReadSeek>, StoreError> {
        let file = File::open(self.resolve(path)?).map_err(|e| StoreError::io(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn new_writer(&self, path: &str) -> Result<Box<dyn Write + Send>, StoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(path, e))?;
        }
        let file = File::create(&full).map_err(|e| StoreError::io(path, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        fs::remove_file(self.resolve(path)?).map_err(|e| StoreError::io(path, e))
    }

    fn attributes(&self, path: &str) -> Result<Attributes, StoreError> {
        let meta = fs::metadata(self.resolve(path)?).map_err(|e| StoreError::io(path, e))?;
        let modified = meta.modified().map_err(|e| StoreError::io(path, e))?;
        Ok(Attributes {
            modified,
            size: meta.len(),
        })
    }
}
