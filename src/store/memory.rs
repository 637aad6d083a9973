use super::{Attributes, PathIter, PictureStore, ReadSeek, StoreError};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct Object {
    data: Arc<Vec<u8>>,
    modified: SystemTime,
}

type Objects = Arc<Mutex<BTreeMap<String, Object>>>;

/// In-process store. Every `mem://` URI opens a fresh, empty store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    uri: String,
    objects: Objects,
}

impl MemoryStore {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            objects: Objects::default(),
        }
    }

    /// Insert an object directly.
    pub fn put(&self, path: &str, data: Vec<u8>) {
        self.put_with_time(path, data, SystemTime::now());
    }

    pub fn put_with_time(&self, path: &str, data: Vec<u8>, modified: SystemTime) {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        objects.insert(
            normalize(path),
            Object {
                data: Arc::new(data),
                modified,
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(&normalize(path))
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Object>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, path: &str) -> Result<Object, StoreError> {
        self.lock()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn under_root(key: &str, root: &str) -> bool {
    root.is_empty()
        || key == root
        || key
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl PictureStore for MemoryStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn gather_pictures<'a>(&'a self, roots: &'a [String]) -> PathIter<'a> {
        // Keys are snapshotted per root so writers running during the walk
        // never invalidate it.
        Box::new(roots.iter().flat_map(move |root| {
            let root = normalize(root);
            let keys: Vec<Result<String, StoreError>> = self
                .lock()
                .keys()
                .filter(|key| under_root(key, &root))
                .cloned()
                .map(Ok)
                .collect();
            if keys.is_empty() && !root.is_empty() {
                vec![Err(StoreError::NotFound(root))]
            } else {
                keys
            }
        }))
    }

    fn new_reader(&self, path: &str) -> Result<Box<dyn ReadSeek>, StoreError> {
        let object = self.get(path)?;
        Ok(Box::new(Cursor::new(object.data.as_ref().clone())))
    }

    fn new_writer(&self, path: &str) -> Result<Box<dyn Write + Send>, StoreError> {
        Ok(Box::new(MemoryWriter {
            key: normalize(path),
            buffer: Vec::new(),
            objects: Arc::clone(&self.objects),
        }))
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.lock()
            .remove(&normalize(path))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn attributes(&self, path: &str) -> Result<Attributes, StoreError> {
        let object = self.get(path)?;
        Ok(Attributes {
            modified: object.modified,
            size: object.data.len() as u64,
        })
    }
}

/// Buffers writes and publishes the object on flush and on drop.
struct MemoryWriter {
    key: String,
    buffer: Vec<u8>,
    objects: Objects,
}

impl MemoryWriter {
    fn commit(&self) {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        objects.insert(
            self.key.clone(),
            Object {
                data: Arc::new(self.buffer.clone()),
                modified: SystemTime::now(),
            },
        );
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.commit();
    }
}
