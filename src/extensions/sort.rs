//! Sorters reorder the gathered pictures before any page is laid out.

use super::{ExtensionError, SorterRegistry};
use crate::picture::Picture;
use crate::store::PictureStore;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::warn;
use url::Url;

pub trait Sorter: Send + Sync {
    /// `store` is the source store the pictures were gathered from.
    fn sort(
        &self,
        store: &dyn PictureStore,
        pictures: Vec<Picture>,
    ) -> Result<Vec<Picture>, ExtensionError>;
}

/// `modtime://` orders by (modification time in seconds, size).
///
/// Pictures whose attributes cannot be read have no key and are dropped,
/// with a warning. Ties keep gathered order.
pub struct ModtimeSorter;

impl Sorter for ModtimeSorter {
    fn sort(
        &self,
        store: &dyn PictureStore,
        pictures: Vec<Picture>,
    ) -> Result<Vec<Picture>, ExtensionError> {
        let mut keyed: Vec<((u64, u64), Picture)> = pictures
            .into_iter()
            .filter_map(|picture| match store.attributes(&picture.source_path) {
                Ok(attrs) => {
                    let secs = attrs
                        .modified
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    Some(((secs, attrs.size), picture))
                }
                Err(e) => {
                    warn!(path = %picture.source_path, error = %e, "no sort key, dropping picture");
                    None
                }
            })
            .collect();

        keyed.sort_by_key(|(key, _)| *key);
        Ok(keyed.into_iter().map(|(_, picture)| picture).collect())
    }
}

/// `path://` orders lexically by source path.
pub struct PathSorter;

impl Sorter for PathSorter {
    fn sort(
        &self,
        _: &dyn PictureStore,
        mut pictures: Vec<Picture>,
    ) -> Result<Vec<Picture>, ExtensionError> {
        pictures.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        Ok(pictures)
    }
}

pub fn register_defaults(registry: &SorterRegistry) -> Result<(), ExtensionError> {
    registry.register("modtime", |_: &Url| -> Result<Arc<dyn Sorter>, ExtensionError> {
        Ok(Arc::new(ModtimeSorter))
    })?;
    registry.register("path", |_: &Url| -> Result<Arc<dyn Sorter>, ExtensionError> {
        Ok(Arc::new(PathSorter))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::{Duration, SystemTime};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn names(pictures: &[Picture]) -> Vec<&str> {
        pictures.iter().map(|p| p.source_path.as_str()).collect()
    }

    #[test]
    fn modtime_orders_by_time_then_size() {
        let store = MemoryStore::new("mem://");
        store.put_with_time("late.jpg", vec![0; 1], at(300));
        store.put_with_time("early-big.jpg", vec![0; 9], at(100));
        store.put_with_time("early-small.jpg", vec![0; 2], at(100));

        let pictures = ["late.jpg", "early-big.jpg", "early-small.jpg"]
            .into_iter()
            .map(Picture::new)
            .collect();
        let sorted = ModtimeSorter.sort(&store, pictures).unwrap();

        assert_eq!(
            names(&sorted),
            vec!["early-small.jpg", "early-big.jpg", "late.jpg"]
        );
    }

    #[test]
    fn modtime_drops_pictures_without_attributes() {
        let store = MemoryStore::new("mem://");
        store.put_with_time("a.jpg", vec![0], at(1));

        let pictures = vec![Picture::new("ghost.jpg"), Picture::new("a.jpg")];
        let sorted = ModtimeSorter.sort(&store, pictures).unwrap();
        assert_eq!(names(&sorted), vec!["a.jpg"]);
    }

    #[test]
    fn path_sorter_is_lexical() {
        let store = MemoryStore::new("mem://");
        let pictures = vec![
            Picture::new("b/2.jpg"),
            Picture::new("a/9.jpg"),
            Picture::new("b/1.jpg"),
        ];
        let sorted = PathSorter.sort(&store, pictures).unwrap();
        assert_eq!(names(&sorted), vec!["a/9.jpg", "b/1.jpg", "b/2.jpg"]);
    }
}
