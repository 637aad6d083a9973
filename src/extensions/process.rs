//! Processes: pixel transforms applied to a picture before layout.
//!
//! A process reads `path` from a source store and, if it changes anything,
//! writes a new artifact into the target (temporary) store and returns its
//! path. `None`, or the unchanged input path, means "nothing new".

use super::{ExtensionError, ProcessRegistry};
use crate::artifacts;
use crate::imaging::{ImageBackend, RustBackend};
use crate::store::PictureStore;
use image::DynamicImage;
use std::sync::Arc;
use tracing::warn;
use url::Url;

pub trait Process: Send + Sync {
    fn transform(
        &self,
        source: &dyn PictureStore,
        target: &dyn PictureStore,
        path: &str,
    ) -> Result<Option<String>, ExtensionError>;
}

/// Where a picture lives after a process step.
pub struct Processed<'a> {
    pub store: &'a dyn PictureStore,
    pub path: String,
    /// `true` once any step produced a new artifact in the target store.
    pub changed: bool,
}

impl<'a> Processed<'a> {
    pub fn untouched(store: &'a dyn PictureStore, path: &str) -> Self {
        Self {
            store,
            path: path.to_string(),
            changed: false,
        }
    }

    /// Run one step, moving to `target` if it produced something new.
    pub fn then(
        self,
        process: &dyn Process,
        target: &'a dyn PictureStore,
    ) -> Result<Self, ExtensionError> {
        match process.transform(self.store, target, &self.path)? {
            Some(new_path) if !new_path.is_empty() && new_path != self.path => Ok(Self {
                store: target,
                path: new_path,
                changed: true,
            }),
            _ => Ok(self),
        }
    }
}

/// Chains child processes. Each step reads from wherever the previous step
/// left the picture; superseded intermediate artifacts are removed.
pub struct MultiProcess {
    processes: Vec<Arc<dyn Process>>,
}

impl MultiProcess {
    pub fn new(processes: Vec<Arc<dyn Process>>) -> Self {
        Self { processes }
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl Process for MultiProcess {
    fn transform(
        &self,
        source: &dyn PictureStore,
        target: &dyn PictureStore,
        path: &str,
    ) -> Result<Option<String>, ExtensionError> {
        let mut current = Processed::untouched(source, path);

        for process in &self.processes {
            let previous = current.changed.then(|| current.path.clone());
            current = match current.then(process.as_ref(), target) {
                Ok(next) => next,
                Err(e) => {
                    if let Some(previous) = &previous {
                        remove_intermediate(target, previous);
                    }
                    return Err(e);
                }
            };

            if let Some(previous) = previous.filter(|p| *p != current.path) {
                remove_intermediate(target, &previous);
            }
        }

        Ok(current.changed.then_some(current.path))
    }
}

fn remove_intermediate(target: &dyn PictureStore, path: &str) {
    if let Err(e) = target.delete(path) {
        warn!(path = %path, error = %e, "failed to remove intermediate artifact");
    }
}

/// `null://`
pub struct NullProcess;

impl Process for NullProcess {
    fn transform(
        &self,
        _: &dyn PictureStore,
        _: &dyn PictureStore,
        _: &str,
    ) -> Result<Option<String>, ExtensionError> {
        Ok(None)
    }
}

/// `grayscale://` converts to 8-bit luma.
pub struct GrayscaleProcess {
    backend: RustBackend,
}

impl GrayscaleProcess {
    pub fn new() -> Self {
        Self {
            backend: RustBackend::new(),
        }
    }
}

impl Default for GrayscaleProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for GrayscaleProcess {
    fn transform(
        &self,
        source: &dyn PictureStore,
        target: &dyn PictureStore,
        path: &str,
    ) -> Result<Option<String>, ExtensionError> {
        let decoded = self.backend.decode(&source.read_all(path)?)?;
        let gray = DynamicImage::ImageLuma8(decoded.image.to_luma8());
        let (new_path, _) = artifacts::create_from_image(target, &gray)?;
        Ok(Some(new_path))
    }
}

pub fn register_defaults(registry: &ProcessRegistry) -> Result<(), ExtensionError> {
    registry.register("null", |_: &Url| -> Result<Arc<dyn Process>, ExtensionError> {
        Ok(Arc::new(NullProcess))
    })?;
    registry.register("grayscale", |_: &Url| -> Result<Arc<dyn Process>, ExtensionError> {
        Ok(Arc::new(GrayscaleProcess::new()))
    })?;
    Ok(())
}
