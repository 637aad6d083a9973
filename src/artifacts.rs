//! Temporary artifacts: intermediate images written to the temporary store.
//!
//! Rotation, processing and the 16-bit PNG guard all materialize pixels as
//! JPEG files named `picturebook-<uuid>.jpg`. The prefix is what cleanup keys
//! on: [`TempArtifacts::cleanup`] deletes only tracked paths whose file name
//! carries it, so anything else in the temporary store is never touched.

use crate::imaging::{BackendError, encode_jpeg};
use crate::store::{self, PictureStore, StoreError};
use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const ARTIFACT_PREFIX: &str = "picturebook-";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to encode artifact: {0}")]
    Encode(#[from] BackendError),
    #[error("failed to write artifact: {0}")]
    Store(#[from] StoreError),
}

/// Encode `image` as JPEG into `store` under a fresh prefixed name.
pub fn create_from_image(
    store: &dyn PictureStore,
    image: &DynamicImage,
) -> Result<(String, ImageFormat), ArtifactError> {
    let bytes = encode_jpeg(image)?;
    let path = format!("{ARTIFACT_PREFIX}{}.jpg", Uuid::new_v4());
    store.write_all(&path, &bytes)?;
    debug!(path = %path, bytes = bytes.len(), "wrote temp artifact");
    Ok((path, ImageFormat::Jpeg))
}

/// Whether `path` names a file this module created.
pub fn is_artifact(path: &str) -> bool {
    store::file_name(path).starts_with(ARTIFACT_PREFIX)
}

/// What a cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: usize,
    /// Tracked paths without the prefix, left alone.
    pub skipped: usize,
    pub failures: Vec<(String, StoreError)>,
}

/// Append-only list of artifacts created during one run.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Mutex<Vec<String>>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, path: impl Into<String>) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.into());
    }

    pub fn tracked(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every tracked, prefixed artifact from `store`.
    ///
    /// Deletions run in parallel and independently; each failure is logged
    /// and collected instead of aborting the pass. The list is drained, so a
    /// second call is a no-op.
    pub fn cleanup(&self, store: &dyn PictureStore) -> CleanupReport {
        let paths = std::mem::take(&mut *self.paths.lock().unwrap_or_else(PoisonError::into_inner));
        let (owned, foreign): (Vec<_>, Vec<_>) = paths.into_iter().partition(|p| is_artifact(p));

        let outcomes: Vec<(String, Result<(), StoreError>)> = owned
            .into_par_iter()
            .map(|path| {
                let result = store.delete(&path);
                (path, result)
            })
            .collect();

        let mut report = CleanupReport {
            skipped: foreign.len(),
            ..Default::default()
        };
        for (path, result) in outcomes {
            match result {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to remove temp artifact");
                    report.failures.push((path, e));
                }
            }
        }
        report
    }
}
