//! Run wiring: configuration → stores and strategies → orchestrator → save.
//!
//! Everything that can fail because of bad configuration fails here, before
//! the first picture is gathered: unknown schemes, malformed strategy
//! parameters and unopenable stores all propagate as [`AppError`].

use crate::config::{BookConfig, ConfigError};
use crate::extensions::{
    Caption, ExtensionError, Extensions, Filter, MultiCaption, MultiFilter, MultiProcess, Process,
    ProgressMonitor, Sorter, Text,
};
use crate::picturebook::{
    CancelToken, PictureBook, PictureBookError, PictureBookOptions, SkippedItem,
};
use crate::store::{self, PictureStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Extension(#[from] ExtensionError),
    #[error("cannot open {role} store: {source}")]
    Store {
        role: &'static str,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Book(#[from] PictureBookError),
}

/// What a finished run did, for the CLI summary.
#[derive(Debug)]
pub struct RunSummary {
    pub filename: String,
    pub target: String,
    pub gathered: usize,
    pub placed: usize,
    pub pages: usize,
    pub skipped: Vec<SkippedItem>,
    pub artifacts_removed: usize,
    pub cleanup_failures: Vec<(String, String)>,
    pub cancelled: bool,
}

/// The three stores of one run.
pub struct Stores {
    pub source: Arc<dyn PictureStore>,
    pub target: Arc<dyn PictureStore>,
    pub temporary: Arc<dyn PictureStore>,
}

impl Stores {
    pub fn close(&self) {
        for (role, store) in [
            ("source", &self.source),
            ("target", &self.target),
            ("temporary", &self.temporary),
        ] {
            if let Err(e) = store.close() {
                warn!(role, uri = %store.uri(), error = %e, "failed to close store");
            }
        }
    }
}

/// Open a store from a URI or bare path, `fallback` when empty.
fn open_store(
    ext: &Extensions,
    role: &'static str,
    location: &str,
    fallback: impl FnOnce() -> std::io::Result<std::path::PathBuf>,
) -> Result<Arc<dyn PictureStore>, AppError> {
    let fail = |source| AppError::Store { role, source };

    let location = match location.trim() {
        "" => {
            let dir = fallback().map_err(|e| fail(StoreError::io(role, e)))?;
            dir.to_string_lossy().into_owned()
        }
        location => location.to_string(),
    };
    let uri = store::ensure_scheme(&location).map_err(fail)?;
    debug!(role, uri = %uri, "opening store");
    ext.stores.create(&uri).map_err(fail)
}

pub fn open_stores(config: &BookConfig, ext: &Extensions) -> Result<Stores, AppError> {
    let storage = &config.storage;
    Ok(Stores {
        source: open_store(ext, "source", &storage.source, std::env::current_dir)?,
        target: open_store(ext, "target", &storage.target, std::env::current_dir)?,
        temporary: open_store(ext, "temporary", &storage.temporary, || {
            Ok(std::env::temp_dir())
        })?,
    })
}

fn uris(list: &[String]) -> impl Iterator<Item = &str> {
    list.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn optional(uri: &Option<String>) -> Option<&str> {
    uri.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn resolve_filter(
    config: &BookConfig,
    ext: &Extensions,
) -> Result<Option<Arc<dyn Filter>>, AppError> {
    let mut filters = uris(&config.extensions.filter)
        .map(|uri| ext.filters.create(uri))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(Arc::new(MultiFilter::new(filters))),
    })
}

fn resolve_caption(
    config: &BookConfig,
    ext: &Extensions,
) -> Result<Option<Arc<dyn Caption>>, AppError> {
    let mut captions = uris(&config.extensions.caption)
        .map(|uri| ext.captions.create(uri))
        .collect::<Result<Vec<_>, _>>()?;
    let combined = config.extensions.caption_combined;
    Ok(match captions.len() {
        0 => None,
        1 if !combined => captions.pop(),
        _ => Some(Arc::new(MultiCaption::new(captions).combined(combined))),
    })
}

fn resolve_processes(
    ext: &Extensions,
    list: &[String],
) -> Result<Option<Arc<dyn Process>>, AppError> {
    let processes = uris(list)
        .map(|uri| ext.processes.create(uri))
        .collect::<Result<Vec<_>, _>>()?;
    if processes.is_empty() {
        return Ok(None);
    }
    Ok(Some(Arc::new(MultiProcess::new(processes))))
}

/// Resolve every configured URI into a strategy and open the stores.
pub fn build_options(
    config: &BookConfig,
    ext: &Extensions,
    stores: &Stores,
) -> Result<PictureBookOptions, AppError> {
    let text: Option<Arc<dyn Text>> = optional(&config.extensions.text)
        .map(|uri| ext.texts.create(uri))
        .transpose()?;
    let sorter: Option<Arc<dyn Sorter>> = optional(&config.extensions.sort)
        .map(|uri| ext.sorters.create(uri))
        .transpose()?;
    let monitor: Arc<dyn ProgressMonitor> = match config.extensions.progress_monitor.trim() {
        "" => ext.monitors.create("null://")?,
        uri => ext.monitors.create(uri)?,
    };

    let mut options = PictureBookOptions::new(
        config.page.to_page_spec()?,
        Arc::clone(&stores.source),
        Arc::clone(&stores.temporary),
    );
    options.target = Some(Arc::clone(&stores.target));
    options.fill_page = config.layout.fill_page;
    options.even_only = config.layout.even_only;
    options.odd_only = config.layout.odd_only;
    options.max_pages = config.layout.max_pages;
    options.ocr_font = config.layout.ocra_font;
    options.filter = resolve_filter(config, ext)?;
    options.caption = resolve_caption(config, ext)?;
    options.text = text;
    options.process = resolve_processes(ext, &config.extensions.process)?;
    options.rotate_process = resolve_processes(ext, &config.extensions.rotate_process)?;
    options.sorter = sorter;
    options.monitor = Some(monitor);
    Ok(options)
}

/// Build one picturebook from `roots` in the source store.
///
/// An empty `roots` list means the whole source store.
pub fn run(
    config: &BookConfig,
    ext: &Extensions,
    roots: &[String],
    cancel: &CancelToken,
) -> Result<RunSummary, AppError> {
    config.validate()?;
    let stores = open_stores(config, ext)?;
    let result = run_with_stores(config, ext, &stores, roots, cancel);
    stores.close();
    result
}

fn run_with_stores(
    config: &BookConfig,
    ext: &Extensions,
    stores: &Stores,
    roots: &[String],
    cancel: &CancelToken,
) -> Result<RunSummary, AppError> {
    let options = build_options(config, ext, stores)?;
    let book = PictureBook::new(options)?;

    let roots = if roots.is_empty() {
        vec![String::new()]
    } else {
        roots.to_vec()
    };
    info!(source = %stores.source.uri(), roots = ?roots, "building picturebook");

    let report = book.add_pictures(&roots, cancel);
    let saved = book.save(&config.storage.filename)?;

    Ok(RunSummary {
        filename: saved.filename,
        target: stores.target.uri().to_string(),
        gathered: report.gathered,
        placed: report.placed,
        pages: saved.pages,
        skipped: report.skipped,
        artifacts_removed: saved.cleanup.removed,
        cleanup_failures: saved
            .cleanup
            .failures
            .into_iter()
            .map(|(path, e)| (path, e.to_string()))
            .collect(),
        cancelled: report.cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;
    use crate::test_helpers::jpeg_bytes;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(source: &TempDir, target: &TempDir, temporary: &TempDir) -> BookConfig {
        let mut config = BookConfig::default();
        config.storage.source = source.path().to_string_lossy().into_owned();
        config.storage.target = target.path().to_string_lossy().into_owned();
        config.storage.temporary = temporary.path().to_string_lossy().into_owned();
        config.page.dpi = 100.0;
        config
    }

    fn dirs() -> (TempDir, TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn run_writes_pdf_to_target_directory() {
        let (source, target, temporary) = dirs();
        fs::create_dir(source.path().join("trip")).unwrap();
        fs::write(source.path().join("trip/one.jpg"), jpeg_bytes(40, 30)).unwrap();
        fs::write(source.path().join("trip/two.jpg"), jpeg_bytes(30, 40)).unwrap();
        let config = config_for(&source, &target, &temporary);
        let ext = Extensions::with_defaults().unwrap();

        let summary = run(&config, &ext, &[], &CancelToken::new()).unwrap();

        assert_eq!(summary.gathered, 2);
        assert_eq!(summary.placed, 2);
        assert_eq!(summary.pages, 2);
        assert!(target.path().join("picturebook.pdf").is_file());
    }

    #[test]
    fn roots_limit_gathering() {
        let (source, target, temporary) = dirs();
        for dir in ["a", "b"] {
            fs::create_dir(source.path().join(dir)).unwrap();
            fs::write(source.path().join(dir).join("x.jpg"), jpeg_bytes(10, 10)).unwrap();
        }
        let config = config_for(&source, &target, &temporary);
        let ext = Extensions::with_defaults().unwrap();

        let summary = run(&config, &ext, &["b".to_string()], &CancelToken::new()).unwrap();

        assert_eq!(summary.gathered, 1);
    }

    #[test]
    fn unknown_scheme_fails_before_gathering() {
        let (source, target, temporary) = dirs();
        let mut config = config_for(&source, &target, &temporary);
        config.extensions.caption = vec!["bogus://".into()];
        let ext = Extensions::with_defaults().unwrap();

        let err = run(&config, &ext, &[], &CancelToken::new()).unwrap_err();

        assert!(matches!(
            err,
            AppError::Extension(ExtensionError::Registry(RegistryError::UnknownScheme { .. }))
        ));
        assert!(!target.path().join("picturebook.pdf").exists());
    }

    #[test]
    fn missing_source_directory_is_store_error() {
        let (source, target, temporary) = dirs();
        let mut config = config_for(&source, &target, &temporary);
        config.storage.source = source.path().join("nope").to_string_lossy().into_owned();
        let ext = Extensions::with_defaults().unwrap();

        let err = run(&config, &ext, &[], &CancelToken::new()).unwrap_err();
        assert!(matches!(err, AppError::Store { role: "source", .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = BookConfig::default();
        config.layout.even_only = true;
        config.layout.odd_only = true;
        let ext = Extensions::with_defaults().unwrap();

        let err = run(&config, &ext, &[], &CancelToken::new()).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Validation(_))));
    }

    #[test]
    fn single_caption_is_used_directly_and_many_are_combined() {
        let ext = Extensions::with_defaults().unwrap();
        let mut config = BookConfig::default();
        assert!(resolve_caption(&config, &ext).unwrap().is_none());

        config.extensions.caption = vec!["filename://".into(), "none://".into()];
        let caption = resolve_caption(&config, &ext).unwrap().unwrap();
        let store = crate::store::MemoryStore::new("mem://");
        assert_eq!(caption.text(&store, "a/b.jpg").unwrap(), "b.jpg");
    }

    #[test]
    fn memory_target_is_a_dry_run() {
        let (source, _, temporary) = dirs();
        fs::write(source.path().join("one.jpg"), jpeg_bytes(10, 10)).unwrap();
        let mut config = BookConfig::default();
        config.storage.source = source.path().to_string_lossy().into_owned();
        config.storage.target = "mem://".into();
        config.storage.temporary = temporary.path().to_string_lossy().into_owned();
        let ext = Extensions::with_defaults().unwrap();

        let summary = run(&config, &ext, &[], &CancelToken::new()).unwrap();
        assert_eq!(summary.pages, 1);
        assert!(summary.target.starts_with("mem:"));
    }
}
