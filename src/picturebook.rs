//! The picturebook orchestrator.
//!
//! Drives one run: gather pictures from the source store, optionally sort
//! them, lay each one out on its own page and write the finished document
//! to the target store.
//!
//! ## Stages
//!
//! 1. **Gather** (sequential, lazy): enumerate the roots, skip non-image
//!    files, apply the filter, derive caption and long text, run the process
//!    chain. Stops after `max_pages` pictures.
//! 2. **Sort** (optional): the sorter replaces the gathered list.
//! 3. **Prepare** (parallel, in chunks): decode, guard 16-bit PNGs, rotate to
//!    fill, fit to the canvas.
//! 4. **Emit** (sequential, under the page lock): blank pages for even/odd
//!    sequencing, the long-text page, the image page with border and caption.
//! 5. **Save**: serialize into the target store, then remove temp artifacts.
//!
//! Per-picture failures never abort the run. They are logged and returned as
//! [`SkippedItem`]s naming the path, the stage and the cause.

use crate::artifacts::{self, ArtifactError, CleanupReport, TempArtifacts};
use crate::config::ConfigError;
use crate::extensions::{
    Caption, Event, ExtensionError, Filter, Process, ProgressMonitor, Sorter, Text,
};
use crate::geometry::{LayoutError, PageGeometry, PageSpec, Rect};
use crate::imaging::{
    BackendError, DecodedImage, Dimensions, ImageBackend, RustBackend, is_supported_image,
    jpeg_components,
};
use crate::picture::{Picture, PictureLocation};
use crate::render::{
    BLACK, ColourSpace, EmbeddedImage, ImageEncoding, PageSurface, PdfSurface, RenderError,
    TextStyle,
};
use crate::store::{PictureStore, StoreError};
use crate::wrap::wrap_text;
use image::{ColorType, ImageFormat};
use rayon::prelude::*;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Space kept between an image and its caption, in inches.
pub const TEXT_MARGIN: f64 = 0.1;

/// Pictures prepared in parallel before their pages are emitted.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum PictureBookError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extension(#[from] ExtensionError),
    #[error(transparent)]
    Image(#[from] BackendError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Cooperative cancellation shared between the caller and a run.
///
/// Checked once per gathered item and once per emitted picture; work already
/// in flight completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pipeline stage at which a picture was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Enumerate,
    Caption,
    Text,
    Process,
    Read,
    Decode,
    Artifact,
    Layout,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Enumerate => "enumerate",
            Stage::Caption => "caption",
            Stage::Text => "text",
            Stage::Process => "process",
            Stage::Read => "read",
            Stage::Decode => "decode",
            Stage::Artifact => "artifact",
            Stage::Layout => "layout",
            Stage::Render => "render",
        };
        f.write_str(label)
    }
}

/// A picture that did not make it into the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub path: String,
    pub stage: Stage,
    pub reason: String,
}

impl SkippedItem {
    fn new(path: &str, stage: Stage, reason: impl fmt::Display) -> Self {
        warn!(path = %path, stage = %stage, error = %reason, "skipping picture");
        Self {
            path: path.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Result of the gather stage.
#[derive(Debug, Default)]
pub struct Gathered {
    pub pictures: Vec<Picture>,
    pub skipped: Vec<SkippedItem>,
    pub cancelled: bool,
}

/// Result of [`PictureBook::add_pictures`].
#[derive(Debug, Default)]
pub struct BuildReport {
    pub gathered: usize,
    pub placed: usize,
    pub skipped: Vec<SkippedItem>,
    pub cancelled: bool,
}

/// Result of [`PictureBook::place_pictures`].
#[derive(Debug, Default)]
pub struct Placement {
    /// Pictures that landed on a page.
    pub placed: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Result of [`PictureBook::save`].
#[derive(Debug)]
pub struct SaveReport {
    pub filename: String,
    pub pages: usize,
    pub cleanup: CleanupReport,
}

/// Everything one run is configured with. Built once, never mutated.
pub struct PictureBookOptions {
    pub page: PageSpec,
    /// Rotate images a quarter turn when that fills the page better.
    pub fill_page: bool,
    pub even_only: bool,
    pub odd_only: bool,
    /// Maximum number of pictures gathered; 0 means no limit.
    pub max_pages: usize,
    pub ocr_font: bool,
    pub filter: Option<Arc<dyn Filter>>,
    pub caption: Option<Arc<dyn Caption>>,
    pub text: Option<Arc<dyn Text>>,
    pub process: Option<Arc<dyn Process>>,
    /// Runs only on rotated artifacts.
    pub rotate_process: Option<Arc<dyn Process>>,
    pub sorter: Option<Arc<dyn Sorter>>,
    pub monitor: Option<Arc<dyn ProgressMonitor>>,
    pub source: Arc<dyn PictureStore>,
    pub target: Option<Arc<dyn PictureStore>>,
    pub temporary: Arc<dyn PictureStore>,
    pub chunk_size: usize,
}

impl PictureBookOptions {
    /// Options with no strategies, no sequencing constraints and no target.
    pub fn new(
        page: PageSpec,
        source: Arc<dyn PictureStore>,
        temporary: Arc<dyn PictureStore>,
    ) -> Self {
        Self {
            page,
            fill_page: false,
            even_only: false,
            odd_only: false,
            max_pages: 0,
            ocr_font: false,
            filter: None,
            caption: None,
            text: None,
            process: None,
            rotate_process: None,
            sorter: None,
            monitor: None,
            source,
            target: None,
            temporary,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A picture ready to be placed: pixels to embed and where, in inches.
struct Prepared {
    picture: Picture,
    image: EmbeddedImage,
    placement: Rect,
}

/// A failed step and the stage it belongs to.
struct Failure {
    stage: Stage,
    error: PictureBookError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, Failure>;
}

impl<T, E: Into<PictureBookError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, Failure> {
        self.map_err(|e| Failure {
            stage,
            error: e.into(),
        })
    }
}

struct BookState {
    surface: Box<dyn PageSurface>,
}

pub struct PictureBook {
    options: PictureBookOptions,
    geometry: PageGeometry,
    backend: Box<dyn ImageBackend>,
    state: Mutex<BookState>,
    artifacts: TempArtifacts,
}

impl PictureBook {
    /// A book rendered to PDF.
    pub fn new(options: PictureBookOptions) -> Result<Self, PictureBookError> {
        let geometry = PageGeometry::new(&options.page)?;
        let surface = PdfSurface::new(
            geometry.page_width_in,
            geometry.page_height_in,
            TextStyle::new(options.ocr_font),
        );
        Self::with_surface(options, Box::new(surface))
    }

    /// A book rendered onto any surface.
    pub fn with_surface(
        options: PictureBookOptions,
        surface: Box<dyn PageSurface>,
    ) -> Result<Self, PictureBookError> {
        let geometry = PageGeometry::new(&options.page)?;
        debug!(
            page_width = geometry.page_width,
            page_height = geometry.page_height,
            canvas_width = geometry.canvas_width,
            canvas_height = geometry.canvas_height,
            "page geometry"
        );

        Ok(Self {
            options,
            geometry,
            backend: Box::new(RustBackend::new()),
            state: Mutex::new(BookState { surface }),
            artifacts: TempArtifacts::new(),
        })
    }

    pub fn with_backend(mut self, backend: Box<dyn ImageBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn options(&self) -> &PictureBookOptions {
        &self.options
    }

    /// Pages added so far, blanks included.
    pub fn page_count(&self) -> usize {
        self.lock().surface.page_count()
    }

    /// Paths of temp artifacts awaiting cleanup.
    pub fn pending_artifacts(&self) -> Vec<String> {
        self.artifacts.tracked()
    }

    fn lock(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_for(&self, location: PictureLocation) -> &dyn PictureStore {
        match location {
            PictureLocation::Source => self.options.source.as_ref(),
            PictureLocation::Temporary => self.options.temporary.as_ref(),
        }
    }

    // =========================================================================
    // Gather
    // =========================================================================

    /// Enumerate `roots` in the source store and build the picture list.
    pub fn gather_pictures(&self, roots: &[String], cancel: &CancelToken) -> Gathered {
        let mut gathered = Gathered::default();
        let source = self.options.source.as_ref();

        for item in source.gather_pictures(roots) {
            if cancel.is_cancelled() {
                info!("gather cancelled");
                gathered.cancelled = true;
                break;
            }

            let path = match item {
                Ok(path) => path,
                Err(e) => {
                    gathered
                        .skipped
                        .push(SkippedItem::new(source.uri(), Stage::Enumerate, e));
                    continue;
                }
            };

            if !is_supported_image(&path) {
                debug!(path = %path, "not an image, ignoring");
                continue;
            }

            if let Some(filter) = &self.options.filter {
                if !filter.accept(source, &path) {
                    debug!(path = %path, "filtered out");
                    continue;
                }
            }

            match self.describe(&path) {
                Ok(picture) => gathered.pictures.push(picture),
                Err(failure) => gathered
                    .skipped
                    .push(SkippedItem::new(&path, failure.stage, failure.error)),
            }

            let max = self.options.max_pages;
            if max > 0 && gathered.pictures.len() >= max {
                info!(max_pages = max, "reached max pages, stop gathering");
                break;
            }
        }

        info!(
            pictures = gathered.pictures.len(),
            skipped = gathered.skipped.len(),
            "gathered pictures"
        );
        gathered
    }

    /// Caption, long text and process chain for one gathered path.
    fn describe(&self, path: &str) -> Result<Picture, Failure> {
        let source = self.options.source.as_ref();
        let mut picture = Picture::new(path);

        if let Some(caption) = &self.options.caption {
            picture.caption = caption.text(source, path).at(Stage::Caption)?;
        }
        if let Some(text) = &self.options.text {
            picture.long_text = text.body(source, path).at(Stage::Text)?;
        }

        if let Some(process) = &self.options.process {
            let temporary = self.options.temporary.as_ref();
            let result = process.transform(source, temporary, path).at(Stage::Process)?;
            if let Some(new_path) = result.filter(|p| !p.is_empty() && p != path) {
                debug!(path = %path, artifact = %new_path, "processed");
                self.artifacts.track(new_path.clone());
                picture.relocate(new_path);
            }
        }

        Ok(picture)
    }

    // =========================================================================
    // Sort
    // =========================================================================

    /// Apply the configured sorter. A failing sorter keeps gathered order.
    pub fn sort(&self, pictures: Vec<Picture>) -> Vec<Picture> {
        let Some(sorter) = &self.options.sorter else {
            return pictures;
        };

        let fallback = pictures.clone();
        match sorter.sort(self.options.source.as_ref(), pictures) {
            Ok(sorted) => {
                debug!(count = sorted.len(), "sorted pictures");
                sorted
            }
            Err(e) => {
                warn!(error = %e, "sort failed, keeping gathered order");
                fallback
            }
        }
    }

    // =========================================================================
    // Whole run
    // =========================================================================

    /// Gather, sort and place every picture under `roots`.
    pub fn add_pictures(&self, roots: &[String], cancel: &CancelToken) -> BuildReport {
        let gathered = self.gather_pictures(roots, cancel);
        let count = gathered.pictures.len();
        let pictures = self.sort(gathered.pictures);

        let mut report = BuildReport {
            gathered: count,
            skipped: gathered.skipped,
            cancelled: gathered.cancelled,
            ..Default::default()
        };
        if report.cancelled {
            return report;
        }

        let placement = self.place_pictures(pictures, cancel);
        report.placed = placement.placed;
        report.skipped.extend(placement.skipped);
        report.cancelled = cancel.is_cancelled();
        report
    }

    /// Place already-gathered pictures, in order.
    ///
    /// Preparation runs in parallel one chunk at a time; pages are emitted
    /// sequentially in list order so numbering never depends on which
    /// picture finished decoding first.
    pub fn place_pictures(&self, pictures: Vec<Picture>, cancel: &CancelToken) -> Placement {
        let total = pictures.len();
        let chunk_size = self.options.chunk_size.max(1);
        let mut pending = pictures.into_iter();
        let mut placement = Placement::default();
        let mut position = 0;

        loop {
            if cancel.is_cancelled() {
                info!(placed = placement.placed, "placement cancelled");
                break;
            }

            let chunk: Vec<Picture> = pending.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }

            let prepared: Vec<Result<Prepared, (String, Failure)>> = chunk
                .into_par_iter()
                .map(|picture| {
                    let path = picture.source_path.clone();
                    self.prepare(picture).map_err(|f| (path, f))
                })
                .collect();

            for result in prepared {
                if cancel.is_cancelled() {
                    break;
                }
                position += 1;

                let outcome = result.and_then(|prepared| {
                    let path = prepared.picture.source_path.clone();
                    self.emit(&prepared).map_err(|f| (path, f))
                });

                match outcome {
                    Ok(page) => {
                        placement.placed += 1;
                        let message = format!("placed picture {position} of {total}");
                        self.signal(Event::new(page, total, message));
                    }
                    Err((path, failure)) => {
                        let item = SkippedItem::new(&path, failure.stage, failure.error);
                        placement.skipped.push(item);
                    }
                }
            }
        }

        if let Some(monitor) = &self.options.monitor {
            monitor.clear();
        }
        placement
    }

    /// Prepare and place one picture. Returns the page it landed on.
    pub fn add_picture(&self, picture: Picture) -> Result<usize, PictureBookError> {
        self.prepare(picture)
            .and_then(|prepared| self.emit(&prepared))
            .map_err(|f| f.error)
    }

    fn signal(&self, event: Event) {
        if let Some(monitor) = &self.options.monitor {
            monitor.signal(&event);
        }
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    fn prepare(&self, mut picture: Picture) -> Result<Prepared, Failure> {
        let temporary = self.options.temporary.as_ref();

        let mut bytes = self
            .store_for(picture.location)
            .read_all(&picture.final_path)
            .at(Stage::Read)?;
        let mut decoded = self.backend.decode(&bytes).at(Stage::Decode)?;

        if decoded.is_deep_png() {
            debug!(path = %picture.source_path, depth = decoded.bit_depth, "re-encoding deep PNG");
            let (artifact, _) =
                artifacts::create_from_image(temporary, &decoded.image).at(Stage::Artifact)?;
            self.artifacts.track(artifact.clone());
            picture.relocate(artifact);
            (bytes, decoded) = self.reload(&picture)?;
        }

        let Dimensions { width, height } = decoded.dimensions();
        if self.options.fill_page && self.needs_rotation(width, height) {
            debug!(path = %picture.source_path, width, height, "rotating to fill page");
            let rotated = self.backend.rotate90(&decoded.image);
            let (artifact, _) =
                artifacts::create_from_image(temporary, &rotated).at(Stage::Artifact)?;
            self.artifacts.track(artifact.clone());
            picture.relocate(artifact);

            if let Some(process) = &self.options.rotate_process {
                let result = process
                    .transform(temporary, temporary, &picture.final_path)
                    .at(Stage::Process)?;
                let result = result.filter(|p| !p.is_empty() && *p != picture.final_path);
                if let Some(new_path) = result {
                    self.artifacts.track(new_path.clone());
                    picture.relocate(new_path);
                }
            }
            (bytes, decoded) = self.reload(&picture)?;
        }

        let Dimensions { width, height } = decoded.dimensions();
        let fitted = self
            .geometry
            .fit(width as f64, height as f64)
            .at(Stage::Layout)?;
        let placement = self.geometry.to_inches(&fitted);
        let image = self.embed(&decoded, bytes).at(Stage::Decode)?;

        Ok(Prepared {
            picture,
            image,
            placement,
        })
    }

    fn reload(&self, picture: &Picture) -> Result<(Vec<u8>, DecodedImage), Failure> {
        let bytes = self
            .store_for(picture.location)
            .read_all(&picture.final_path)
            .at(Stage::Read)?;
        let decoded = self.backend.decode(&bytes).at(Stage::Decode)?;
        Ok((bytes, decoded))
    }

    /// Rotation check with room kept for one caption line below the image.
    fn needs_rotation(&self, width: u32, height: u32) -> bool {
        let line_height = TextStyle::new(self.options.ocr_font).line_height();
        let reserve = (TEXT_MARGIN + line_height) * self.geometry.dpi;
        self.geometry
            .should_rotate(width as f64, height as f64, reserve)
    }

    /// JPEG and PNG bytes pass through; anything else becomes a JPEG.
    ///
    /// CMYK JPEGs are re-encoded too: decoding already converted them to RGB,
    /// and the page embeds them with the decoded colour space.
    fn embed(&self, decoded: &DecodedImage, bytes: Vec<u8>) -> Result<EmbeddedImage, BackendError> {
        let Dimensions { width, height } = decoded.dimensions();
        let colour = match decoded.image.color() {
            ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => ColourSpace::Gray,
            _ => ColourSpace::Rgb,
        };
        let (encoding, bytes) = match decoded.format {
            ImageFormat::Jpeg if jpeg_components(&bytes) == Some(4) => {
                debug!("re-encoding CMYK JPEG as RGB");
                (ImageEncoding::Jpeg, self.backend.encode_jpeg(&decoded.image)?)
            }
            ImageFormat::Jpeg => (ImageEncoding::Jpeg, bytes),
            ImageFormat::Png => (ImageEncoding::Png, bytes),
            _ => (ImageEncoding::Jpeg, self.backend.encode_jpeg(&decoded.image)?),
        };

        Ok(EmbeddedImage {
            encoding,
            bytes,
            width,
            height,
            colour,
        })
    }

    // =========================================================================
    // Emit
    // =========================================================================

    /// Place a prepared picture, with any blank and text pages it needs.
    fn emit(&self, prepared: &Prepared) -> Result<usize, Failure> {
        let mut state = self.lock();
        let surface = state.surface.as_mut();
        let picture = &prepared.picture;

        if self.options.odd_only && surface.page_count() == 0 {
            blank_page(surface);
        }

        let text_pages = usize::from(picture.has_long_text());
        let image_page = surface.page_count() + 1 + text_pages;
        let wrong_parity = (self.options.even_only && image_page % 2 == 1)
            || (self.options.odd_only && image_page % 2 == 0);
        if wrong_parity {
            blank_page(surface);
        }

        if picture.has_long_text() {
            self.text_page(surface, &picture.long_text).at(Stage::Render)?;
        }

        self.image_page(surface, prepared).at(Stage::Render)
    }

    fn image_page(
        &self,
        surface: &mut dyn PageSurface,
        prepared: &Prepared,
    ) -> Result<usize, RenderError> {
        surface.add_page();
        let page = surface.page_count();
        let rect = prepared.placement;
        debug!(
            page,
            path = %prepared.picture.source_path,
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            "placing image"
        );

        surface.fill_rect(rect, BLACK)?;
        let border = self.geometry.border_inches();
        if border > 0.0 {
            surface.fill_rect(rect.outset(border), BLACK)?;
        }
        surface.draw_image(&prepared.image, rect)?;

        let caption = prepared.picture.caption.trim();
        if !caption.is_empty() {
            let line_height = surface.line_height();
            for (i, line) in caption.split('\n').enumerate() {
                let width = surface.string_width(line);
                let x = rect.right() - (width + TEXT_MARGIN);
                let y = rect.bottom() + line_height * (i + 1) as f64;
                surface.draw_text(x, y, line)?;
            }
        }

        Ok(page)
    }

    fn text_page(&self, surface: &mut dyn PageSurface, text: &str) -> Result<usize, RenderError> {
        surface.add_page();
        let page = surface.page_count();
        let area = self.geometry.text_area_inches();
        let line_height = surface.line_height();
        let lines = wrap_text(&*surface, area.width, text.trim());

        let mut y = area.y;
        for (i, line) in lines.iter().enumerate() {
            y += line_height;
            if y > area.bottom() {
                warn!(page, dropped = lines.len() - i, "long text overflows page, truncating");
                break;
            }
            surface.draw_text(area.x, y, line)?;
        }
        debug!(page, lines = lines.len(), "placed text page");
        Ok(page)
    }

    /// Add a blank page. Returns its number.
    pub fn add_blank_page(&self) -> usize {
        let mut state = self.lock();
        blank_page(state.surface.as_mut())
    }

    /// Add a page of word-wrapped prose. Returns its number.
    pub fn add_text_page(&self, text: &str) -> Result<usize, PictureBookError> {
        let mut state = self.lock();
        Ok(self.text_page(state.surface.as_mut(), text)?)
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Write the document to the target store as `filename`, then remove
    /// temp artifacts. Cleanup runs even when writing fails.
    pub fn save(&self, filename: &str) -> Result<SaveReport, PictureBookError> {
        let target = self
            .options
            .target
            .as_ref()
            .ok_or(ConfigError::MissingTarget)?;

        let mut state = self.lock();
        let pages = state.surface.page_count();
        let written = write_document(state.surface.as_mut(), target.as_ref(), filename);
        drop(state);

        let cleanup = self.artifacts.cleanup(self.options.temporary.as_ref());
        info!(
            removed = cleanup.removed,
            failures = cleanup.failures.len(),
            "cleaned up temp artifacts"
        );
        if let Some(monitor) = &self.options.monitor {
            monitor.close();
        }

        written?;
        info!(filename = %filename, target = %target.uri(), pages, "saved picturebook");
        Ok(SaveReport {
            filename: filename.to_string(),
            pages,
            cleanup,
        })
    }
}

fn blank_page(surface: &mut dyn PageSurface) -> usize {
    surface.add_page();
    let page = surface.page_count();
    debug!(page, "added blank page");
    page
}

fn write_document(
    surface: &mut dyn PageSurface,
    target: &dyn PictureStore,
    filename: &str,
) -> Result<(), PictureBookError> {
    let mut writer = target.new_writer(filename)?;
    surface.finish(&mut writer)?;
    writer
        .flush()
        .map_err(|e| StoreError::io(filename, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::MultiProcess;
    use crate::extensions::caption::FilenameCaption;
    use crate::extensions::filter::{Mode, RegexpFilter};
    use crate::extensions::process::GrayscaleProcess;
    use crate::extensions::progress::tests::RecordingMonitor;
    use crate::geometry::{Edges, Orientation};
    use crate::store::MemoryStore;
    use crate::test_helpers::*;

    struct Fixture {
        source: Arc<MemoryStore>,
        target: Arc<MemoryStore>,
        temporary: Arc<MemoryStore>,
    }

    impl Fixture {
        fn new(images: &[(&str, u32, u32)]) -> Self {
            Self {
                source: Arc::new(store_with_images(images)),
                target: Arc::new(MemoryStore::new("mem://target")),
                temporary: Arc::new(MemoryStore::new("mem://tmp")),
            }
        }

        /// Letter at 100 DPI with 1in margins: a 650x900 px canvas.
        fn options(&self) -> PictureBookOptions {
            let page = PageSpec {
                width: 8.5,
                height: 11.0,
                orientation: Orientation::Portrait,
                dpi: 100.0,
                border: 0.0,
                bleed: 0.0,
                margins: Edges::uniform(1.0),
            };
            let mut options = PictureBookOptions::new(
                page,
                self.source.clone() as Arc<dyn PictureStore>,
                self.temporary.clone() as Arc<dyn PictureStore>,
            );
            options.target = Some(self.target.clone() as Arc<dyn PictureStore>);
            options
        }
    }

    fn build(options: PictureBookOptions) -> (PictureBook, Recording) {
        let (surface, ops) = RecordingSurface::new();
        let book = PictureBook::with_surface(options, Box::new(surface)).unwrap();
        (book, ops)
    }

    fn run(book: &PictureBook) -> BuildReport {
        book.add_pictures(&[String::new()], &CancelToken::new())
    }

    fn images(ops: &Recording) -> Vec<Option<(u32, u32)>> {
        page_images(&ops.lock().unwrap())
    }

    const THREE: &[(&str, u32, u32)] = &[("a.jpg", 40, 30), ("b.jpg", 30, 40), ("c.jpg", 20, 20)];

    struct Reverse;

    impl Sorter for Reverse {
        fn sort(
            &self,
            _: &dyn PictureStore,
            mut pictures: Vec<Picture>,
        ) -> Result<Vec<Picture>, ExtensionError> {
            pictures.reverse();
            Ok(pictures)
        }
    }

    struct FixedText(&'static str);

    impl Text for FixedText {
        fn body(&self, _: &dyn PictureStore, _: &str) -> Result<String, ExtensionError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl Process for Broken {
        fn transform(
            &self,
            _: &dyn PictureStore,
            _: &dyn PictureStore,
            _: &str,
        ) -> Result<Option<String>, ExtensionError> {
            Err(ExtensionError::Failed("boom".into()))
        }
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn three_pictures_make_three_pages_in_order() {
        let fx = Fixture::new(THREE);
        let (book, ops) = build(fx.options());

        let report = run(&book);

        assert_eq!(report.gathered, 3);
        assert_eq!(report.placed, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(
            images(&ops),
            vec![Some((40, 30)), Some((30, 40)), Some((20, 20))]
        );
        assert_eq!(book.page_count(), 3);
    }

    #[test]
    fn sorter_reorders_pages() {
        let fx = Fixture::new(THREE);
        let mut options = fx.options();
        options.sorter = Some(Arc::new(Reverse));
        let (book, ops) = build(options);

        run(&book);

        assert_eq!(
            images(&ops),
            vec![Some((20, 20)), Some((30, 40)), Some((40, 30))]
        );
    }

    #[test]
    fn order_is_kept_across_chunks() {
        let names: Vec<String> = (0..7).map(|i| format!("p{i}.jpg")).collect();
        let specs: Vec<(&str, u32, u32)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), 10 + i as u32, 10))
            .collect();
        let fx = Fixture::new(&specs);
        let mut options = fx.options();
        options.chunk_size = 3;
        let (book, ops) = build(options);

        run(&book);

        let widths: Vec<u32> = images(&ops).into_iter().map(|i| i.unwrap().0).collect();
        assert_eq!(widths, vec![10, 11, 12, 13, 14, 15, 16]);
    }

    // =========================================================================
    // Gather
    // =========================================================================

    #[test]
    fn max_pages_bounds_gathering() {
        let fx = Fixture::new(THREE);
        let mut options = fx.options();
        options.max_pages = 2;
        let (book, _) = build(options);

        let gathered = book.gather_pictures(&[String::new()], &CancelToken::new());

        let paths: Vec<&str> = gathered.pictures.iter().map(|p| p.source_path.as_str()).collect();
        assert_eq!(paths, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn non_images_are_ignored_without_being_skipped() {
        let fx = Fixture::new(THREE);
        fx.source.put("notes.txt", b"hello".to_vec());
        let (book, _) = build(fx.options());

        let gathered = book.gather_pictures(&[String::new()], &CancelToken::new());

        assert_eq!(gathered.pictures.len(), 3);
        assert!(gathered.skipped.is_empty());
    }

    #[test]
    fn filter_rejects_matching_paths() {
        let fx = Fixture::new(THREE);
        let mut options = fx.options();
        options.filter = Some(Arc::new(RegexpFilter::new(Mode::Exclude, "^b").unwrap()));
        let (book, ops) = build(options);

        run(&book);

        assert_eq!(images(&ops), vec![Some((40, 30)), Some((20, 20))]);
    }

    #[test]
    fn failing_process_skips_only_that_picture() {
        let fx = Fixture::new(THREE);
        let mut options = fx.options();
        options.process = Some(Arc::new(Broken));
        let (book, ops) = build(options);

        let report = run(&book);

        assert_eq!(report.skipped.len(), 3);
        assert!(report.skipped.iter().all(|s| s.stage == Stage::Process));
        assert!(images(&ops).is_empty());
    }

    #[test]
    fn processed_pictures_are_read_from_temporary_store() {
        let fx = Fixture::new(&[("a.jpg", 40, 30)]);
        let mut options = fx.options();
        let grayscale: Arc<dyn Process> = Arc::new(GrayscaleProcess::new());
        options.process = Some(Arc::new(MultiProcess::new(vec![grayscale])));
        let (book, ops) = build(options);

        let gathered = book.gather_pictures(&[String::new()], &CancelToken::new());
        let picture = &gathered.pictures[0];
        assert_eq!(picture.location, PictureLocation::Temporary);
        assert!(fx.temporary.contains(&picture.final_path));

        book.place_pictures(gathered.pictures, &CancelToken::new());
        assert_eq!(images(&ops), vec![Some((40, 30))]);
    }

    #[test]
    fn cancelled_run_adds_nothing() {
        let fx = Fixture::new(THREE);
        let (book, ops) = build(fx.options());
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = book.add_pictures(&[String::new()], &cancel);

        assert!(report.cancelled);
        assert_eq!(report.gathered, 0);
        assert!(images(&ops).is_empty());
    }

    /// Cancels its token as soon as the first picture lands.
    struct CancelAfterFirst(CancelToken);

    impl ProgressMonitor for CancelAfterFirst {
        fn signal(&self, _: &Event) {
            self.0.cancel();
        }
    }

    #[test]
    fn cancel_during_placement_counts_only_emitted_pictures() {
        let fx = Fixture::new(THREE);
        let cancel = CancelToken::new();
        let mut options = fx.options();
        let monitor: Arc<dyn ProgressMonitor> = Arc::new(CancelAfterFirst(cancel.clone()));
        options.monitor = Some(monitor);
        let (book, ops) = build(options);

        let report = book.add_pictures(&[String::new()], &cancel);

        assert!(report.cancelled);
        assert_eq!(report.gathered, 3);
        assert_eq!(report.placed, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(images(&ops), vec![Some((40, 30))]);
        assert_eq!(book.page_count(), 1);
    }

    #[test]
    fn rgb_jpeg_bytes_are_embedded_unchanged() {
        let fx = Fixture::new(&[]);
        let (book, _) = build(fx.options());
        let bytes = jpeg_bytes(8, 4);
        let decoded = RustBackend::new().decode(&bytes).unwrap();

        let embedded = book.embed(&decoded, bytes.clone()).unwrap();

        assert_eq!(embedded.bytes, bytes);
        assert_eq!(embedded.colour, ColourSpace::Rgb);
    }

    #[test]
    fn cmyk_jpeg_is_reencoded_as_rgb() {
        let fx = Fixture::new(&[]);
        let (book, _) = build(fx.options());
        // Decoding yields RGB pixels; the original bytes still declare 4 components.
        let decoded = DecodedImage {
            image: image::DynamicImage::new_rgb8(8, 4),
            format: ImageFormat::Jpeg,
            bit_depth: 8,
        };
        let cmyk = vec![
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x14, 0x08, 0x00, 0x04, 0x00, 0x08, 0x04,
        ];

        let embedded = book.embed(&decoded, cmyk.clone()).unwrap();

        assert_ne!(embedded.bytes, cmyk);
        assert_eq!(jpeg_components(&embedded.bytes), Some(3));
        assert_eq!(embedded.colour, ColourSpace::Rgb);
        assert_eq!((embedded.width, embedded.height), (8, 4));
    }

    #[test]
    fn corrupt_image_is_skipped_at_decode() {
        let fx = Fixture::new(THREE);
        fx.source.put("b.jpg", b"not a jpeg".to_vec());
        let (book, ops) = build(fx.options());

        let report = run(&book);

        assert_eq!(report.placed, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "b.jpg");
        assert_eq!(report.skipped[0].stage, Stage::Decode);
        assert_eq!(images(&ops), vec![Some((40, 30)), Some((20, 20))]);
    }

    // =========================================================================
    // Sequencing
    // =========================================================================

    #[test]
    fn even_only_puts_pictures_on_even_pages() {
        let fx = Fixture::new(&THREE[..2]);
        let mut options = fx.options();
        options.even_only = true;
        let (book, ops) = build(options);

        run(&book);

        assert_eq!(images(&ops), vec![None, Some((40, 30)), None, Some((30, 40))]);
    }

    #[test]
    fn odd_only_starts_blank_and_avoids_even_pages() {
        let fx = Fixture::new(&THREE[..2]);
        let mut options = fx.options();
        options.odd_only = true;
        let (book, ops) = build(options);

        run(&book);

        let pages = images(&ops);
        assert_eq!(pages[0], None);
        for (i, page) in pages.iter().enumerate() {
            if (i + 1) % 2 == 0 {
                assert_eq!(*page, None, "page {}", i + 1);
            }
        }
        assert_eq!(pages.iter().flatten().count(), 2);
    }

    #[test]
    fn long_text_page_precedes_image() {
        let fx = Fixture::new(&THREE[..1]);
        let mut options = fx.options();
        options.text = Some(Arc::new(FixedText("A long story about a picture.")));
        let (book, ops) = build(options);

        run(&book);

        assert_eq!(images(&ops), vec![None, Some((40, 30))]);
        let texts = page_texts(&ops.lock().unwrap());
        assert_eq!(texts[0], vec!["A long story about a picture."]);
    }

    #[test]
    fn even_only_with_text_needs_no_blank() {
        let fx = Fixture::new(&THREE[..1]);
        let mut options = fx.options();
        options.even_only = true;
        options.text = Some(Arc::new(FixedText("story")));
        let (book, ops) = build(options);

        run(&book);

        assert_eq!(images(&ops), vec![None, Some((40, 30))]);
        assert_eq!(page_texts(&ops.lock().unwrap())[0], vec!["story"]);
    }

    #[test]
    fn blank_and_text_pages_advance_counter() {
        let fx = Fixture::new(&[]);
        let (book, _) = build(fx.options());

        assert_eq!(book.add_blank_page(), 1);
        assert_eq!(book.add_text_page("words").unwrap(), 2);
        assert_eq!(book.page_count(), 2);
    }

    // =========================================================================
    // Layout
    // =========================================================================

    #[test]
    fn caption_is_right_aligned_below_image() {
        let fx = Fixture::new(&THREE[..1]);
        let mut options = fx.options();
        options.caption = Some(Arc::new(FilenameCaption::new(false)));
        let (book, ops) = build(options);

        run(&book);

        let ops = ops.lock().unwrap();
        let image = ops
            .iter()
            .find_map(|op| match op {
                RecordedOp::Image { rect, .. } => Some(*rect),
                _ => None,
            })
            .unwrap();
        let (x, y, text) = ops
            .iter()
            .find_map(|op| match op {
                RecordedOp::Text { x, y, text } => Some((*x, *y, text.clone())),
                _ => None,
            })
            .unwrap();

        let style = TextStyle::default();
        assert_eq!(text, "a.jpg");
        assert!((x - (image.right() - style.string_width("a.jpg") - TEXT_MARGIN)).abs() < 1e-9);
        assert!((y - (image.bottom() + style.line_height())).abs() < 1e-9);
    }

    #[test]
    fn small_image_is_centered_at_native_size() {
        let fx = Fixture::new(&THREE[..1]);
        let (book, ops) = build(fx.options());

        run(&book);

        let ops = ops.lock().unwrap();
        let rect = ops
            .iter()
            .find_map(|op| match op {
                RecordedOp::Image { rect, .. } => Some(*rect),
                _ => None,
            })
            .unwrap();
        assert!((rect.width - 0.4).abs() < 1e-9);
        assert!((rect.height - 0.3).abs() < 1e-9);
        assert!((rect.x + rect.width / 2.0 - 4.25).abs() < 1e-9);
        assert!((rect.y + rect.height / 2.0 - 5.5).abs() < 1e-9);
    }

    #[test]
    fn border_is_drawn_around_image() {
        let fx = Fixture::new(&THREE[..1]);
        let mut options = fx.options();
        options.page.border = 0.1;
        let (book, ops) = build(options);

        run(&book);

        let ops = ops.lock().unwrap();
        let fills: Vec<Rect> = ops
            .iter()
            .filter_map(|op| match op {
                RecordedOp::FillRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(fills.len(), 2);
        assert!((fills[1].width - (fills[0].width + 0.2)).abs() < 1e-9);
    }

    #[test]
    fn fill_page_rotates_wide_image_in_portrait_book() {
        let fx = Fixture::new(&[("wide.jpg", 800, 300)]);
        let mut options = fx.options();
        options.fill_page = true;
        let (book, ops) = build(options);

        run(&book);

        assert_eq!(images(&ops), vec![Some((300, 800))]);
        assert_eq!(book.pending_artifacts().len(), 1);
    }

    #[test]
    fn without_fill_page_wide_image_is_shrunk() {
        let fx = Fixture::new(&[("wide.jpg", 800, 300)]);
        let (book, ops) = build(fx.options());

        run(&book);

        assert_eq!(images(&ops), vec![Some((800, 300))]);
        assert!(book.pending_artifacts().is_empty());
    }

    #[test]
    fn deep_png_is_reencoded_as_artifact() {
        let fx = Fixture::new(&[]);
        fx.source.put("deep.png", png16_bytes(20, 10));
        let (book, ops) = build(fx.options());

        let report = run(&book);

        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        assert_eq!(images(&ops), vec![Some((20, 10))]);
        let artifacts = book.pending_artifacts();
        assert_eq!(artifacts.len(), 1);
        assert!(fx.temporary.contains(&artifacts[0]));
    }

    // =========================================================================
    // Save and progress
    // =========================================================================

    #[test]
    fn save_writes_target_and_cleans_up() {
        let fx = Fixture::new(&[("wide.jpg", 800, 300)]);
        let monitor = Arc::new(RecordingMonitor::default());
        let mut options = fx.options();
        options.fill_page = true;
        options.monitor = Some(monitor.clone() as Arc<dyn ProgressMonitor>);
        let (book, _) = build(options);
        run(&book);
        assert_eq!(fx.temporary.keys().len(), 1);

        let report = book.save("book.pdf").unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.cleanup.removed, 1);
        assert!(fx.target.contains("book.pdf"));
        assert_eq!(fx.target.read_all("book.pdf").unwrap(), b"%recorded".to_vec());
        assert!(fx.temporary.keys().is_empty());
        assert!(*monitor.closed.lock().unwrap());
    }

    #[test]
    fn save_without_target_is_config_error() {
        let fx = Fixture::new(&THREE[..1]);
        let mut options = fx.options();
        options.target = None;
        let (book, _) = build(options);

        let err = book.save("book.pdf").unwrap_err();
        assert!(matches!(err, PictureBookError::Config(ConfigError::MissingTarget)));
    }

    #[test]
    fn progress_is_signalled_per_picture() {
        let fx = Fixture::new(THREE);
        let monitor = Arc::new(RecordingMonitor::default());
        let mut options = fx.options();
        options.even_only = true;
        options.monitor = Some(monitor.clone() as Arc<dyn ProgressMonitor>);
        let (book, _) = build(options);

        run(&book);

        let events = monitor.events.lock().unwrap();
        let pages: Vec<usize> = events.iter().map(|e| e.page).collect();
        assert_eq!(pages, vec![2, 4, 6]);
        assert!(events.iter().all(|e| e.total_pictures == 3));
    }
}
