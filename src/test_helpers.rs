//! Shared test utilities for the picturebook test suite.
//!
//! Provides in-memory image fixtures and a [`RecordingSurface`] that stands
//! in for the PDF writer so orchestrator tests can assert on page layout
//! without parsing PDF output.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let source = store_with_images(&[("a.jpg", 40, 30), ("b.jpg", 30, 40)]);
//! let (surface, ops) = RecordingSurface::new();
//! // ... run the orchestrator with `surface` ...
//! assert_eq!(page_images(&ops.lock().unwrap()), vec![Some((40, 30)), Some((30, 40))]);
//! ```

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};

use crate::geometry::Rect;
use crate::render::{EmbeddedImage, PageSurface, RenderError, TextStyle};
use crate::store::MemoryStore;
use crate::wrap::TextMeasure;

// =========================================================================
// Image fixtures
// =========================================================================

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, format).unwrap();
    cursor.into_inner()
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// A small valid JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// A small valid 8-bit PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

/// A PNG with 16 bits per channel.
pub fn png16_bytes(width: u32, height: u32) -> Vec<u8> {
    let buffer: ImageBuffer<Rgb<u16>, Vec<u16>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u16 * 512, y as u16 * 512, 30000]));
    encode(&DynamicImage::ImageRgb16(buffer), ImageFormat::Png)
}

/// A memory store holding JPEGs of the given sizes.
pub fn store_with_images(images: &[(&str, u32, u32)]) -> MemoryStore {
    let store = MemoryStore::new("mem://source");
    for (path, w, h) in images {
        store.put(path, jpeg_bytes(*w, *h));
    }
    store
}

// =========================================================================
// Recording surface
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    AddPage,
    FillRect { rect: Rect, colour: [u8; 3] },
    Image { width: u32, height: u32, rect: Rect },
    Text { x: f64, y: f64, text: String },
    Finish,
}

pub type Recording = Arc<Mutex<Vec<RecordedOp>>>;

/// Surface that records operations instead of rendering.
/// Uses Mutex (not RefCell) so the handle can be read while the orchestrator
/// owns the surface.
pub struct RecordingSurface {
    ops: Recording,
    pages: usize,
    style: TextStyle,
}

impl RecordingSurface {
    pub fn new() -> (Self, Recording) {
        let ops = Recording::default();
        let surface = Self {
            ops: Arc::clone(&ops),
            pages: 0,
            style: TextStyle::default(),
        };
        (surface, ops)
    }

    fn record(&self, op: RecordedOp) -> Result<(), RenderError> {
        if self.pages == 0 && !matches!(op, RecordedOp::AddPage | RecordedOp::Finish) {
            return Err(RenderError::NoPage);
        }
        self.ops.lock().unwrap().push(op);
        Ok(())
    }
}

impl TextMeasure for RecordingSurface {
    fn string_width(&self, text: &str) -> f64 {
        self.style.string_width(text)
    }
}

impl PageSurface for RecordingSurface {
    fn add_page(&mut self) {
        self.pages += 1;
        self.ops.lock().unwrap().push(RecordedOp::AddPage);
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn fill_rect(&mut self, rect: Rect, colour: [u8; 3]) -> Result<(), RenderError> {
        self.record(RecordedOp::FillRect { rect, colour })
    }

    fn draw_image(&mut self, image: &EmbeddedImage, rect: Rect) -> Result<(), RenderError> {
        self.record(RecordedOp::Image {
            width: image.width,
            height: image.height,
            rect,
        })
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str) -> Result<(), RenderError> {
        self.record(RecordedOp::Text {
            x,
            y,
            text: text.to_string(),
        })
    }

    fn line_height(&self) -> f64 {
        self.style.line_height()
    }

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), RenderError> {
        out.write_all(b"%recorded")?;
        self.record(RecordedOp::Finish)
    }
}

// =========================================================================
// Recording queries
// =========================================================================

/// Split recorded operations into pages (operations after each `AddPage`).
pub fn pages(ops: &[RecordedOp]) -> Vec<Vec<RecordedOp>> {
    let mut pages: Vec<Vec<RecordedOp>> = Vec::new();
    for op in ops {
        match op {
            RecordedOp::AddPage => pages.push(Vec::new()),
            RecordedOp::Finish => {}
            other => {
                if let Some(page) = pages.last_mut() {
                    page.push(other.clone());
                }
            }
        }
    }
    pages
}

/// Per page: the pixel size of the image drawn on it, or `None`.
pub fn page_images(ops: &[RecordedOp]) -> Vec<Option<(u32, u32)>> {
    pages(ops)
        .iter()
        .map(|page| {
            page.iter().find_map(|op| match op {
                RecordedOp::Image { width, height, .. } => Some((*width, *height)),
                _ => None,
            })
        })
        .collect()
}

/// Per page: all text drawn on it.
pub fn page_texts(ops: &[RecordedOp]) -> Vec<Vec<String>> {
    pages(ops)
        .iter()
        .map(|page| {
            page.iter()
                .filter_map(|op| match op {
                    RecordedOp::Text { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        })
        .collect()
}
