//! Page-rendering surface.
//!
//! The orchestrator draws through the [`PageSurface`] trait in inches with a
//! top-left origin; [`PdfSurface`] turns that into a PDF with `lopdf`. Tests
//! substitute a recording surface.

pub mod font;
pub mod pdf;

pub use font::{BuiltinFont, TextStyle, to_latin1};
pub use pdf::PdfSurface;

use crate::geometry::Rect;
use crate::wrap::TextMeasure;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no page has been added yet")]
    NoPage,
    #[error("document was already written")]
    Finished,
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];

/// How the image bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// Passed through untouched.
    Jpeg,
    /// Decoded and stored as raw samples.
    Png,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSpace {
    Gray,
    Rgb,
}

/// Encoded image ready to be placed on a page.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub encoding: ImageEncoding,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub colour: ColourSpace,
}

pub trait PageSurface: TextMeasure + Send {
    /// Start a new, empty page. Later drawing goes onto it.
    fn add_page(&mut self);

    fn page_count(&self) -> usize;

    fn fill_rect(&mut self, rect: Rect, colour: Rgb) -> Result<(), RenderError>;

    fn draw_image(&mut self, image: &EmbeddedImage, rect: Rect) -> Result<(), RenderError>;

    /// Draw one line of text with its baseline at `y`.
    fn draw_text(&mut self, x: f64, y: f64, text: &str) -> Result<(), RenderError>;

    /// Baseline-to-baseline distance in inches.
    fn line_height(&self) -> f64;

    /// Serialize the finished document. Only valid once.
    fn finish(&mut self, out: &mut dyn Write) -> Result<(), RenderError>;
}
