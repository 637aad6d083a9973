//! Built-in PDF fonts and their metrics.
//!
//! Only the standard Type 1 fonts are used, so nothing is embedded. Strings
//! are reduced to single-byte WinAnsi before measuring or drawing; anything
//! outside Latin-1 is transliterated to ASCII first.

use deunicode::deunicode_char;

/// Standard font the surface can draw with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFont {
    Helvetica,
    /// Fixed-pitch, used when an OCR-friendly face is requested.
    Courier,
}

impl BuiltinFont {
    pub fn base_name(self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::Courier => "Courier",
        }
    }

    /// Advance width of one encoded byte, in 1/1000 em.
    pub fn glyph_width(self, byte: u8) -> u16 {
        match self {
            BuiltinFont::Courier => 600,
            BuiltinFont::Helvetica => match byte {
                32..=126 => HELVETICA_WIDTHS[(byte - 32) as usize],
                _ => 556,
            },
        }
    }

    /// Width of already-encoded text at `size_pt`, in inches.
    pub fn width_inches(self, encoded: &[u8], size_pt: f64) -> f64 {
        let units: u32 = encoded.iter().map(|b| self.glyph_width(*b) as u32).sum();
        units as f64 / 1000.0 * size_pt / 72.0
    }
}

/// Helvetica AFM advance widths for bytes 32..=126.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,      // p..~
];

/// Encode to single-byte Latin-1.
///
/// Characters outside Latin-1 are transliterated to ASCII (`Ł` → `L`);
/// those with no transliteration become `?`. Control characters become spaces.
pub fn to_latin1(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c as u32 {
            0x00..=0x1F | 0x7F => out.push(b' '),
            0x20..=0x7E | 0xA0..=0xFF => out.push(c as u32 as u8),
            _ => match deunicode_char(c) {
                Some(ascii) if !ascii.is_empty() => out.extend(ascii.bytes()),
                _ => out.push(b'?'),
            },
        }
    }
    out
}

/// Font choice plus size and colour for captions and text pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font: BuiltinFont,
    pub size_pt: f64,
    pub colour: [u8; 3],
}

impl TextStyle {
    pub fn new(ocr_font: bool) -> Self {
        Self {
            font: if ocr_font {
                BuiltinFont::Courier
            } else {
                BuiltinFont::Helvetica
            },
            ..Self::default()
        }
    }

    /// Baseline-to-baseline distance in inches.
    pub fn line_height(&self) -> f64 {
        self.size_pt * 1.25 / 72.0
    }

    pub fn string_width(&self, text: &str) -> f64 {
        self.font.width_inches(&to_latin1(text), self.size_pt)
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: BuiltinFont::Helvetica,
            size_pt: 8.0,
            colour: [128, 128, 128],
        }
    }
}
