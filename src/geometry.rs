//! Page geometry: pure calculation functions.
//!
//! Everything here works in two spaces: **inches** (what the page surface
//! draws in) and **pixels at the configured DPI** (what fitting compares
//! image dimensions against). Nothing here touches pixels or files.
//!
//! ```text
//! ┌──────────────────────────── page (incl. 2× bleed) ─┐
//! │ margin (+ 2× bleed)                                │
//! │   ┌── border ───────────────────────────────┐      │
//! │   │ ┌── canvas ──────────────────────────┐  │      │
//! │   │ │   image, centered, shrink-to-fit   │  │      │
//! │   │ └────────────────────────────────────┘  │      │
//! │   └─────────────────────────────────────────┘      │
//! └────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

pub const MM_PER_INCH: f64 = 25.4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("image has a zero-sized dimension ({width}x{height})")]
    ZeroSizedImage { width: f64, height: f64 },
    #[error("DPI must be positive, got {0}")]
    InvalidDpi(f64),
    #[error("margins and borders leave no room for images ({width:.1}x{height:.1} px canvas)")]
    EmptyCanvas { width: f64, height: f64 },
}

/// Document orientation, `P` or `L`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "portrait" => Some(Orientation::Portrait),
            "l" | "landscape" => Some(Orientation::Landscape),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Orientation::Portrait => "P",
            Orientation::Landscape => "L",
        }
    }
}

/// Unit of explicit page dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Inches,
    Millimeters,
    Centimeters,
}

impl Units {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inches" | "inch" | "in" => Some(Units::Inches),
            "millimeters" | "millimetres" | "mm" => Some(Units::Millimeters),
            "centimeters" | "centimetres" | "cm" => Some(Units::Centimeters),
            _ => None,
        }
    }

    pub fn to_inches(self, value: f64) -> f64 {
        match self {
            Units::Inches => value,
            Units::Millimeters => value / MM_PER_INCH,
            Units::Centimeters => value * 10.0 / MM_PER_INCH,
        }
    }
}

/// Recognized page-size labels, in listing order.
pub const PAGE_SIZES: &[&str] = &[
    "a1", "a2", "a3", "a4", "a5", "a6", "a7", "letter", "legal", "tabloid",
];

/// Portrait width and height in inches for a page-size label.
pub fn page_size_inches(label: &str) -> Option<(f64, f64)> {
    let mm = |w: f64, h: f64| Some((w / MM_PER_INCH, h / MM_PER_INCH));
    match label.trim().to_ascii_lowercase().as_str() {
        "a1" => mm(594.0, 841.0),
        "a2" => mm(420.0, 594.0),
        "a3" => mm(297.0, 420.0),
        "a4" => mm(210.0, 297.0),
        "a5" => mm(148.0, 210.0),
        "a6" => mm(105.0, 148.0),
        "a7" => mm(74.0, 105.0),
        "letter" => Some((8.5, 11.0)),
        "legal" => Some((8.5, 14.0)),
        "tabloid" => Some((11.0, 17.0)),
        _ => None,
    }
}

/// Shape of an image from its raw pixel aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrientation {
    Portrait,
    Landscape,
    Square,
}

impl ImageOrientation {
    pub fn of(width: f64, height: f64) -> Self {
        if height > width {
            ImageOrientation::Portrait
        } else if width > height {
            ImageOrientation::Landscape
        } else {
            ImageOrientation::Square
        }
    }
}

/// Four-sided measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Edges {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            bottom: v,
            left: v,
            right: v,
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            top: f(self.top),
            bottom: f(self.bottom),
            left: f(self.left),
            right: f(self.right),
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

/// Axis-aligned rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Grow on every side by `by`.
    pub fn outset(&self, by: f64) -> Self {
        Self::new(
            self.x - by,
            self.y - by,
            self.width + 2.0 * by,
            self.height + 2.0 * by,
        )
    }

    /// Divide every coordinate by `divisor` (pixels → inches).
    pub fn per(&self, divisor: f64) -> Self {
        Self::new(
            self.x / divisor,
            self.y / divisor,
            self.width / divisor,
            self.height / divisor,
        )
    }
}

/// Resolved page description, all lengths in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpec {
    /// Trim size before bleed.
    pub width: f64,
    pub height: f64,
    pub orientation: Orientation,
    pub dpi: f64,
    pub border: f64,
    pub bleed: f64,
    pub margins: Edges,
}

/// Pixel-space page layout derived once per book.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub dpi: f64,
    pub orientation: Orientation,
    /// Physical page size in inches, bleed included.
    pub page_width_in: f64,
    pub page_height_in: f64,
    pub page_width: f64,
    pub page_height: f64,
    /// Margins in pixels, each including a doubled bleed allowance.
    pub margins: Edges,
    /// Border width in pixels, the same on all sides.
    pub border: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl PageGeometry {
    pub fn new(spec: &PageSpec) -> Result<Self, LayoutError> {
        if !(spec.dpi > 0.0) {
            return Err(LayoutError::InvalidDpi(spec.dpi));
        }

        let (mut width, mut height) = (spec.width, spec.height);
        if spec.orientation == Orientation::Landscape && width < height {
            std::mem::swap(&mut width, &mut height);
        }

        let page_width_in = width + 2.0 * spec.bleed;
        let page_height_in = height + 2.0 * spec.bleed;
        let page_width = page_width_in * spec.dpi;
        let page_height = page_height_in * spec.dpi;

        let margins = spec.margins.map(|m| (m + 2.0 * spec.bleed) * spec.dpi);
        let border = spec.border * spec.dpi;

        let canvas_width = page_width - (margins.horizontal() + 2.0 * border);
        let canvas_height = page_height - (margins.vertical() + 2.0 * border);
        if canvas_width <= 0.0 || canvas_height <= 0.0 {
            return Err(LayoutError::EmptyCanvas {
                width: canvas_width,
                height: canvas_height,
            });
        }

        Ok(Self {
            dpi: spec.dpi,
            orientation: spec.orientation,
            page_width_in,
            page_height_in,
            page_width,
            page_height,
            margins,
            border,
            canvas_width,
            canvas_height,
        })
    }

    /// Shrink-to-fit and center an image of the given pixel size.
    ///
    /// Images are never enlarged. The result is in pixels, origin at the
    /// page's top-left corner.
    pub fn fit(&self, width: f64, height: f64) -> Result<Rect, LayoutError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(LayoutError::ZeroSizedImage { width, height });
        }

        let (w, h) = shrink_to_fit(width, height, self.canvas_width, self.canvas_height);
        let x = self.margins.left + self.border + (self.canvas_width - w) / 2.0;
        let y = self.margins.top + self.border + (self.canvas_height - h) / 2.0;
        Ok(Rect::new(x, y, w, h))
    }

    /// Convert a pixel-space rectangle to inches.
    pub fn to_inches(&self, rect: &Rect) -> Rect {
        rect.per(self.dpi)
    }

    pub fn border_inches(&self) -> f64 {
        self.border / self.dpi
    }

    /// Text area for a long-text page, in inches.
    pub fn text_area_inches(&self) -> Rect {
        self.to_inches(&Rect::new(
            self.margins.left + self.border,
            self.margins.top + self.border,
            self.canvas_width,
            self.canvas_height,
        ))
    }

    /// Whether rotating a quarter turn would use the page better.
    ///
    /// `reserve` is vertical space (pixels) kept free below the image for a
    /// caption. A landscape image in a portrait book rotates when it is
    /// wider than the canvas; a portrait image in a landscape book rotates
    /// when it is taller than the canvas less the reserve.
    pub fn should_rotate(&self, width: f64, height: f64, reserve: f64) -> bool {
        let max_h = self.canvas_height - reserve;
        match (self.orientation, ImageOrientation::of(width, height)) {
            (Orientation::Portrait, ImageOrientation::Landscape) => width > self.canvas_width,
            (Orientation::Landscape, ImageOrientation::Portrait) => height > max_h,
            _ => false,
        }
    }
}

/// Uniformly scale `(w, h)` down until both fit `(max_w, max_h)`.
pub fn shrink_to_fit(mut w: f64, mut h: f64, max_w: f64, max_h: f64) -> (f64, f64) {
    while w > max_w || h > max_h {
        if w > max_w {
            h *= max_w / w;
            w = max_w;
        }
        if h > max_h {
            w *= max_h / h;
            h = max_h;
        }
    }
    (w, h)
}
