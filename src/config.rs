//! Book configuration.
//!
//! Handles loading, validating, and merging `picturebook.toml`. Stock
//! defaults are the base layer; a user file overrides just the keys it names,
//! and command-line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [page]
//! orientation = "P"          # P or L
//! size = "letter"            # a1..a7, letter, legal, tabloid
//! # width = 8.5              # explicit size; needs height as well
//! # height = 11.0
//! units = "inches"           # inches, millimeters, centimeters
//! dpi = 150.0
//! border = 0.01
//! bleed = 0.0
//! margin = 0.0               # non-zero overrides all four below
//! margin_top = 1.0
//! margin_bottom = 1.0
//! margin_left = 1.0
//! margin_right = 1.0
//!
//! [layout]
//! fill_page = false
//! even_only = false
//! odd_only = false
//! max_pages = 0              # 0 = no limit
//! ocra_font = false
//!
//! [extensions]
//! filter = []
//! caption = []
//! caption_combined = false
//! process = []
//! rotate_process = []
//! # text = "json:///path/to/text.json"
//! # sort = "modtime://"
//! progress_monitor = "null://"
//!
//! [storage]
//! source = ""                # empty = current directory
//! target = ""                # empty = current directory
//! temporary = ""             # empty = platform temp directory
//! filename = "picturebook.pdf"
//!
//! [processing]
//! max_processes = 4          # omit for auto = CPU cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::geometry::{Edges, Orientation, PageSpec, Units, page_size_inches};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE: &str = "picturebook.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("unknown page size '{0}'")]
    UnknownPageSize(String),
    #[error("unknown units '{0}'")]
    UnknownUnits(String),
    #[error("unknown orientation '{0}' (expected P or L)")]
    UnknownOrientation(String),
    #[error("no target store to save to")]
    MissingTarget,
}

/// Book configuration loaded from `picturebook.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookConfig {
    pub page: PageConfig,
    pub layout: LayoutConfig,
    pub extensions: ExtensionsConfig,
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
}

impl BookConfig {
    /// Validate values and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let page = &self.page;
        if !(page.dpi > 0.0) {
            return Err(ConfigError::Validation("page.dpi must be positive".into()));
        }
        let lengths = [
            ("page.border", page.border),
            ("page.bleed", page.bleed),
            ("page.margin", page.margin),
            ("page.margin_top", page.margin_top),
            ("page.margin_bottom", page.margin_bottom),
            ("page.margin_left", page.margin_left),
            ("page.margin_right", page.margin_right),
        ];
        if let Some((name, _)) = lengths.iter().find(|(_, v)| *v < 0.0) {
            return Err(ConfigError::Validation(format!("{name} must not be negative")));
        }
        if self.layout.even_only && self.layout.odd_only {
            return Err(ConfigError::Validation(
                "layout.even_only and layout.odd_only are mutually exclusive".into(),
            ));
        }
        if self.storage.filename.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.filename must not be empty".into(),
            ));
        }
        // Resolving the page checks orientation, units, size label and
        // explicit dimensions.
        self.page.to_page_spec()?;
        Ok(())
    }
}

/// Physical page description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageConfig {
    pub orientation: String,
    pub size: String,
    /// Explicit width; when set (with `height`) it replaces `size`.
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub units: String,
    pub dpi: f64,
    pub border: f64,
    pub bleed: f64,
    /// Uniform margin. Non-zero values override the directional margins.
    pub margin: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            orientation: "P".into(),
            size: "letter".into(),
            width: None,
            height: None,
            units: "inches".into(),
            dpi: 150.0,
            border: 0.01,
            bleed: 0.0,
            margin: 0.0,
            margin_top: 1.0,
            margin_bottom: 1.0,
            margin_left: 1.0,
            margin_right: 1.0,
        }
    }
}

impl PageConfig {
    /// The four margins after applying the uniform override.
    pub fn effective_margins(&self) -> Edges {
        if self.margin != 0.0 {
            return Edges::uniform(self.margin);
        }
        Edges {
            top: self.margin_top,
            bottom: self.margin_bottom,
            left: self.margin_left,
            right: self.margin_right,
        }
    }

    /// Portrait trim size in inches, from explicit dimensions or the size label.
    pub fn dimensions_inches(&self) -> Result<(f64, f64), ConfigError> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => {
                let units = Units::parse(&self.units)
                    .ok_or_else(|| ConfigError::UnknownUnits(self.units.clone()))?;
                if !(width > 0.0 && height > 0.0) {
                    return Err(ConfigError::Validation(
                        "page.width and page.height must be positive".into(),
                    ));
                }
                Ok((units.to_inches(width), units.to_inches(height)))
            }
            (None, None) => {
                page_size_inches(&self.size)
                    .ok_or_else(|| ConfigError::UnknownPageSize(self.size.clone()))
            }
            _ => Err(ConfigError::Validation(
                "page.width and page.height must be given together".into(),
            )),
        }
    }

    /// Resolve into the inch-based description the geometry engine uses.
    pub fn to_page_spec(&self) -> Result<PageSpec, ConfigError> {
        let orientation = Orientation::parse(&self.orientation)
            .ok_or_else(|| ConfigError::UnknownOrientation(self.orientation.clone()))?;
        let (width, height) = self.dimensions_inches()?;

        Ok(PageSpec {
            width,
            height,
            orientation,
            dpi: self.dpi,
            border: self.border,
            bleed: self.bleed,
            margins: self.effective_margins(),
        })
    }
}

/// Page sequencing and rendering switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub fill_page: bool,
    pub even_only: bool,
    pub odd_only: bool,
    pub max_pages: usize,
    pub ocra_font: bool,
}

/// Extension URIs, resolved through the registries at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionsConfig {
    pub filter: Vec<String>,
    pub caption: Vec<String>,
    /// Join every non-empty caption instead of taking the first.
    pub caption_combined: bool,
    pub process: Vec<String>,
    pub rotate_process: Vec<String>,
    pub text: Option<String>,
    pub sort: Option<String>,
    pub progress_monitor: String,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            caption: Vec::new(),
            caption_combined: false,
            process: Vec::new(),
            rotate_process: Vec::new(),
            text: None,
            sort: None,
            progress_monitor: "null://".into(),
        }
    }
}

/// Store locations: URIs or bare paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub source: String,
    pub target: String,
    pub temporary: String,
    pub filename: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: String::new(),
            temporary: String::new(),
            filename: "picturebook.pdf".into(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel preparation workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BookConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BookConfig, ConfigError> {
    let merged = match overlay {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: BookConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `path` over the stock defaults. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<BookConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(path)?)
}

/// Returns a fully-commented stock `picturebook.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Picturebook Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Command-line flags override them.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Page
# ---------------------------------------------------------------------------
[page]
# P (portrait) or L (landscape).
orientation = "P"

# One of a1, a2, a3, a4, a5, a6, a7, letter, legal, tabloid.
size = "letter"

# Explicit page size instead of a label. Give both or neither.
# width = 8.5
# height = 11.0

# Units for width and height: inches, millimeters or centimeters.
units = "inches"

# Resolution images are fitted at.
dpi = 150.0

# Frame drawn around each image, in inches.
border = 0.01

# Extra space on every side for print trimming, in inches.
bleed = 0.0

# Uniform margin in inches. When non-zero it replaces the four below.
margin = 0.0
margin_top = 1.0
margin_bottom = 1.0
margin_left = 1.0
margin_right = 1.0

# ---------------------------------------------------------------------------
# Layout
# ---------------------------------------------------------------------------
[layout]
# Rotate images a quarter turn when that fills the page better.
fill_page = false

# Put pictures only on even (or only on odd) pages, inserting blanks.
even_only = false
odd_only = false

# Stop after this many pictures. 0 means no limit.
max_pages = 0

# Use a fixed-pitch font for captions and text pages.
ocra_font = false

# ---------------------------------------------------------------------------
# Extensions (run `picturebook schemes` for the list)
# ---------------------------------------------------------------------------
[extensions]
filter = []
caption = []
# Join all non-empty captions instead of using the first.
caption_combined = false
process = []
# Processes applied only to images rotated by fill_page.
rotate_process = []
# text = "json:///path/to/text.json"
# sort = "modtime://"
progress_monitor = "null://"

# ---------------------------------------------------------------------------
# Storage (URIs or plain paths)
# ---------------------------------------------------------------------------
[storage]
# Empty means the current directory.
source = ""
target = ""
# Empty means the platform temp directory.
temporary = ""
filename = "picturebook.pdf"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for decoding and fitting.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
