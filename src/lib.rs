//! # Picturebook
//!
//! Turn a tree of image files into a single printable PDF: one picture per
//! page, fitted inside configurable margins, optionally captioned, sorted,
//! transformed and sequenced onto even or odd pages.
//!
//! # Architecture: Gather → Sort → Place → Save
//!
//! ```text
//! source store ──gather──→ [Picture]   filter, caption, text, process
//!              ──sort────→ [Picture]   optional reorder
//!              ──place───→ pages       decode, rotate-to-fill, fit, draw
//!              ──save────→ target store, temp artifacts removed
//! ```
//!
//! Each stage is driven by [`picturebook::PictureBook`]. The strategies used
//! along the way are trait objects chosen by URI (`regexp://include?pattern=..`,
//! `modtime://`) through one [`registry::ExtensionRegistry`] per extension
//! point, and pictures are read from and written to [`store::PictureStore`]s
//! opened the same way (`file:///photos`, `mem://`).
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`picturebook`] | Orchestrator: gather, sort, parallel prepare, sequential emit, save |
//! | [`geometry`] | Page sizes, units, margins, canvas, shrink-to-fit, rotate decision |
//! | [`registry`] | Scheme-keyed factory table reused by every extension point |
//! | [`extensions`] | Filter, caption, text, process, sort and progress strategies |
//! | [`store`] | Storage abstraction with filesystem and in-memory drivers |
//! | [`artifacts`] | Prefixed intermediate images and their cleanup |
//! | [`imaging`] | Decode, rotate and JPEG encode behind the `ImageBackend` trait |
//! | [`render`] | Page surface trait and its PDF implementation |
//! | [`wrap`] | Greedy word wrap against measured text width |
//! | [`picture`] | One gathered picture and where its pixels live |
//! | [`config`] | `picturebook.toml` loading, validation and merging |
//! | [`app`] | Wires configuration into stores, strategies and a run |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Registries Are Values, Not Globals
//!
//! Every registry lives in an [`extensions::Extensions`] value built at
//! startup and passed by reference. Registering a scheme twice is an error,
//! so a strategy can never be shadowed silently.
//!
//! ## Pages Are Numbered in List Order
//!
//! Decoding and fitting run in parallel, a chunk at a time, but pages are
//! emitted one picture at a time under a lock in gathered (or sorted) order.
//! Even/odd sequencing decides blank pages from the page count at emit time,
//! so the document never depends on which decode finished first.
//!
//! ## Failures Stay With Their Picture
//!
//! A picture that cannot be read, decoded, captioned, processed or laid out
//! is logged and reported as a `SkippedItem`; the run goes on. Configuration
//! problems (unknown schemes, bad parameters, unopenable stores) fail before
//! the first picture is gathered.
//!
//! ## Temp Artifacts Are Tracked, Prefixed and Removed at Save
//!
//! Rotation, processing and the 16-bit PNG guard write JPEGs named
//! `picturebook-<uuid>.jpg` into the temporary store. Save deletes exactly
//! the tracked files carrying that prefix and reports every failure.
//!
//! ## Built-in PDF Fonts Only
//!
//! Captions and text pages use the standard Helvetica or Courier faces, so
//! nothing is embedded. Text outside Latin-1 is transliterated to ASCII.

pub mod app;
pub mod artifacts;
pub mod config;
pub mod extensions;
pub mod geometry;
pub mod imaging;
pub mod output;
pub mod picture;
pub mod picturebook;
pub mod registry;
pub mod render;
pub mod store;
pub mod wrap;

#[cfg(test)]
pub(crate) mod test_helpers;
