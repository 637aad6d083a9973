//! Image decoding and re-encoding, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory_with_format` |
//! | **16-bit PNG probe** | IHDR header read ([`png_bit_depth`]) |
//! | **CMYK JPEG probe** | SOF header read ([`jpeg_components`]) |
//! | **Rotate** | `DynamicImage::rotate90` |
//! | **Encode → JPEG** | `JpegEncoder`, quality 90 |
//!
//! The module is split into:
//! - **Backend**: [`ImageBackend`] trait and shared types
//! - **Rust backend**: [`RustBackend`] and extension helpers

pub mod backend;
pub mod rust_backend;

pub use backend::{
    BackendError, DecodedImage, Dimensions, ImageBackend, jpeg_components, png_bit_depth,
};
pub use rust_backend::{RustBackend, encode_jpeg, is_supported_image, supported_input_extensions};
