//! Pure Rust image backend built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image::load_from_memory_with_format` |
//! | PNG bit depth | IHDR probe ([`png_bit_depth`]) |
//! | Rotate | `DynamicImage::rotate90` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |

use super::backend::{BackendError, DecodedImage, ImageBackend, png_bit_depth};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use std::path::Path;
use std::sync::LazyLock;

pub const JPEG_QUALITY: u8 = 90;

/// Extensions the pipeline will try to decode.
const PICTURE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PICTURE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether a store path looks like a decodable image, by extension.
pub fn is_supported_image(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            supported_input_extensions().contains(&ext.as_str())
        })
}

/// Encode as baseline JPEG. Alpha is dropped; greyscale stays greyscale.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let flattened = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => None,
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLumaA16(_) => {
            Some(DynamicImage::ImageLuma8(image.to_luma8()))
        }
        _ => Some(DynamicImage::ImageRgb8(image.to_rgb8())),
    };
    let source = flattened.as_ref().unwrap_or(image);

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    source
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn bits_per_channel(color: ColorType) -> u8 {
    let channels = color.channel_count().max(1);
    color.bits_per_pixel().div_ceil(channels as u16) as u8
}

/// Pure Rust backend using the `image` crate ecosystem.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError> {
        let format = image::guess_format(bytes).map_err(|e| BackendError::Decode(e.to_string()))?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let bit_depth = match format {
            ImageFormat::Png => png_bit_depth(bytes).unwrap_or(8),
            _ => bits_per_channel(image.color()),
        };

        Ok(DecodedImage {
            image,
            format,
            bit_depth,
        })
    }

    fn rotate90(&self, image: &DynamicImage) -> DynamicImage {
        image.rotate90()
    }

    fn encode_jpeg(&self, image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
        encode_jpeg(image)
    }
}
