//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait covers the three pixel operations the
//! pipeline needs: decode, rotate a quarter turn, and encode to JPEG. The
//! production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Pixel width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded image plus what the container said about it.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    /// Bits per channel as stored in the file. For PNG this comes from the
    /// IHDR header rather than the decoded buffer.
    pub bit_depth: u8,
}

impl DecodedImage {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    /// PNGs with more than 8 bits per channel, which the page surface
    /// cannot embed directly.
    pub fn is_deep_png(&self) -> bool {
        self.format == ImageFormat::Png && self.bit_depth > 8
    }
}

pub trait ImageBackend: Sync + Send {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError>;

    /// Rotate 90° clockwise.
    fn rotate90(&self, image: &DynamicImage) -> DynamicImage;

    fn encode_jpeg(&self, image: &DynamicImage) -> Result<Vec<u8>, BackendError>;
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Bit depth from a PNG's IHDR chunk, or `None` if `bytes` is not a PNG.
///
/// Layout: 8-byte signature, 4-byte length, `IHDR`, width (4), height (4),
/// then the bit depth byte at offset 24.
pub fn png_bit_depth(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 25 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    Some(bytes[24])
}

/// Colour components declared by a JPEG's frame header, or `None` if `bytes`
/// is not a JPEG or no frame header precedes the first scan.
///
/// Marker segments after SOI are `FF xx` plus a big-endian length that
/// counts itself. A SOFn segment holds precision (1), height (2), width (2)
/// and then the component count, 9 bytes past the marker.
pub fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 4 || bytes[..2] != [0xFF, 0xD8] {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        match bytes[pos + 1] {
            0xFF => pos += 1,
            0x01 | 0xD0..=0xD8 => pos += 2,
            0xD9 | 0xDA => return None,
            marker => {
                if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
                    return bytes.get(pos + 9).copied();
                }
                let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
                pos += 2 + len;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(depth: u8) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&10u32.to_be_bytes());
        bytes.extend_from_slice(&20u32.to_be_bytes());
        bytes.push(depth);
        bytes.extend_from_slice(&[2, 0, 0, 0]);
        bytes
    }

    #[test]
    fn reads_png_bit_depth() {
        assert_eq!(png_bit_depth(&png_header(8)), Some(8));
        assert_eq!(png_bit_depth(&png_header(16)), Some(16));
    }

    #[test]
    fn non_png_has_no_bit_depth() {
        assert_eq!(png_bit_depth(b"\xFF\xD8\xFF\xE0 not a png at all, really"), None);
        assert_eq!(png_bit_depth(&png_header(8)[..20]), None);
    }

    /// SOI, an APP0 stub, then a baseline frame header with `components`.
    fn jpeg_header(components: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00];
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
        bytes.extend_from_slice(&20u16.to_be_bytes());
        bytes.extend_from_slice(&10u16.to_be_bytes());
        bytes.push(components);
        bytes.extend_from_slice(&[1, 0x11, 0]);
        bytes
    }

    #[test]
    fn reads_jpeg_component_count() {
        assert_eq!(jpeg_components(&jpeg_header(1)), Some(1));
        assert_eq!(jpeg_components(&jpeg_header(3)), Some(3));
        assert_eq!(jpeg_components(&jpeg_header(4)), Some(4));
    }

    #[test]
    fn encoded_jpeg_declares_three_components() {
        let bytes = crate::test_helpers::jpeg_bytes(8, 4);
        assert_eq!(jpeg_components(&bytes), Some(3));
    }

    #[test]
    fn non_jpeg_has_no_components() {
        assert_eq!(jpeg_components(&png_header(8)), None);
        assert_eq!(jpeg_components(&[0xFF, 0xD8, 0xFF, 0xDA, 0, 2]), None);
        assert_eq!(jpeg_components(&jpeg_header(3)[..10]), None);
    }

    #[test]
    fn deep_png_detection_requires_png_format() {
        let image = DynamicImage::new_rgb8(1, 1);
        let deep = DecodedImage {
            image: image.clone(),
            format: ImageFormat::Png,
            bit_depth: 16,
        };
        let tiff = DecodedImage {
            image,
            format: ImageFormat::Tiff,
            bit_depth: 16,
        };
        assert!(deep.is_deep_png());
        assert!(!tiff.is_deep_png());
    }
}
