use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};

/// 1×1 transparent GIF served whenever no frame is available.
pub const PLACEHOLDER_GIF: [u8; 26] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0xff, 0x00, 0x2c, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x00, 0x3b,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Gif,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }
}

/// An immutable encoded image. Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    format: ImageFormat,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self { bytes: bytes.into(), format }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_GIF.to_vec(), ImageFormat::Gif)
    }

    pub fn is_placeholder(&self) -> bool {
        self.format == ImageFormat::Gif && *self.bytes == PLACEHOLDER_GIF
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Encode a raw RGBA buffer as PNG.
    pub fn encode_png(pixels: &image::RgbaImage) -> PilotResult<Self> {
        let mut out = Vec::new();
        pixels
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .map_err(|e| PilotError::Image(format!("PNG encode: {e}")))?;
        Ok(Self::new(out, ImageFormat::Png))
    }

    pub fn decode(&self) -> PilotResult<image::RgbaImage> {
        let img = image::load_from_memory(&self.bytes)
            .map_err(|e| PilotError::Image(format!("load image: {e}")))?;
        Ok(img.to_rgba8())
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form accepted by vision endpoints.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_the_well_known_gif() {
        let p = EncodedImage::placeholder();
        assert!(p.is_placeholder());
        assert_eq!(p.to_base64(), "R0lGODlhAQABAAD/ACwAAAAAAQABAAACADs=");
        assert_eq!(
            p.to_data_url(),
            "data:image/gif;base64,R0lGODlhAQABAAD/ACwAAAAAAQABAAACADs="
        );
    }

    #[test]
    fn png_encode_decode_preserves_pixels() {
        let mut px = image::RgbaImage::new(3, 2);
        px.put_pixel(2, 1, image::Rgba([10, 20, 30, 255]));
        let encoded = EncodedImage::encode_png(&px).unwrap();
        assert_eq!(encoded.format(), ImageFormat::Png);
        assert!(!encoded.is_placeholder());

        let decoded = encoded.decode().unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1), &image::Rgba([10, 20, 30, 255]));
    }
}
