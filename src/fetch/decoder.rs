//! Tile image decoder.
//!
//! Providers return encoded imagery (PNG or JPEG). The decoder turns those
//! bytes into RGBA pixels of the canonical tile size.
//!
//! # Design Decisions
//!
//! - **Format sniffing**: the container format is guessed from the magic
//!   bytes, so one decoder serves every provider.
//! - **No resizing**: a tile of the wrong size is rejected, not scaled; the
//!   compositor relies on every loaded tile having the canonical size.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageReader, RgbaImage};

use crate::error::FetchError;
use crate::tile::DEFAULT_TILE_SIZE;

/// Decoder for provider tile imagery.
///
/// # Example
///
/// ```ignore
/// use map_buffer::fetch::TileDecoder;
///
/// let decoder = TileDecoder::new(256);
/// let pixels = decoder.decode(&png_bytes)?;
/// assert_eq!(pixels.dimensions(), (256, 256));
/// ```
#[derive(Debug, Clone)]
pub struct TileDecoder {
    tile_size: u32,
}

impl TileDecoder {
    /// Create a decoder expecting tiles of `tile_size` pixels.
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Decode encoded tile bytes into RGBA pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The format cannot be detected
    /// - Decoding fails
    /// - The image is not `tile_size x tile_size`
    pub fn decode(&self, source: &[u8]) -> Result<RgbaImage, FetchError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| FetchError::Decode {
                message: e.to_string(),
            })?;

        let img = reader.decode().map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })?;

        if img.width() != self.tile_size || img.height() != self.tile_size {
            return Err(FetchError::Decode {
                message: format!(
                    "expected {}x{} tile, got {}x{}",
                    self.tile_size,
                    self.tile_size,
                    img.width(),
                    img.height()
                ),
            });
        }

        Ok(img.into_rgba8())
    }
}

impl Default for TileDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

/// Encode RGBA pixels as PNG.
pub fn encode_png(pixels: &RgbaImage) -> Result<Bytes, FetchError> {
    let mut output = Vec::new();
    PngEncoder::new(&mut output)
        .write_image(
            pixels.as_raw(),
            pixels.width(),
            pixels.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })?;
    Ok(Bytes::from(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_tile(size: u32, color: [u8; 4]) -> Bytes {
        encode_png(&RgbaImage::from_pixel(size, size, Rgba(color))).unwrap()
    }

    #[test]
    fn test_decode_png() {
        let decoder = TileDecoder::new(16);
        let pixels = decoder.decode(&png_tile(16, [10, 20, 30, 255])).unwrap();
        assert_eq!(pixels.dimensions(), (16, 16));
        assert_eq!(pixels.get_pixel(15, 15), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        let decoder = TileDecoder::new(16);
        let result = decoder.decode(&png_tile(8, [0, 0, 0, 255]));
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let decoder = TileDecoder::new(16);
        assert!(decoder.decode(&[0x00, 0x01, 0x02, 0x03]).is_err());
        assert!(decoder.decode(&[]).is_err());
    }

    #[test]
    fn test_decode_jpeg() {
        use image::codecs::jpeg::JpegEncoder;

        let rgb = image::RgbImage::from_pixel(16, 16, image::Rgb([128, 128, 128]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&rgb)
            .unwrap();

        let pixels = TileDecoder::new(16).decode(&jpeg).unwrap();
        assert_eq!(pixels.get_pixel(8, 8)[3], 255);
    }
}
