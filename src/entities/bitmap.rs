//! Decoded RGBA8 bitmaps and snapshot export.
//!
//! `Bitmap` is the unit that travels through the frame queue and lands on the
//! display surface. Pixels sit behind an `Arc` so handing a bitmap to the
//! surface, the event bus and a snapshot costs a refcount bump, not a copy.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbaImage};

use super::error::ImageError;

/// Immutable decoded bitmap (RGBA, 8 bits per channel, row-major).
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Bitmap {
    /// Wrap raw RGBA bytes. Length must be `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImageError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit(format!("{}x{} overflows", width, height)))?;

        if pixels.len() != expected {
            return Err(ImageError::Decode(format!(
                "pixel buffer is {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            pixels: Arc::new(pixels),
        })
    }

    /// Single-color bitmap, handy for placeholders and tests.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        for px in pixels.chunks_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            pixels: Arc::new(rgba.into_raw()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at (x, y), or None outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// True when both bitmaps share the same pixel allocation.
    pub fn same_pixels(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.as_ref().clone())
    }
}

/// Generic binary image object exported from the currently displayed bitmap.
#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageBlob {
    /// Encode a bitmap as PNG.
    pub fn from_bitmap(bitmap: &Bitmap) -> Result<Self, ImageError> {
        let rgba = bitmap
            .to_rgba_image()
            .ok_or_else(|| ImageError::Decode("bitmap buffer length mismatch".to_string()))?;

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(rgba).write_to(&mut cursor, ImageFormat::Png)?;

        Ok(Self {
            mime_type: "image/png",
            width: bitmap.width(),
            height: bitmap.height(),
            data: cursor.into_inner(),
        })
    }
}
