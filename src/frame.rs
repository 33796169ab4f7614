//! Decoded RGB24 frames and the near-black classifier used to reject thumbnail candidates.

use std::fmt;
use std::path::Path;

use image::{ImageFormat, RgbImage};

use crate::error::AppError;

/// Brightness below which a pixel counts as dark.
pub const DEFAULT_BLACK_THRESHOLD: u8 = 10;
/// A frame is black when strictly more than this share of its pixels is dark.
const DARK_RATIO_LIMIT: f64 = 0.85;
const BYTES_PER_PIXEL: usize = 3;

/// Row-major packed RGB24 bitmap. Immutable once built.
#[derive(Clone)]
pub struct PixelFrame {
    image: RgbImage,
}

impl PixelFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AppError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL));
        if expected != Some(data.len()) {
            return Err(AppError::InvalidFrame(format!(
                "{}x{} RGB24 does not match a {}-byte buffer",
                width,
                height,
                data.len()
            )));
        }
        RgbImage::from_vec(width, height, data)
            .map(|image| Self { image })
            .ok_or_else(|| AppError::InvalidFrame(format!("{}x{} buffer rejected", width, height)))
    }

    /// Frame filled with one colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, image::Rgb(rgb)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        self.image.as_raw().len() / BYTES_PER_PIXEL
    }

    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    /// Decodes the PNM image FFmpeg's `ppm` encoder writes to the pipe.
    pub fn from_ppm(bytes: &[u8]) -> Result<Self, AppError> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Pnm)
            .map_err(|e| AppError::InvalidFrame(format!("unreadable PPM: {}", e)))?;
        Ok(Self {
            image: decoded.into_rgb8(),
        })
    }

    /// Writes the frame as a PNG, creating parent directories as needed.
    pub fn save_png(&self, dest: &Path) -> Result<(), AppError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.image.save_with_format(dest, ImageFormat::Png)?;
        Ok(())
    }
}

impl PartialEq for PixelFrame {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions() && self.data() == other.data()
    }
}

impl Eq for PixelFrame {}

impl fmt::Debug for PixelFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bytes", &self.data().len())
            .finish()
    }
}

/// True when more than 85% of pixels have average brightness `(r+g+b)/3` below `threshold`.
/// A frame without pixels is rejected with `InvalidFrame`.
pub fn is_black(frame: &PixelFrame, threshold: u8) -> Result<bool, AppError> {
    let total = frame.pixel_count();
    if total == 0 {
        return Err(AppError::InvalidFrame("frame has no pixels".into()));
    }
    let dark = frame
        .data()
        .chunks_exact(BYTES_PER_PIXEL)
        .filter(|px| {
            let brightness = (px[0] as u16 + px[1] as u16 + px[2] as u16) / 3;
            brightness < threshold as u16
        })
        .count();
    Ok(dark as f64 / total as f64 > DARK_RATIO_LIMIT)
}
