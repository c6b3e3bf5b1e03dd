use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};

/// Raw camera frame as delivered on the image channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    pub timestamp: u64,
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub format: String, // "RGB8", "BGR8", "RGBA8", "BGRA8", "GRAY8", "MONO8", "JPEG"
    pub data: Vec<u8>,
}

/// Frame rate and frame size of a recording.
///
/// Fixed for the lifetime of a recording: the same values are used to open the
/// container and to check every frame written into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraParameters {
    pub fn new(fps: f64, width: u32, height: u32) -> Self {
        Self { fps, width, height }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(AcquisitionError::Config(format!(
                "frame rate must be positive, got {}",
                self.fps
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(AcquisitionError::Config(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl CameraFrame {
    /// Build an RGB8 frame stamped with the current time
    pub fn rgb8(frame_id: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp: crate::utils::now_millis(),
            frame_id,
            width,
            height,
            format: "RGB8".to_string(),
            data,
        }
    }

    fn bytes_per_pixel(&self) -> Option<usize> {
        match self.format.as_str() {
            "RGB8" | "BGR8" => Some(3),
            "GRAY8" | "MONO8" => Some(1),
            "RGBA8" | "BGRA8" => Some(4),
            _ => None,
        }
    }

    /// Calculate the expected data size for raw pixel formats
    pub fn expected_size(&self) -> Option<usize> {
        self.bytes_per_pixel()
            .map(|bpp| (self.width as usize) * (self.height as usize) * bpp)
    }

    /// Validate frame data integrity
    pub fn validate(&self) -> Result<()> {
        if let Some(expected) = self.expected_size() {
            if self.data.len() != expected {
                return Err(AcquisitionError::Conversion(format!(
                    "frame {} data size mismatch: got {} bytes, expected {} bytes",
                    self.frame_id,
                    self.data.len(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Convert the frame into the RGB layout the video encoder expects.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        if self.format == "JPEG" {
            let decoded = image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg)
                .map_err(|e| {
                    AcquisitionError::Conversion(format!(
                        "frame {}: JPEG decoding failed: {}",
                        self.frame_id, e
                    ))
                })?;
            return Ok(decoded.to_rgb8());
        }

        let bpp = self.bytes_per_pixel().ok_or_else(|| {
            AcquisitionError::Conversion(format!(
                "frame {}: unsupported pixel format '{}'",
                self.frame_id, self.format
            ))
        })?;
        self.validate()?;

        let rgb: Vec<u8> = match self.format.as_str() {
            "RGB8" => self.data.clone(),
            "BGR8" => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            "RGBA8" => self
                .data
                .chunks_exact(bpp)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            "BGRA8" => self
                .data
                .chunks_exact(bpp)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            _ => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
        };

        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| {
            AcquisitionError::Conversion(format!(
                "frame {}: failed to create image buffer",
                self.frame_id
            ))
        })
    }
}
