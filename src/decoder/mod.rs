pub mod qr;

use chrono::{DateTime, Utc};
use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::camera::{Frame, FrameError, Resolution};

pub use qr::QrDecoder;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl DecodeResult {
    pub fn new(payload: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload: payload.into(),
            timestamp,
        }
    }
}

/// Turns a luma bitmap into a payload.
///
/// Implementations are stateless across calls and perform no I/O. `None`
/// means nothing was found in this frame, which is the common case and not
/// an error.
pub trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, image: &GrayImage) -> Option<String>;
}

/// Off-screen bitmap the sampling loop copies frames into.
///
/// The luma buffer is reused between frames of the same size. With a target
/// resolution, frames larger than the target are downscaled to it before
/// decoding; smaller frames are decoded as-is.
pub struct FrameBuffer {
    target: Option<Resolution>,
    luma: GrayImage,
    scaled: Option<GrayImage>,
}

impl FrameBuffer {
    pub fn new(target: Option<Resolution>) -> Self {
        Self {
            target,
            luma: GrayImage::new(0, 0),
            scaled: None,
        }
    }

    pub fn target(&self) -> Option<Resolution> {
        self.target
    }

    pub fn load(&mut self, frame: &Frame) -> Result<&GrayImage, FrameError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(FrameError::Malformed(format!(
                "zero-sized frame {}x{}",
                frame.width, frame.height
            )));
        }
        if frame.pixels.len() != frame.expected_len() {
            return Err(FrameError::Malformed(format!(
                "{}x{} frame carries {} bytes, expected {}",
                frame.width,
                frame.height,
                frame.pixels.len(),
                frame.expected_len()
            )));
        }

        if self.luma.dimensions() != (frame.width, frame.height) {
            self.luma = GrayImage::new(frame.width, frame.height);
        }
        for (dst, px) in self.luma.pixels_mut().zip(frame.pixels.chunks_exact(4)) {
            *dst = Luma([rgba_to_luma(px[0], px[1], px[2])]);
        }

        match self.target {
            Some(target)
                if !Resolution::new(frame.width, frame.height).fits_within(&target) =>
            {
                let scaled = imageops::resize(
                    &self.luma,
                    target.width,
                    target.height,
                    imageops::FilterType::Triangle,
                );
                Ok(self.scaled.insert(scaled))
            }
            _ => Ok(&self.luma),
        }
    }
}

// Rec. 709 weights, fixed point.
fn rgba_to_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 2126 * r as u32 + 7152 * g as u32 + 722 * b as u32;
    (y / 10_000) as u8
}
