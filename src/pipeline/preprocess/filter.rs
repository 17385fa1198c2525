//! Grayscale + contrast curve applied to every prepared page.
//!
//! Handwriting photos are usually low-contrast pencil or ink on tinted paper.
//! Flattening to luminance and pushing shadows down / highlights up makes the
//! strokes stand out for the vision model without any adaptive processing.

use super::FilterError;

/// Luminance below this is darkened, at or above it is brightened.
const SHADOW_THRESHOLD: f32 = 128.0;
const SHADOW_GAIN: f32 = 0.9;
const HIGHLIGHT_GAIN: f32 = 1.1;

/// Owned RGBA pixel buffer, row-major, 4 bytes per pixel.
///
/// Moved into the filter worker and moved back out; no two owners ever
/// see the same buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FilterError> {
        let buffer = Self {
            width,
            height,
            data,
        };
        buffer.validate()?;
        Ok(buffer)
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn validate(&self) -> Result<(), FilterError> {
        if self.data.len() != self.expected_len() {
            return Err(FilterError::BufferSize {
                expected: self.expected_len(),
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// ITU-R BT.601 luminance of one RGB sample.
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Piecewise contrast curve applied to a luminance value.
pub fn contrast_curve(luma: f32) -> u8 {
    let enhanced = if luma < SHADOW_THRESHOLD {
        luma * SHADOW_GAIN
    } else {
        (luma * HIGHLIGHT_GAIN).min(255.0)
    };
    enhanced.round().clamp(0.0, 255.0) as u8
}

/// Desaturate and contrast-stretch a buffer in place. Alpha is untouched.
///
/// Takes the buffer by value and hands it back so callers keep the
/// single-owner discipline used by the worker.
pub fn apply_contrast_filter(mut buffer: PixelBuffer) -> Result<PixelBuffer, FilterError> {
    buffer.validate()?;

    for px in buffer.data.chunks_exact_mut(4) {
        let value = contrast_curve(luminance(px[0], px[1], px[2]));
        px[0] = value;
        px[1] = value;
        px[2] = value;
    }

    Ok(buffer)
}
