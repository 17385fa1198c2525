//! Image preparation for the grading model.
//!
//! Pipeline flow, per file:
//! 1. HEIC/HEIF normalization (best-effort)
//! 2. Decode + EXIF orientation
//! 3. Downscale so the longer side is at most `max_dimension` (never upscale)
//! 4. Contrast filter on the worker thread
//! 5. JPEG encode + base64
//!
//! Output pages are small enough to send several in one request while
//! keeping handwriting legible.

use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbaImage};
use serde::Serialize;
use uuid::Uuid;

use super::filter::PixelBuffer;
use super::worker::FilterWorker;
use super::PrepareError;
use crate::pipeline::intake::{FormatNormalizer, SourceFile};

/// Longest allowed side of a prepared page, in pixels.
pub const MAX_DIMENSION: u32 = 1600;

/// JPEG quality of prepared pages (0–100).
pub const JPEG_QUALITY: u8 = 80;

pub const PREPARED_MIME_TYPE: &str = "image/jpeg";

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Resize filter quality levels.
///
/// CatmullRom (cubic spline) is preferred over Lanczos3 for handwriting:
/// Lanczos3 rings around high-contrast strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeQuality {
    /// CatmullRom. Sharpest for handwriting.
    High,
    /// Triangle (bilinear). Fast.
    Fast,
}

impl ResizeQuality {
    fn filter_type(self) -> FilterType {
        match self {
            Self::High => FilterType::CatmullRom,
            Self::Fast => FilterType::Triangle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrepareConfig {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub resize_quality: ResizeQuality,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            jpeg_quality: JPEG_QUALITY,
            resize_quality: ResizeQuality::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Result type
// ═══════════════════════════════════════════════════════════

/// A downscaled, contrast-enhanced JPEG page ready for grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedImage {
    /// Opaque identifier, unique per prepared image.
    pub id: String,
    /// Base64-encoded JPEG payload.
    pub base64: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// Name of the file this page was prepared from.
    pub source_name: String,
}

impl PreparedImage {
    /// `data:` URL usable as a preview source.
    pub fn preview_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    /// Raw JPEG bytes (decoded from the base64 payload).
    pub fn jpeg_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.base64)
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation service
// ═══════════════════════════════════════════════════════════

/// Fixes image orientation from EXIF metadata.
///
/// Phone photos embed rotation in EXIF tag 0x0112; without correction,
/// portrait photos of a page reach the model sideways.
pub trait OrientationCorrector: Send + Sync {
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage;
}

/// EXIF-based orientation correction via `kamadak-exif`.
///
/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub struct ExifOrientationCorrector;

impl OrientationCorrector for ExifOrientationCorrector {
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        apply_orientation(image, read_exif_orientation(raw_bytes))
    }
}

/// No-op orientation corrector.
pub struct NoOpOrientationCorrector;

impl OrientationCorrector for NoOpOrientationCorrector {
    fn correct(&self, _raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        image
    }
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// ImagePreparer
// ═══════════════════════════════════════════════════════════

/// Turns one source file into one `PreparedImage`.
pub struct ImagePreparer {
    normalizer: FormatNormalizer,
    orientation: Box<dyn OrientationCorrector>,
    config: PrepareConfig,
}

impl ImagePreparer {
    pub fn new(
        normalizer: FormatNormalizer,
        orientation: Box<dyn OrientationCorrector>,
        config: PrepareConfig,
    ) -> Self {
        Self {
            normalizer,
            orientation,
            config,
        }
    }

    /// Production preparer: system HEIF converter, EXIF orientation, defaults.
    pub fn standard() -> Self {
        Self::new(
            FormatNormalizer::system(),
            Box::new(ExifOrientationCorrector),
            PrepareConfig::default(),
        )
    }

    pub fn config(&self) -> &PrepareConfig {
        &self.config
    }

    pub async fn prepare(
        &self,
        file: &SourceFile,
        worker: &FilterWorker,
    ) -> Result<PreparedImage, PrepareError> {
        // 1. Normalize legacy formats
        let bytes = self.normalizer.normalize(file);

        // 2. Decode + orientation
        let decoded = image::load_from_memory(&bytes).map_err(|e| PrepareError::Decode {
            name: file.name.clone(),
            reason: e.to_string(),
        })?;
        let decoded = self.orientation.correct(&bytes, decoded);
        let (orig_w, orig_h) = decoded.dimensions();

        // 3. Downscale onto an RGBA surface
        let (width, height) = compute_target_dimensions(orig_w, orig_h, self.config.max_dimension);
        let rgba = decoded.to_rgba8();
        let surface = if (width, height) == (orig_w, orig_h) {
            rgba
        } else {
            image::imageops::resize(&rgba, width, height, self.config.resize_quality.filter_type())
        };

        // 4. Filter off-thread
        let buffer = PixelBuffer::new(width, height, surface.into_raw())?;
        let filtered = worker.filter(buffer).await?;

        // 5. Encode
        let jpeg = encode_jpeg(filtered, self.config.jpeg_quality).map_err(|reason| {
            PrepareError::Encode {
                name: file.name.clone(),
                reason,
            }
        })?;

        tracing::debug!(
            file = %file.name,
            original = format!("{orig_w}x{orig_h}"),
            output = format!("{width}x{height}"),
            jpeg_size = jpeg.len(),
            "Image prepared for grading"
        );

        Ok(PreparedImage {
            id: Uuid::new_v4().to_string(),
            base64: base64::engine::general_purpose::STANDARD.encode(&jpeg),
            mime_type: PREPARED_MIME_TYPE.to_string(),
            width,
            height,
            source_name: file.name.clone(),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Pure helper functions
// ═══════════════════════════════════════════════════════════

/// Scale so the longer side equals `max_dim` when either side exceeds it.
/// Aspect ratio is kept; small images are NOT upscaled.
pub fn compute_target_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let scaled = |side: u32, longest: u32| {
        ((side as f64 * max_dim as f64 / longest as f64).round() as u32).max(1)
    };

    if width > height && width > max_dim {
        (max_dim, scaled(height, width))
    } else if height > max_dim {
        (scaled(width, height), max_dim)
    } else {
        (width, height)
    }
}

/// Encode a filtered RGBA buffer as JPEG. Alpha is dropped.
fn encode_jpeg(buffer: PixelBuffer, quality: u8) -> Result<Vec<u8>, String> {
    let (w, h) = (buffer.width, buffer.height);
    let rgba = RgbaImage::from_raw(w, h, buffer.data)
        .ok_or_else(|| format!("buffer does not match {w}x{h}"))?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality.clamp(1, 100)))
        .map_err(|e| format!("JPEG encoding failed: {e}"))?;
    Ok(cursor.into_inner())
}
