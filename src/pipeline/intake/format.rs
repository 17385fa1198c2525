//! Format sniffing and HEIC/HEIF normalization.
//!
//! Phone cameras (iOS in particular) save HEIC by default, which the `image`
//! decoders cannot read. Such files are converted to JPEG before decoding.
//! Conversion is best-effort: on failure the original bytes go through
//! unchanged and the decode step reports the problem.

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::{NormalizeError, SourceFile};

/// JPEG quality used for HEIC conversion (0–100).
pub const HEIF_JPEG_QUALITY: u8 = 70;

const HEIF_EXTENSIONS: &[&str] = &[".heic", ".heif"];

/// ISO-BMFF major brands that identify HEIF stills.
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1",
];

/// Image container detected from magic bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Jpeg,
    Png,
    Tiff,
    Heif,
    Unknown,
}

impl ImageKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
            Self::Heif => "image/heic",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// Detect the container from magic bytes (NOT file extensions).
pub fn sniff_image_kind(bytes: &[u8]) -> ImageKind {
    match bytes {
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => ImageKind::Jpeg,
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => ImageKind::Png,
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => ImageKind::Tiff,
        // HEIF: "ftyp" at offset 4 followed by a HEIF brand
        _ if bytes.len() >= 12
            && &bytes[4..8] == b"ftyp"
            && HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == *brand) =>
        {
            ImageKind::Heif
        }
        _ => ImageKind::Unknown,
    }
}

/// True when the file is named like a HEIC/HEIF photo or carries a HEIF header.
pub fn is_heif(file: &SourceFile) -> bool {
    let lower = file.name.to_lowercase();
    HEIF_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || sniff_image_kind(&file.bytes) == ImageKind::Heif
}

// ═══════════════════════════════════════════════════════════
// Converter service
// ═══════════════════════════════════════════════════════════

/// Converts HEIC/HEIF bytes into a format the decoders understand.
pub trait HeifConverter: Send + Sync {
    fn convert_to_jpeg(&self, bytes: &[u8], quality: u8) -> Result<Vec<u8>, NormalizeError>;
}

/// Converter backed by libheif's `heif-convert` command-line tool.
pub struct HeifConvertCli {
    program: PathBuf,
}

impl HeifConvertCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for HeifConvertCli {
    fn default() -> Self {
        Self::new("heif-convert")
    }
}

impl HeifConverter for HeifConvertCli {
    fn convert_to_jpeg(&self, bytes: &[u8], quality: u8) -> Result<Vec<u8>, NormalizeError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.heic");
        let output = dir.path().join("output.jpg");
        std::fs::write(&input, bytes)?;

        let result = Command::new(&self.program)
            .arg("-q")
            .arg(quality.min(100).to_string())
            .arg(&input)
            .arg(&output)
            .output()
            .map_err(|e| NormalizeError::ToolUnavailable {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(NormalizeError::ConversionFailed(
                String::from_utf8_lossy(&result.stderr).trim().to_string(),
            ));
        }

        let converted = std::fs::read(&output)?;
        if converted.is_empty() {
            return Err(NormalizeError::ConversionFailed(
                "converter produced no output".into(),
            ));
        }
        Ok(converted)
    }
}

// ═══════════════════════════════════════════════════════════
// Normalizer
// ═══════════════════════════════════════════════════════════

/// Turns legacy camera formats into decodable bytes before preparation.
pub struct FormatNormalizer {
    converter: Box<dyn HeifConverter>,
    quality: u8,
}

impl FormatNormalizer {
    pub fn new(converter: Box<dyn HeifConverter>) -> Self {
        Self {
            converter,
            quality: HEIF_JPEG_QUALITY,
        }
    }

    /// Production normalizer using `heif-convert` from `PATH`.
    pub fn system() -> Self {
        Self::new(Box::new(HeifConvertCli::default()))
    }

    /// Bytes ready for decoding. Borrowed unless a conversion happened.
    ///
    /// Never fails: conversion errors are logged and the original bytes
    /// are returned.
    pub fn normalize<'a>(&self, file: &'a SourceFile) -> Cow<'a, [u8]> {
        if !is_heif(file) {
            return Cow::Borrowed(&file.bytes);
        }

        match self.converter.convert_to_jpeg(&file.bytes, self.quality) {
            Ok(jpeg) => {
                tracing::debug!(
                    file = %file.name,
                    from_bytes = file.bytes.len(),
                    to_bytes = jpeg.len(),
                    "Converted HEIF image to JPEG"
                );
                Cow::Owned(jpeg)
            }
            Err(e) => {
                tracing::warn!(
                    file = %file.name,
                    error = %e,
                    "HEIF conversion failed, passing original bytes through"
                );
                Cow::Borrowed(&file.bytes)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Mock implementations (testing)
// ═══════════════════════════════════════════════════════════

/// Converter that always fails. Used by degraded-path tests.
pub struct FailingConverter;

impl HeifConverter for FailingConverter {
    fn convert_to_jpeg(&self, _bytes: &[u8], _quality: u8) -> Result<Vec<u8>, NormalizeError> {
        Err(NormalizeError::ConversionFailed("mock conversion failure".into()))
    }
}

/// Converter returning fixed bytes, recording nothing.
pub struct FixedConverter {
    output: Vec<u8>,
}

impl FixedConverter {
    pub fn new(output: Vec<u8>) -> Self {
        Self { output }
    }
}

impl HeifConverter for FixedConverter {
    fn convert_to_jpeg(&self, _bytes: &[u8], _quality: u8) -> Result<Vec<u8>, NormalizeError> {
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heif_header() -> Vec<u8> {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x18];
        bytes.extend_from_slice(b"ftypheic");
        bytes.extend_from_slice(&[0u8; 16]);
        bytes
    }

    #[test]
    fn sniff_common_formats() {
        assert_eq!(sniff_image_kind(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageKind::Jpeg);
        assert_eq!(
            sniff_image_kind(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            ImageKind::Png
        );
        assert_eq!(sniff_image_kind(&[0x49, 0x49, 0x2A, 0x00]), ImageKind::Tiff);
        assert_eq!(sniff_image_kind(&[0x4D, 0x4D, 0x00, 0x2A]), ImageKind::Tiff);
        assert_eq!(sniff_image_kind(&heif_header()), ImageKind::Heif);
        assert_eq!(sniff_image_kind(b"hello"), ImageKind::Unknown);
        assert_eq!(sniff_image_kind(&[]), ImageKind::Unknown);
    }

    #[test]
    fn mp4_ftyp_is_not_heif() {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x18];
        bytes.extend_from_slice(b"ftypisom");
        assert_eq!(sniff_image_kind(&bytes), ImageKind::Unknown);
    }

    #[test]
    fn heif_detected_by_extension_case_insensitive() {
        assert!(is_heif(&SourceFile::new("IMG_0001.HEIC", vec![1, 2, 3])));
        assert!(is_heif(&SourceFile::new("page.heif", vec![])));
        assert!(!is_heif(&SourceFile::new("page.jpg", vec![0xFF, 0xD8, 0xFF])));
    }

    #[test]
    fn heif_detected_by_header_despite_extension() {
        assert!(is_heif(&SourceFile::new("renamed.jpg", heif_header())));
    }

    #[test]
    fn non_heif_passes_through_borrowed() {
        let normalizer = FormatNormalizer::new(Box::new(FailingConverter));
        let file = SourceFile::new("page.png", vec![0x89, 0x50, 0x4E, 0x47]);
        let out = normalizer.normalize(&file);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &file.bytes[..]);
    }

    #[test]
    fn heif_is_converted() {
        let normalizer =
            FormatNormalizer::new(Box::new(FixedConverter::new(vec![0xFF, 0xD8, 0xFF])));
        let file = SourceFile::new("page.heic", heif_header());
        let out = normalizer.normalize(&file);
        assert_eq!(&*out, &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn conversion_failure_falls_back_to_original() {
        let normalizer = FormatNormalizer::new(Box::new(FailingConverter));
        let file = SourceFile::new("page.heic", heif_header());
        let out = normalizer.normalize(&file);
        assert_eq!(&*out, &file.bytes[..]);
    }

    #[test]
    fn missing_tool_reports_unavailable() {
        let cli = HeifConvertCli::new("/nonexistent/heif-convert-for-tests");
        let err = cli.convert_to_jpeg(&heif_header(), 70).unwrap_err();
        assert!(matches!(err, NormalizeError::ToolUnavailable { .. }));
    }

    #[test]
    fn mime_types() {
        assert_eq!(ImageKind::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageKind::Heif.mime_type(), "image/heic");
    }
}
