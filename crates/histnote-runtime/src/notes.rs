//! Inputs to document generation: OCR text or note photos.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::providers::InlineImage;
use crate::RuntimeError;

/// Largest accepted photo, per image.
pub const MAX_IMAGE_BYTES: usize = 6 * 1024 * 1024;

/// Photo formats accepted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Detect the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A checked JPEG or PNG photo of notes.
#[derive(Clone, PartialEq, Eq)]
pub struct NoteImage {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl std::fmt::Debug for NoteImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteImage")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl NoteImage {
    /// Accept a photo if it is a JPEG or PNG within [`MAX_IMAGE_BYTES`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RuntimeError> {
        let format = ImageFormat::sniff(&bytes).ok_or_else(|| {
            RuntimeError::InvalidInput("image must be JPEG or PNG".to_string())
        })?;

        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(RuntimeError::InvalidInput(format!(
                "image is {} bytes, limit is {} bytes",
                bytes.len(),
                MAX_IMAGE_BYTES
            )));
        }

        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Base64 form for sending the photo straight to the model.
    pub fn to_inline(&self) -> InlineImage {
        InlineImage {
            mime_type: self.format.mime_type().to_string(),
            base64: STANDARD.encode(&self.bytes),
        }
    }
}

/// What a history document is generated from.
#[derive(Debug, Clone)]
pub enum NotesInput {
    /// Text already extracted by OCR.
    OcrText(String),
    /// Photos sent directly to a vision-capable model.
    Images(Vec<NoteImage>),
}
