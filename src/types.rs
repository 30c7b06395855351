//! Shared types passed between the HTTP boundary and the resize pipeline.
//!
//! The declared format is decided exactly once, at the boundary, from the
//! upload's media type. Everything downstream matches on [`DeclaredFormat`]
//! instead of re-inspecting strings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Image encoding the caller claims the upload is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredFormat {
    Jpeg,
    Png,
    Gif,
}

/// A media type outside the supported set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported media type '{0}': a file should be either png, jpeg or gif")]
pub struct UnsupportedFormat(pub String);

impl DeclaredFormat {
    /// Parse a `Content-Type` value such as `image/png` or
    /// `image/jpeg; charset=binary`. Matching is case-insensitive.
    pub fn from_media_type(media_type: &str) -> Result<Self, UnsupportedFormat> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/gif" => Ok(Self::Gif),
            _ => Err(UnsupportedFormat(media_type.to_string())),
        }
    }

    /// Infer the format from a file extension (used by the `resize` CLI
    /// command when no media type is given).
    pub fn from_path(path: &Path) -> Result<Self, UnsupportedFormat> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| UnsupportedFormat(path.display().to_string()))
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Canonical name, used as a fingerprint field.
    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }

    /// Extension (with leading dot) used when the upload's own filename
    /// does not carry a matching one.
    pub fn canonical_extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::Gif => ".gif",
        }
    }

    /// Whether this format is stored as a multi-frame animation.
    pub fn is_animated(self) -> bool {
        matches!(self, Self::Gif)
    }

    /// Pick the stored file's extension.
    ///
    /// The upload's original extension is kept when it agrees with the
    /// declared format (so `photo.jpeg` stays `.jpeg`); otherwise the
    /// canonical one is used, keeping stored names consistent with content.
    pub fn storage_extension(self, source_name: &str) -> String {
        let original = Path::new(source_name)
            .extension()
            .and_then(|e| e.to_str());

        match original {
            Some(ext) if Self::from_extension(ext) == Some(self) => {
                format!(".{}", ext.to_ascii_lowercase())
            }
            _ => self.canonical_extension().to_string(),
        }
    }
}

impl std::fmt::Display for DeclaredFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One inbound resize request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ResizeRequest {
    /// Original filename of the upload.
    pub source_name: String,
    /// Requested width; 0 means "derive from the aspect ratio".
    pub width: u32,
    /// Requested height; 0 means "derive from the aspect ratio".
    pub height: u32,
    pub format: DeclaredFormat,
    pub content: Vec<u8>,
}

/// Response payload: storage-relative path of the resized artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
}
