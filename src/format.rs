//! # Formats and Size Buckets
//!
//! Tipi condivisi per identificare il formato di un'immagine e la sua classe
//! di dimensione. Le classi raggruppano i campioni storici usati per le stime.
//!
//! ## Soglie (megabyte decimali):
//! - `Small`: < 1MB
//! - `Medium`: < 5MB
//! - `Large`: >= 5MB

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Image formats the pipeline knows how to reason about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        image::ImageFormat::from_path(path)
            .ok()
            .and_then(Self::from_image_format)
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Canonical lowercase name, also used as storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    /// File extension for files written in this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            other => other.as_str(),
        }
    }

    /// Formats the encoders can write
    pub fn is_encodable(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::WebP)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::WebP => "WebP",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Tiff => "TIFF",
        };
        f.write_str(name)
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "tif" | "tiff" => Ok(Self::Tiff),
            other => Err(format!("unknown image format: {}", other)),
        }
    }
}

/// Coarse size classification used to group historical samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    const SMALL_LIMIT: u64 = 1_000_000;
    const MEDIUM_LIMIT: u64 = 5_000_000;

    /// Classify a size in bytes
    pub fn classify(size_bytes: u64) -> Self {
        if size_bytes < Self::SMALL_LIMIT {
            Self::Small
        } else if size_bytes < Self::MEDIUM_LIMIT {
            Self::Medium
        } else {
            Self::Large
        }
    }

    /// Description for logging
    pub fn description(&self) -> &'static str {
        match self {
            Self::Small => "small (<1MB)",
            Self::Medium => "medium (1-5MB)",
            Self::Large => "large (>=5MB)",
        }
    }
}
