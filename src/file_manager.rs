//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini in directory (`walkdir`)
//! - Accetta sia file singoli sia directory come input
//! - Costruisce l'`ImageSource` immutabile di un file (nome, path, dimensione, formato)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati riconosciuti:
//! PNG, JPEG, WebP, GIF, BMP, TIFF (rilevati dall'estensione, case-insensitive)
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_images(&inputs)?;
//! for file in files {
//!     let source = FileManager::describe(&file).await?;
//! }
//! ```

use crate::error::SqueezeError;
use crate::format::ImageFormat;
use crate::item::ImageSource;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Expand files and directories into the list of supported images
    pub fn find_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, SqueezeError> {
        let mut files = Vec::new();
        let mut seen = HashSet::new();

        for input in inputs {
            if !input.exists() {
                return Err(SqueezeError::Validation(format!(
                    "Input does not exist: {}",
                    input.display()
                )));
            }

            if input.is_file() {
                if Self::is_supported_image(input) && seen.insert(input.clone()) {
                    files.push(input.clone());
                }
                continue;
            }

            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|path| Self::is_supported_image(path))
                .collect();
            found.sort();

            for path in found {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }

    /// Check if a file is an image the pipeline knows about
    pub fn is_supported_image(path: &Path) -> bool {
        ImageFormat::from_path(path).is_some()
    }

    /// Immutable attributes of an image file
    pub async fn describe(path: &Path) -> Result<ImageSource, SqueezeError> {
        let format = ImageFormat::from_path(path)
            .ok_or_else(|| SqueezeError::UnsupportedFormat(path.display().to_string()))?;

        let metadata = fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(SqueezeError::Validation(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(ImageSource {
            name,
            path: path.to_path_buf(),
            size: metadata.len(),
            format,
        })
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
