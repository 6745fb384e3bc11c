//! # Compressor Module
//!
//! Confine verso il compressore esterno. Il compressore è opaco: riceve una
//! richiesta, lavora per un tempo sconosciuto e restituisce un risultato o
//! un errore, senza callback di progresso.
//!
//! ## Responsabilità:
//! - Definisce il trait `Compressor` usato dall'orchestratore
//! - Descrive richiesta (`CompressionRequest`) e risultato (`CompressedImage`)
//! - Espone gli stadi consultivi (`CompressionStage`) che un compressore può
//!   pubblicare; non guidano mai il progresso
//!
//! ## Implementazioni:
//! - `tool::ToolCompressor`: encoder esterni (cwebp, oxipng, jpegoptim, ...)

pub mod tool;

pub use tool::ToolCompressor;

use crate::error::CompressionError;
use crate::format::ImageFormat;
use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Coarse advisory stage reported by a compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStage {
    Loading,
    Compressing,
    Saving,
    Complete,
    Error,
}

impl fmt::Display for CompressionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Compressing => "compressing",
            Self::Saving => "saving",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Stage hint tagged with the item it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    pub id: ItemId,
    pub stage: CompressionStage,
}

/// Everything a compressor needs to process one item
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub id: ItemId,
    pub path: PathBuf,
    pub quality: u8,
    pub output_format: ImageFormat,
    pub lossy: bool,
    /// None = next to the source file
    pub output_dir: Option<PathBuf>,
    pub stages: Option<broadcast::Sender<StageEvent>>,
}

impl CompressionRequest {
    /// Publish an advisory stage; no-op without subscribers
    pub fn report(&self, stage: CompressionStage) {
        if let Some(ref sink) = self.stages {
            let _ = sink.send(StageEvent { id: self.id, stage });
        }
    }
}

/// Successful compression outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub compressed_size: u64,
    pub output_path: PathBuf,
}

/// Opaque asynchronous image compressor
pub trait Compressor: Send + Sync {
    fn compress(
        &self,
        request: &CompressionRequest,
    ) -> impl Future<Output = Result<CompressedImage, CompressionError>> + Send;
}
