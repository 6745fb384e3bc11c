//! # Item Record Module
//!
//! Questo modulo modella il ciclo di vita di una singola immagine nel batch.
//!
//! ## Responsabilità:
//! - Attributi originali immutabili (nome, path, dimensione, formato)
//! - Payload dipendente dallo stato come variante taggata (`ItemStatus`)
//! - Transizioni che producono sempre un nuovo record (nessuna mutazione in place)
//!
//! ## Macchina a stati:
//! ```text
//! pending ──▶ processing(0) ──▶ processing(p) ──▶ completed
//!                     │                      └──▶ error
//!                     └──────────────────────────▶ error
//! ```
//! Qualsiasi altra transizione restituisce `StateTransitionError` e lascia
//! il record originale invariato.

use crate::error::StateTransitionError;
use crate::estimation::EstimationResult;
use crate::format::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable identifier of an item within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "img_{}", self.0)
    }
}

/// Immutable attributes of the source image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub format: ImageFormat,
}

/// Status-dependent payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    Pending {
        estimated_reduction: EstimationResult,
    },
    Processing {
        progress: f64,
    },
    Completed {
        compressed_size: u64,
        savings_percent: u8,
        output_path: PathBuf,
    },
    Error {
        message: String,
    },
}

/// Payload-free status tag, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl ItemStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Pending { .. } => StatusKind::Pending,
            Self::Processing { .. } => StatusKind::Processing,
            Self::Completed { .. } => StatusKind::Completed,
            Self::Error { .. } => StatusKind::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

/// One image's compression lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub id: ItemId,
    pub source: ImageSource,
    pub status: ItemStatus,
}

impl ImageItem {
    /// Create a pending item carrying its estimated reduction
    pub fn new(id: ItemId, source: ImageSource, estimated_reduction: EstimationResult) -> Self {
        Self {
            id,
            source,
            status: ItemStatus::Pending { estimated_reduction },
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    /// Current progress, when processing
    pub fn progress(&self) -> Option<f64> {
        match self.status {
            ItemStatus::Processing { progress } => Some(progress),
            _ => None,
        }
    }

    /// pending → processing(0)
    pub fn start_processing(&self) -> Result<Self, StateTransitionError> {
        match self.status {
            ItemStatus::Pending { .. } => Ok(self.with_status(ItemStatus::Processing { progress: 0.0 })),
            _ => Err(self.illegal(StatusKind::Processing)),
        }
    }

    /// processing → processing(clamp(p, 0, 100))
    pub fn with_progress(&self, progress: f64) -> Result<Self, StateTransitionError> {
        match self.status {
            ItemStatus::Processing { .. } => {
                let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 100.0) };
                Ok(self.with_status(ItemStatus::Processing { progress }))
            }
            _ => Err(self.illegal(StatusKind::Processing)),
        }
    }

    /// processing → completed
    pub fn complete(
        &self,
        compressed_size: u64,
        output_path: PathBuf,
    ) -> Result<Self, StateTransitionError> {
        match self.status {
            ItemStatus::Processing { .. } => Ok(self.with_status(ItemStatus::Completed {
                compressed_size,
                savings_percent: savings_percent(self.source.size, compressed_size),
                output_path,
            })),
            _ => Err(self.illegal(StatusKind::Completed)),
        }
    }

    /// processing → error
    pub fn fail(&self, message: impl Into<String>) -> Result<Self, StateTransitionError> {
        match self.status {
            ItemStatus::Processing { .. } => Ok(self.with_status(ItemStatus::Error {
                message: message.into(),
            })),
            _ => Err(self.illegal(StatusKind::Error)),
        }
    }

    fn with_status(&self, status: ItemStatus) -> Self {
        Self {
            id: self.id,
            source: self.source.clone(),
            status,
        }
    }

    fn illegal(&self, to: StatusKind) -> StateTransitionError {
        StateTransitionError {
            from: self.kind(),
            to,
        }
    }
}

/// round((original - compressed) / original * 100), floored at 0
pub fn savings_percent(original_size: u64, compressed_size: u64) -> u8 {
    if original_size == 0 || compressed_size >= original_size {
        return 0;
    }
    let saved = (original_size - compressed_size) as f64 / original_size as f64 * 100.0;
    saved.round().clamp(0.0, 100.0) as u8
}
