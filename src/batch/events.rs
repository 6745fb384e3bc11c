//! # Batch Events
//!
//! Eventi pubblicati dall'orchestratore su un canale `broadcast`.
//! I renderer (barre `indicatif`, output JSON) si iscrivono e reagiscono;
//! l'orchestratore non conosce chi ascolta.

use crate::compressor::CompressionStage;
use crate::item::{ImageItem, ItemId};
use crate::progress::BatchSummary;
use std::path::PathBuf;

/// Capacity of the event channel
pub const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A pending item joined the batch
    ItemAdded(ImageItem),
    /// The item entered processing with this duration estimate
    Started {
        id: ItemId,
        estimated_duration_ms: u64,
    },
    Progress {
        id: ItemId,
        percent: f64,
    },
    /// Advisory compressor stage
    Stage {
        id: ItemId,
        stage: CompressionStage,
    },
    Completed {
        id: ItemId,
        compressed_size: u64,
        savings_percent: u8,
        output_path: PathBuf,
    },
    Failed {
        id: ItemId,
        message: String,
    },
    Removed {
        id: ItemId,
    },
    Finished(BatchSummary),
}

impl BatchEvent {
    /// Item the event refers to, if any
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemAdded(item) => Some(item.id),
            Self::Started { id, .. }
            | Self::Progress { id, .. }
            | Self::Stage { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Removed { id } => Some(*id),
            Self::Finished(_) => None,
        }
    }
}
