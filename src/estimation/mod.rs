//! # Estimation Module
//!
//! Stima della riduzione di dimensione e della durata di una compressione
//! a partire dallo storico dei risultati reali.
//!
//! - `service`: Servizio di stima con apprendimento e fallback
//! - `store`: Trait e implementazioni dello store storico
//! - `fallback`: Tabelle statiche per coppia di formati

pub mod fallback;
pub mod service;
pub mod store;

pub use service::{CompressionRecord, EstimationService, FormatPairSummary, StatsSummary};
pub use store::{
    EstimationStore, HistoricalSample, JsonEstimationStore, MemoryEstimationStore, SampleQuery,
};

use crate::format::ImageFormat;
use serde::{Deserialize, Serialize};

/// Parameters of a compression to estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationQuery {
    pub input_format: ImageFormat,
    pub output_format: ImageFormat,
    pub original_size: u64,
    pub quality: u8,
    pub lossy: bool,
}

/// Predicted size reduction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    /// Expected size reduction, 0-100
    pub percent: f64,
    /// Expected compressed/original ratio
    pub ratio: f64,
    /// Trust in the estimate, 0-1
    pub confidence: f64,
    pub sample_count: u32,
    /// True when derived from historical samples
    pub is_learning: bool,
    pub description: String,
    /// Mean duration of the matching samples
    pub mean_duration_ms: Option<u64>,
}

/// Where a duration estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationSource {
    Learned,
    Table,
    Default,
}

/// Predicted compression duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationEstimate {
    pub duration_ms: u64,
    pub confidence: f64,
    pub sample_count: u32,
    pub source: DurationSource,
}
