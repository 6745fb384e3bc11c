//! # Estimation Service
//!
//! Servizio che predice riduzione e durata di una compressione.
//!
//! ## Algoritmo:
//! 1. Classifica la dimensione originale in una `SizeBucket`
//! 2. Interroga lo store per campioni con stessa coppia di formati, bucket,
//!    modalità lossy e qualità entro la finestra di prossimità
//! 3. Media pesata della riduzione (peso maggiore per qualità più vicine)
//! 4. Media semplice della durata dei campioni
//! 5. Confidenza crescente con il numero di campioni, limitata a 0.95
//!
//! ## Fallback:
//! Se lo store è irraggiungibile o non ha campioni, usa le tabelle statiche
//! di `fallback` con confidenza bassa. Il servizio non fallisce mai.
//!
//! ## Registrazione:
//! `record()` è best-effort: gli errori vengono loggati e scartati.

use crate::estimation::{
    fallback, DurationEstimate, DurationSource, EstimationQuery, EstimationResult,
    EstimationStore, HistoricalSample, SampleQuery,
};
use crate::error::StoreError;
use crate::format::{ImageFormat, SizeBucket};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default accepted distance between quality settings
pub const DEFAULT_QUALITY_WINDOW: u8 = 10;

/// Duration used when neither history nor the table know the pair
pub const DEFAULT_DURATION_MS: u64 = 1000;

const MAX_CONFIDENCE: f64 = 0.95;

/// True outcome of a finished compression
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionRecord {
    pub query: EstimationQuery,
    pub compressed_size: u64,
    pub duration_ms: u64,
}

/// Aggregate view of one format pair in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatPairSummary {
    pub input_format: ImageFormat,
    pub output_format: ImageFormat,
    pub samples: usize,
    pub average_reduction: f64,
    pub average_duration_ms: u64,
}

/// Aggregate view of the whole store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatsSummary {
    pub total_samples: usize,
    pub pairs: Vec<FormatPairSummary>,
}

/// Learns compression outcomes and predicts new ones
pub struct EstimationService {
    store: Arc<dyn EstimationStore>,
    quality_window: u8,
    default_duration_ms: u64,
}

impl EstimationService {
    pub fn new(store: Arc<dyn EstimationStore>) -> Self {
        Self {
            store,
            quality_window: DEFAULT_QUALITY_WINDOW,
            default_duration_ms: DEFAULT_DURATION_MS,
        }
    }

    pub fn with_quality_window(mut self, quality_window: u8) -> Self {
        self.quality_window = quality_window;
        self
    }

    pub fn with_default_duration(mut self, duration_ms: u64) -> Self {
        self.default_duration_ms = duration_ms;
        self
    }

    fn sample_query(&self, query: &EstimationQuery) -> SampleQuery {
        SampleQuery {
            input_format: query.input_format,
            output_format: query.output_format,
            size_bucket: SizeBucket::classify(query.original_size),
            quality: query.quality,
            quality_window: self.quality_window,
            lossy: query.lossy,
        }
    }

    /// Comparable samples, or `None` when the store can't help
    fn matching_samples(&self, query: &EstimationQuery) -> Option<Vec<HistoricalSample>> {
        match self.store.query(&self.sample_query(query)) {
            Ok(samples) if !samples.is_empty() => Some(samples),
            Ok(_) => {
                debug!(
                    "No samples for {} → {} ({}), using fallback table",
                    query.input_format,
                    query.output_format,
                    SizeBucket::classify(query.original_size).description()
                );
                None
            }
            Err(e) => {
                debug!("Estimation store unavailable, using fallback table: {}", e);
                None
            }
        }
    }

    /// Predict the size reduction of a compression
    pub fn estimate(&self, query: &EstimationQuery) -> EstimationResult {
        let Some(samples) = self.matching_samples(query) else {
            return fallback::reduction_estimate(
                query.input_format,
                query.output_format,
                query.original_size,
                query.lossy,
            );
        };

        let percent = weighted_reduction(&samples, query.quality, self.quality_window);
        let count = samples.len();

        EstimationResult {
            percent,
            ratio: (100.0 - percent) / 100.0,
            confidence: learned_confidence(count),
            sample_count: count as u32,
            is_learning: true,
            description: format!(
                "Based on {} previous {} → {} compression{}",
                count,
                query.input_format,
                query.output_format,
                if count == 1 { "" } else { "s" }
            ),
            mean_duration_ms: mean_duration(&samples),
        }
    }

    /// Predict how long a compression will take
    pub fn estimate_duration(&self, query: &EstimationQuery) -> DurationEstimate {
        if let Some(samples) = self.matching_samples(query) {
            if let Some(duration_ms) = mean_duration(&samples) {
                return DurationEstimate {
                    duration_ms,
                    confidence: learned_confidence(samples.len()),
                    sample_count: samples.len() as u32,
                    source: DurationSource::Learned,
                };
            }
        }

        match fallback::duration_ms(
            query.input_format,
            query.output_format,
            query.original_size,
            query.lossy,
        ) {
            Some(duration_ms) => DurationEstimate {
                duration_ms,
                confidence: fallback::FALLBACK_CONFIDENCE,
                sample_count: 0,
                source: DurationSource::Table,
            },
            None => DurationEstimate {
                duration_ms: self.default_duration_ms,
                confidence: 0.0,
                sample_count: 0,
                source: DurationSource::Default,
            },
        }
    }

    /// Append a true outcome; failures are logged and discarded
    pub fn record(&self, record: &CompressionRecord) {
        let sample = HistoricalSample::new(
            record.query.input_format,
            record.query.output_format,
            record.query.quality,
            record.query.lossy,
            record.query.original_size,
            record.compressed_size,
            record.duration_ms,
        );

        match self.store.append(sample) {
            Ok(()) => debug!(
                "📊 Recorded {} → {} sample ({}ms)",
                record.query.input_format, record.query.output_format, record.duration_ms
            ),
            Err(e) => warn!("Failed to record compression sample: {}", e),
        }
    }

    /// Drop every historical sample
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.reset_all()?;
        info!("Estimation history cleared");
        Ok(())
    }

    /// Number of stored samples, 0 when the store is unreachable
    pub fn sample_count(&self) -> usize {
        self.store.count().unwrap_or_else(|e| {
            debug!("Estimation store unavailable: {}", e);
            0
        })
    }

    /// Per format-pair aggregates of the store
    pub fn summary(&self) -> StatsSummary {
        let samples = match self.store.all() {
            Ok(samples) => samples,
            Err(e) => {
                debug!("Estimation store unavailable: {}", e);
                return StatsSummary::default();
            }
        };

        let mut groups: HashMap<(ImageFormat, ImageFormat), Vec<&HistoricalSample>> = HashMap::new();
        for sample in &samples {
            groups
                .entry((sample.input_format, sample.output_format))
                .or_default()
                .push(sample);
        }

        let mut pairs: Vec<FormatPairSummary> = groups
            .into_iter()
            .map(|((input_format, output_format), group)| {
                let n = group.len();
                FormatPairSummary {
                    input_format,
                    output_format,
                    samples: n,
                    average_reduction: group.iter().map(|s| s.reduction_percent).sum::<f64>() / n as f64,
                    average_duration_ms: group.iter().map(|s| s.compression_duration_ms).sum::<u64>() / n as u64,
                }
            })
            .collect();

        pairs.sort_by(|a, b| {
            b.samples
                .cmp(&a.samples)
                .then_with(|| a.input_format.as_str().cmp(b.input_format.as_str()))
                .then_with(|| a.output_format.as_str().cmp(b.output_format.as_str()))
        });

        StatsSummary {
            total_samples: samples.len(),
            pairs,
        }
    }
}

/// Confidence from sample count: at least 0.5, saturating towards 0.95
pub fn learned_confidence(sample_count: usize) -> f64 {
    if sample_count == 0 {
        return fallback::FALLBACK_CONFIDENCE;
    }
    let saturation = 1.0 - (-(sample_count as f64) / 8.0).exp();
    (0.5 + 0.45 * saturation).min(MAX_CONFIDENCE)
}

/// Reduction averaged with triangular weights on quality distance
fn weighted_reduction(samples: &[HistoricalSample], quality: u8, window: u8) -> f64 {
    let (sum, weights) = samples.iter().fold((0.0, 0.0), |(sum, weights), sample| {
        let distance = sample.quality_setting.abs_diff(quality).min(window);
        let weight = f64::from(window - distance) + 1.0;
        (sum + sample.reduction_percent * weight, weights + weight)
    });

    if weights > 0.0 {
        (sum / weights).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn mean_duration(samples: &[HistoricalSample]) -> Option<u64> {
    let timed: Vec<u64> = samples
        .iter()
        .map(|s| s.compression_duration_ms)
        .filter(|ms| *ms > 0)
        .collect();

    if timed.is_empty() {
        None
    } else {
        Some(timed.iter().sum::<u64>() / timed.len() as u64)
    }
}
