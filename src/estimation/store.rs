//! # Estimation Store Module
//!
//! Questo modulo gestisce la persistenza dei campioni storici di compressione.
//!
//! ## Responsabilità:
//! - Definisce il trait `EstimationStore` consumato dal servizio di stima
//! - Persiste i campioni in un file JSON (`JsonEstimationStore`)
//! - Fornisce uno store in memoria per test e fallback (`MemoryEstimationStore`)
//!
//! ## Strategia di persistence:
//! - Un unico file JSON: `~/.image-squeeze/estimation_samples.json`
//! - Caricamento completo all'apertura, riscrittura ad ogni append/reset
//! - Campioni append-only: nessuna modifica o cancellazione tranne `reset_all()`
//!
//! ## Esempio struttura file:
//! ```json
//! {
//!   "samples": [
//!     {
//!       "input_format": "png",
//!       "output_format": "webp",
//!       "size_bucket": "medium",
//!       "quality_setting": 80,
//!       "lossy_mode": true,
//!       "original_size": 2000000,
//!       "compressed_size": 300000,
//!       "reduction_percent": 85.0,
//!       "compression_duration_ms": 1100,
//!       "timestamp": 1642680000
//!     }
//!   ]
//! }
//! ```

use crate::error::StoreError;
use crate::format::{ImageFormat, SizeBucket};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::debug;

/// One recorded compression outcome
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoricalSample {
    pub input_format: ImageFormat,
    pub output_format: ImageFormat,
    pub size_bucket: SizeBucket,
    pub quality_setting: u8,
    pub lossy_mode: bool,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: f64,
    pub compression_duration_ms: u64,
    pub timestamp: u64,
}

impl HistoricalSample {
    pub fn new(
        input_format: ImageFormat,
        output_format: ImageFormat,
        quality_setting: u8,
        lossy_mode: bool,
        original_size: u64,
        compressed_size: u64,
        compression_duration_ms: u64,
    ) -> Self {
        let reduction_percent = if original_size > 0 {
            (1.0 - (compressed_size as f64 / original_size as f64)) * 100.0
        } else {
            0.0
        };

        Self {
            input_format,
            output_format,
            size_bucket: SizeBucket::classify(original_size),
            quality_setting,
            lossy_mode,
            original_size,
            compressed_size,
            reduction_percent,
            compression_duration_ms,
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Selection of samples comparable to a pending compression
#[derive(Debug, Clone, PartialEq)]
pub struct SampleQuery {
    pub input_format: ImageFormat,
    pub output_format: ImageFormat,
    pub size_bucket: SizeBucket,
    pub quality: u8,
    /// Accepted distance between the sample's quality and `quality`
    pub quality_window: u8,
    pub lossy: bool,
}

impl SampleQuery {
    pub fn matches(&self, sample: &HistoricalSample) -> bool {
        sample.input_format == self.input_format
            && sample.output_format == self.output_format
            && sample.size_bucket == self.size_bucket
            && sample.lossy_mode == self.lossy
            && sample.quality_setting.abs_diff(self.quality) <= self.quality_window
    }
}

/// Persistent collection of historical samples.
///
/// Implementations may be unreachable at any time; callers must treat every
/// error as recoverable.
pub trait EstimationStore: Send + Sync {
    fn append(&self, sample: HistoricalSample) -> Result<(), StoreError>;

    fn query(&self, query: &SampleQuery) -> Result<Vec<HistoricalSample>, StoreError>;

    fn reset_all(&self) -> Result<(), StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Every sample, oldest first
    fn all(&self) -> Result<Vec<HistoricalSample>, StoreError>;
}

/// On-disk layout of the JSON store
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct SampleFile {
    pub samples: Vec<HistoricalSample>,
}

/// JSON-file backed store
pub struct JsonEstimationStore {
    path: PathBuf,
    state: Mutex<SampleFile>,
}

impl JsonEstimationStore {
    /// Default location: `~/.image-squeeze/estimation_samples.json`
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Unavailable("Could not find home directory".to_string()))?
            .join(".image-squeeze");
        Ok(dir.join("estimation_samples.json"))
    }

    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let state = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            SampleFile::default()
        };

        debug!(
            "Opened estimation store {} ({} samples)",
            path.display(),
            state.samples.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SampleFile> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, state: &SampleFile) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, content)
            .map_err(|e| StoreError::Persistence(format!("{}: {}", self.path.display(), e)))
    }
}

impl EstimationStore for JsonEstimationStore {
    fn append(&self, sample: HistoricalSample) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.samples.push(sample);
        if let Err(e) = self.save(&state) {
            // Keep memory and disk in agreement
            state.samples.pop();
            return Err(e);
        }
        Ok(())
    }

    fn query(&self, query: &SampleQuery) -> Result<Vec<HistoricalSample>, StoreError> {
        Ok(self
            .lock()
            .samples
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect())
    }

    fn reset_all(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.samples.clear();
        self.save(&state)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().samples.len())
    }

    fn all(&self) -> Result<Vec<HistoricalSample>, StoreError> {
        Ok(self.lock().samples.clone())
    }
}

/// Volatile store, used in tests and when the JSON store cannot be opened
#[derive(Default)]
pub struct MemoryEstimationStore {
    samples: Mutex<Vec<HistoricalSample>>,
}

impl MemoryEstimationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoricalSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EstimationStore for MemoryEstimationStore {
    fn append(&self, sample: HistoricalSample) -> Result<(), StoreError> {
        self.lock().push(sample);
        Ok(())
    }

    fn query(&self, query: &SampleQuery) -> Result<Vec<HistoricalSample>, StoreError> {
        Ok(self.lock().iter().filter(|s| query.matches(s)).cloned().collect())
    }

    fn reset_all(&self) -> Result<(), StoreError> {
        self.lock().clear();
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().len())
    }

    fn all(&self) -> Result<Vec<HistoricalSample>, StoreError> {
        Ok(self.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(quality: u8, size: u64) -> HistoricalSample {
        HistoricalSample::new(ImageFormat::Png, ImageFormat::WebP, quality, true, size, size / 4, 900)
    }

    fn query(quality: u8) -> SampleQuery {
        SampleQuery {
            input_format: ImageFormat::Png,
            output_format: ImageFormat::WebP,
            size_bucket: SizeBucket::Medium,
            quality,
            quality_window: 10,
            lossy: true,
        }
    }

    #[test]
    fn test_sample_reduction() {
        let s = sample(80, 2_000_000);
        assert_eq!(s.size_bucket, SizeBucket::Medium);
        assert!((s.reduction_percent - 75.0).abs() < 1e-9);
        assert!(s.timestamp > 0);
    }

    #[test]
    fn test_query_window() {
        let store = MemoryEstimationStore::new();
        store.append(sample(80, 2_000_000)).unwrap();
        store.append(sample(95, 2_000_000)).unwrap();
        store.append(sample(80, 200_000)).unwrap();

        assert_eq!(store.query(&query(85)).unwrap().len(), 2);
        assert_eq!(store.query(&query(70)).unwrap().len(), 1);
        assert_eq!(store.query(&query(40)).unwrap().len(), 0);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_json_store_persists_and_resets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("samples.json");

        {
            let store = JsonEstimationStore::open(&path).unwrap();
            store.append(sample(80, 2_000_000)).unwrap();
            store.append(sample(82, 3_000_000)).unwrap();
        }

        let reopened = JsonEstimationStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert_eq!(reopened.query(&query(80)).unwrap().len(), 2);

        reopened.reset_all().unwrap();
        reopened.reset_all().unwrap();
        assert_eq!(reopened.count().unwrap(), 0);

        let again = JsonEstimationStore::open(&path).unwrap();
        assert_eq!(again.count().unwrap(), 0);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("samples.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonEstimationStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
