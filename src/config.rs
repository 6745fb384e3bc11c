//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di compressione e animazione
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità encoder (1-100, default: 80)
//! - `output_format`: Formato di output (default: None = stesso formato dell'input)
//! - `lossy`: Compressione lossy (default: true)
//! - `output_path`: Directory di output (default: None = accanto all'originale)
//! - `tick_interval_ms`: Cadenza dell'animazione (10-1000, default: 50)
//! - `fallback_duration_ms`: Durata usata senza storico né tabella (default: 1000)
//! - `settle_timeout_ms`: Attesa massima della convergenza a 100 (default: 2000)
//! - `quality_window`: Distanza di qualità accettata tra campioni (default: 10)
//! - `store_path`: File dello storico (default: None = `~/.image-squeeze/`)
//! - `phases`: Bande e velocità delle fasi di progresso
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quality: 85,
//!     output_format: Some(ImageFormat::WebP),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::adaptive::{PhaseTable, DEFAULT_TICK_INTERVAL_MS};
use crate::estimation::service::{DEFAULT_DURATION_MS, DEFAULT_QUALITY_WINDOW};
use crate::format::ImageFormat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for batch compression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoder quality (1-100)
    pub quality: u8,
    /// Target format (None = keep the input format)
    pub output_format: Option<ImageFormat>,
    /// Lossy compression; false selects lossless encoder modes
    pub lossy: bool,
    /// Output directory for compressed files (None = next to the original)
    pub output_path: Option<PathBuf>,
    /// Progress animation cadence
    pub tick_interval_ms: u64,
    /// Duration assumed when nothing better is known
    pub fallback_duration_ms: u64,
    /// Upper bound on waiting for a bar to reach 100 after compression
    pub settle_timeout_ms: u64,
    /// Accepted quality distance between comparable samples
    pub quality_window: u8,
    /// Estimation history file (None = default location)
    pub store_path: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Shape of the progress curve
    pub phases: PhaseTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: 80,
            output_format: None,
            lossy: true,
            output_path: None,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            fallback_duration_ms: DEFAULT_DURATION_MS,
            settle_timeout_ms: 2000,
            quality_window: DEFAULT_QUALITY_WINDOW,
            store_path: None,
            json_output: false,
            phases: PhaseTable::default(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(anyhow::anyhow!("Quality must be between 1 and 100"));
        }

        if let Some(format) = self.output_format {
            if !format.is_encodable() {
                return Err(anyhow::anyhow!("{} is not a supported output format", format));
            }
        }

        if !(10..=1000).contains(&self.tick_interval_ms) {
            return Err(anyhow::anyhow!("Tick interval must be between 10 and 1000 ms"));
        }

        if self.settle_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Settle timeout must be greater than 0"));
        }

        if self.quality_window > 100 {
            return Err(anyhow::anyhow!("Quality window must be between 0 and 100"));
        }

        self.phases
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid phase table: {}", e))?;

        if let Some(ref output_path) = self.output_path {
            if output_path.exists() && !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// Format the encoders will write for an input
    pub fn target_format(&self, input: ImageFormat) -> ImageFormat {
        match self.output_format {
            Some(format) => format,
            None if input.is_encodable() => input,
            None => ImageFormat::WebP,
        }
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::PhaseSpec;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert_ok!(config.validate());

        config.quality = 0;
        assert_err!(config.validate());

        config.quality = 80;
        config.tick_interval_ms = 5;
        assert_err!(config.validate());

        config.tick_interval_ms = 50;
        config.output_format = Some(ImageFormat::Gif);
        assert_err!(config.validate());

        config.output_format = Some(ImageFormat::WebP);
        config.phases.waiting = PhaseSpec::new(70.0, 95.0, 0.3);
        assert_err!(config.validate());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.quality, 80);
        assert_eq!(config.output_format, None);
        assert!(config.lossy);
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.fallback_duration_ms, 1000);
        assert_eq!(config.quality_window, 10);
        assert_eq!(config.phases, PhaseTable::default());
    }

    #[test]
    fn test_target_format() {
        let mut config = Config::default();
        assert_eq!(config.target_format(ImageFormat::Png), ImageFormat::Png);
        assert_eq!(config.target_format(ImageFormat::Bmp), ImageFormat::WebP);

        config.output_format = Some(ImageFormat::Jpeg);
        assert_eq!(config.target_format(ImageFormat::Png), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            quality: 65,
            output_format: Some(ImageFormat::WebP),
            lossy: false,
            tick_interval_ms: 100,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config, original_config);
    }

    #[tokio::test]
    async fn test_partial_and_missing_files() {
        let temp_dir = TempDir::new().unwrap();

        let missing = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(missing, Config::default());

        let partial_path = temp_dir.path().join("partial.json");
        tokio::fs::write(&partial_path, r#"{"quality": 90, "phases": {"min_step": 1.0}}"#)
            .await
            .unwrap();
        let partial = Config::from_file(&partial_path).await.unwrap();
        assert_eq!(partial.quality, 90);
        assert_eq!(partial.phases.min_step, 1.0);
        assert_eq!(partial.phases.smooth, PhaseTable::default().smooth);
    }
}
