//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico
//! (una riga JSON per evento su stdout).
//!
//! ## Responsabilità:
//! - Traduce ogni `BatchEvent` in un messaggio JSON con tag `type`
//! - Emette messaggi di inizio, fine e statistiche storiche
//! - Fornisce un'interfaccia standardizzata per comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch con configurazione
//! - `item_added` / `item_removed`: Variazioni della lista
//! - `item_start`: Inizio compressione con durata stimata
//! - `progress`: Percentuale animata di un item
//! - `stage`: Stadio consultivo del compressore
//! - `item_complete` / `item_error`: Esito di un item
//! - `complete`: Fine del batch con statistiche
//! - `stats`: Riepilogo dello storico delle stime
//! - `error`: Errore generale

use crate::batch::BatchEvent;
use crate::compressor::CompressionStage;
use crate::config::Config;
use crate::estimation::StatsSummary;
use crate::format::ImageFormat;
use crate::item::ItemId;
use crate::progress::BatchSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::debug;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        total_files: usize,
        config: JsonConfig,
    },
    ItemAdded {
        id: ItemId,
        name: String,
        path: PathBuf,
        size: u64,
        format: ImageFormat,
        estimated_reduction: f64,
        confidence: f64,
        is_learning: bool,
        description: String,
    },
    ItemRemoved {
        id: ItemId,
    },
    ItemStart {
        id: ItemId,
        estimated_duration_ms: u64,
    },
    Progress {
        id: ItemId,
        percent: f64,
    },
    Stage {
        id: ItemId,
        stage: CompressionStage,
    },
    ItemComplete {
        id: ItemId,
        compressed_size: u64,
        savings_percent: u8,
        output_path: PathBuf,
    },
    ItemError {
        id: ItemId,
        message: String,
    },
    Complete {
        files_processed: usize,
        files_completed: usize,
        errors: usize,
        total_bytes_saved: u64,
        average_reduction: f64,
        duration_seconds: f64,
    },
    Stats {
        total_samples: usize,
        pairs: Vec<JsonPairStats>,
    },
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonConfig {
    pub quality: u8,
    pub output_format: Option<ImageFormat>,
    pub lossy: bool,
    pub output_path: Option<PathBuf>,
    pub tick_interval_ms: u64,
}

/// Statistiche storiche per coppia di formati
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPairStats {
    pub input_format: ImageFormat,
    pub output_format: ImageFormat,
    pub samples: usize,
    pub average_reduction: f64,
    pub average_duration_ms: u64,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, config: &Config) -> Self {
        Self::Start {
            total_files,
            config: JsonConfig::from(config),
        }
    }

    pub fn complete(summary: &BatchSummary, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: summary.files_processed,
            files_completed: summary.files_completed,
            errors: summary.errors,
            total_bytes_saved: summary.bytes_saved(),
            average_reduction: summary.overall_reduction_percent(),
            duration_seconds,
        }
    }

    pub fn stats(summary: &StatsSummary) -> Self {
        Self::Stats {
            total_samples: summary.total_samples,
            pairs: summary
                .pairs
                .iter()
                .map(|pair| JsonPairStats {
                    input_format: pair.input_format,
                    output_format: pair.output_format,
                    samples: pair.samples,
                    average_reduction: pair.average_reduction,
                    average_duration_ms: pair.average_duration_ms,
                })
                .collect(),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }

    /// Message for a batch event; `None` for events reported separately
    pub fn from_event(event: &BatchEvent) -> Option<Self> {
        let message = match event {
            BatchEvent::ItemAdded(item) => {
                let estimate = match item.status {
                    crate::item::ItemStatus::Pending {
                        ref estimated_reduction,
                    } => estimated_reduction,
                    _ => return None,
                };
                Self::ItemAdded {
                    id: item.id,
                    name: item.source.name.clone(),
                    path: item.source.path.clone(),
                    size: item.source.size,
                    format: item.source.format,
                    estimated_reduction: estimate.percent,
                    confidence: estimate.confidence,
                    is_learning: estimate.is_learning,
                    description: estimate.description.clone(),
                }
            }
            BatchEvent::Removed { id } => Self::ItemRemoved { id: *id },
            BatchEvent::Started {
                id,
                estimated_duration_ms,
            } => Self::ItemStart {
                id: *id,
                estimated_duration_ms: *estimated_duration_ms,
            },
            BatchEvent::Progress { id, percent } => Self::Progress {
                id: *id,
                percent: *percent,
            },
            BatchEvent::Stage { id, stage } => Self::Stage {
                id: *id,
                stage: *stage,
            },
            BatchEvent::Completed {
                id,
                compressed_size,
                savings_percent,
                output_path,
            } => Self::ItemComplete {
                id: *id,
                compressed_size: *compressed_size,
                savings_percent: *savings_percent,
                output_path: output_path.clone(),
            },
            BatchEvent::Failed { id, message } => Self::ItemError {
                id: *id,
                message: message.clone(),
            },
            BatchEvent::Finished(_) => return None,
        };
        Some(message)
    }

    /// Emit events until the batch finishes or the channel closes
    pub async fn emit_events(mut events: broadcast::Receiver<BatchEvent>) {
        let mut stream = JsonEventStream::new();
        loop {
            match events.recv().await {
                Ok(BatchEvent::Finished(_)) => break,
                Ok(event) => {
                    if let Some(message) = stream.message_for(&event) {
                        message.emit();
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("JSON output lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Event-to-message translation that drops updates for finished items
#[derive(Debug, Default)]
pub struct JsonEventStream {
    terminal: HashSet<ItemId>,
}

impl JsonEventStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_for(&mut self, event: &BatchEvent) -> Option<JsonMessage> {
        match event {
            BatchEvent::Progress { id, .. } | BatchEvent::Stage { id, .. } if self.terminal.contains(id) => {
                debug!("Dropping late update for {}", id);
                return None;
            }
            BatchEvent::Completed { id, .. } | BatchEvent::Failed { id, .. } | BatchEvent::Removed { id } => {
                self.terminal.insert(*id);
            }
            _ => {}
        }
        JsonMessage::from_event(event)
    }
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            quality: config.quality,
            output_format: config.output_format,
            lossy: config.lossy,
            output_path: config.output_path.clone(),
            tick_interval_ms: config.tick_interval_ms,
        }
    }
}
