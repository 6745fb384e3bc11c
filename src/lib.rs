//! # Image Squeeze Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `adaptive`: Motore di progresso adattivo e ticker per item
//! - `batch`: Orchestratore del batch, store degli item ed eventi
//! - `compressor`: Trait del compressore e implementazione con encoder esterni
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per diverse operazioni
//! - `estimation`: Stima di riduzione e durata con apprendimento storico
//! - `file_manager`: Operazioni sui file e discovery immagini
//! - `format`: Formati immagine e fasce di dimensione
//! - `item`: Record dell'item e transizioni di stato
//! - `json_output`: Output JSON per uso programmatico
//! - `platform`: Risoluzione dei comandi specifica per piattaforma
//! - `progress`: Barre di progresso e statistiche
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use image_squeeze::{BatchOrchestrator, Config, EstimationService, MemoryEstimationStore, ToolCompressor};
//!
//! let estimation = Arc::new(EstimationService::new(Arc::new(MemoryEstimationStore::new())));
//! let orchestrator = BatchOrchestrator::new(Config::default(), ToolCompressor::new(), estimation);
//! orchestrator.add_file(&path).await?;
//! let summary = orchestrator.process_pending().await;
//! ```

pub mod adaptive;
pub mod batch;
pub mod compressor;
pub mod config;
pub mod error;
pub mod estimation;
pub mod file_manager;
pub mod format;
pub mod item;
pub mod json_output;
pub mod platform;
pub mod progress;

pub use adaptive::{AdaptiveProgress, AdaptiveProgressManager, Lifecycle, ProgressConfig, ProgressObserver};
pub use batch::{BatchEvent, BatchOrchestrator, ItemStore};
pub use compressor::{CompressedImage, CompressionRequest, CompressionStage, Compressor, ToolCompressor};
pub use config::Config;
pub use error::{CompressionError, SqueezeError, StateTransitionError, StoreError};
pub use estimation::{
    EstimationQuery, EstimationResult, EstimationService, EstimationStore, JsonEstimationStore,
    MemoryEstimationStore,
};
pub use format::{ImageFormat, SizeBucket};
pub use item::{ImageItem, ImageSource, ItemId, ItemStatus};
pub use progress::{BatchProgressView, BatchSummary};
