//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce un enum per ogni categoria di fallimento del core
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `StateTransitionError`: Transizione di stato illegale su un item (bug del chiamante)
//! - `StoreError`: Store delle stime non raggiungibile o scrittura fallita
//! - `CompressionError`: Il compressore esterno ha fallito per un singolo item
//! - `SqueezeError`: Errore aggregato per i confini della libreria (CLI, I/O)
//!
//! ## Politica di propagazione:
//! - Solo `CompressionError` arriva all'utente (come stato `error` dell'item)
//! - `StoreError` viene sempre assorbito con fallback statici
//! - `StateTransitionError` viene loggato, mai mostrato all'utente
//!
//! ## Esempio:
//! ```rust,ignore
//! let next = item.complete(1024, output_path)?; // StateTransitionError se non in processing
//! ```

use crate::item::StatusKind;

/// Illegal status transition attempted on an item record
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition from {from} to {to}")]
pub struct StateTransitionError {
    pub from: StatusKind,
    pub to: StatusKind,
}

/// Failures of the historical estimation store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Estimation store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to persist estimation sample: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure reported by the external compressor for one item
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressionError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Encoder missing: {0}")]
    MissingEncoder(String),

    #[error("Encoder failed: {0}")]
    EncoderFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Compression cancelled")]
    Cancelled,
}

impl From<std::io::Error> for CompressionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Crate-level error for operations at the library boundary
#[derive(thiserror::Error, Debug)]
pub enum SqueezeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transition(#[from] StateTransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unknown item: {0}")]
    UnknownItem(u64),

    #[error("File validation error: {0}")]
    Validation(String),
}
