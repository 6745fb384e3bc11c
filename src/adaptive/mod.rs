//! # Adaptive Progress Module
//!
//! Animazione del progresso di una singola compressione basata sulla durata
//! stimata, con fasi a velocità diverse e convergenza rapida al completamento.
//!
//! - `phase`: Fasi, bande e parametri configurabili
//! - `engine`: Macchina a stati pura, pilotata da istanti espliciti
//! - `ticker`: Manager con timer tokio e osservatore

pub mod engine;
pub mod phase;
pub mod ticker;

pub use engine::{AdaptiveProgress, Lifecycle, Tick};
pub use phase::{Phase, PhaseSpec, PhaseTable, ProgressConfig, DEFAULT_TICK_INTERVAL_MS};
pub use ticker::{AdaptiveProgressManager, ProgressObserver};
