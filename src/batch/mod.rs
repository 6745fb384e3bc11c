//! # Batch Module
//!
//! Orchestrazione del batch di compressione, separata in sottomoduli:
//! - `orchestrator`: Ciclo sequenziale sugli item pending
//! - `item_store`: Lista degli item con aggiornamenti copy-on-write per id
//! - `events`: Eventi pubblicati verso i renderer

pub mod events;
pub mod item_store;
pub mod orchestrator;

pub use events::BatchEvent;
pub use item_store::{ItemStore, Replace};
pub use orchestrator::BatchOrchestrator;
