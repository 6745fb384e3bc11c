//! # Progress Rendering and Statistics Module
//!
//! Questo modulo gestisce la visualizzazione del progresso e le statistiche
//! del batch.
//!
//! ## Responsabilità:
//! - Una barra `indicatif` per item dentro un `MultiProgress`
//! - Traduzione degli eventi `BatchEvent` in aggiornamenti delle barre
//! - Statistiche cumulative del batch (completati, errori, byte risparmiati)
//!
//! ## Componenti principali:
//! - `BatchProgressView`: Renderer umano degli eventi del batch
//! - `BatchSummary`: Statistiche del batch, restituite da `process_pending()`
//!
//! ## Visual feedback:
//! ```text
//! ⠋ photo.png   [██████████████████████░░░░░░░░░░░░░░░░░░]  55% compressing
//! ✔ banner.jpg  [████████████████████████████████████████] 100% 43% saved
//! ```

use crate::batch::BatchEvent;
use crate::file_manager::FileManager;
use crate::item::ItemId;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Statistics of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub files_processed: usize,
    pub files_completed: usize,
    pub files_skipped: usize,
    pub errors: usize,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_completed(&mut self, original_size: u64, compressed_size: u64) {
        self.files_processed += 1;
        self.files_completed += 1;
        self.total_original_size += original_size;
        self.total_compressed_size += compressed_size;
    }

    /// Item removed while it was being processed
    pub fn add_skipped(&mut self) {
        self.files_processed += 1;
        self.files_skipped += 1;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    pub fn bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_compressed_size)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.bytes_saved() as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Completed: {} | Skipped: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_completed,
            self.files_skipped,
            self.errors,
            FileManager::format_size(self.bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}

/// Renders batch events as one progress bar per item
pub struct BatchProgressView {
    multi: MultiProgress,
    bars: HashMap<ItemId, ProgressBar>,
    names: HashMap<ItemId, String>,
    /// Items whose bar already shows its final message
    terminal: HashSet<ItemId>,
}

impl BatchProgressView {
    pub fn new() -> Self {
        Self::with_target(MultiProgress::new())
    }

    /// View drawing to a custom target (hidden in tests)
    pub fn with_target(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: HashMap::new(),
            names: HashMap::new(),
            terminal: HashSet::new(),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:20!} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉░")
    }

    fn bar(&mut self, id: ItemId) -> &ProgressBar {
        let multi = &self.multi;
        let prefix = self.names.get(&id).cloned().unwrap_or_else(|| id.to_string());
        self.bars.entry(id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(Self::style());
            bar.set_prefix(prefix);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }

    /// Percent shown by an item's bar, if it has one
    pub fn position(&self, id: ItemId) -> Option<u64> {
        self.bars.get(&id).map(|bar| bar.position())
    }

    /// Message shown next to an item's bar
    pub fn message(&self, id: ItemId) -> Option<String> {
        self.bars.get(&id).map(|bar| bar.message())
    }

    /// Apply one event to the bars
    pub fn handle(&mut self, event: &BatchEvent) {
        // Late hints must not overwrite a final message
        if let BatchEvent::Progress { id, .. } | BatchEvent::Stage { id, .. } = event {
            if self.terminal.contains(id) {
                debug!("Ignoring late update for {}", id);
                return;
            }
        }

        match event {
            BatchEvent::ItemAdded(item) => {
                self.names.insert(item.id, item.source.name.clone());
            }
            BatchEvent::Started { id, estimated_duration_ms } => {
                let bar = self.bar(*id);
                bar.set_position(0);
                bar.set_message(format!("~{}ms", estimated_duration_ms));
            }
            BatchEvent::Progress { id, percent } => {
                let bar = self.bar(*id);
                bar.set_position(percent.round() as u64);
            }
            BatchEvent::Stage { id, stage } => {
                self.bar(*id).set_message(stage.to_string());
            }
            BatchEvent::Completed { id, savings_percent, .. } => {
                self.terminal.insert(*id);
                let bar = self.bar(*id);
                bar.set_position(100);
                bar.finish_with_message(format!("✅ {}% saved", savings_percent));
            }
            BatchEvent::Failed { id, message } => {
                self.terminal.insert(*id);
                self.bar(*id).abandon_with_message(format!("❌ {}", message));
            }
            BatchEvent::Removed { id } => {
                self.terminal.insert(*id);
                if let Some(bar) = self.bars.remove(id) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
            }
            BatchEvent::Finished(summary) => {
                let _ = self.multi.println(summary.format_summary());
            }
        }
    }

    /// Render events until the batch finishes or the channel closes
    pub async fn run(mut self, mut events: broadcast::Receiver<BatchEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = matches!(event, BatchEvent::Finished(_));
                    self.handle(&event);
                    if finished {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Progress view lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

impl Default for BatchProgressView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::CompressionStage;
    use indicatif::ProgressDrawTarget;
    use std::path::PathBuf;

    #[test]
    fn test_summary_stats() {
        let mut summary = BatchSummary::new();
        summary.add_completed(1000, 400);
        summary.add_completed(1000, 600);
        summary.add_error();
        summary.add_skipped();

        assert_eq!(summary.files_processed, 4);
        assert_eq!(summary.files_completed, 2);
        assert_eq!(summary.bytes_saved(), 1000);
        assert!((summary.overall_reduction_percent() - 50.0).abs() < 1e-9);
        assert!(summary.format_summary().contains("Errors: 1"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::default();
        assert_eq!(summary.overall_reduction_percent(), 0.0);
        assert_eq!(summary.bytes_saved(), 0);
    }

    #[test]
    fn test_view_tracks_bars() {
        let mut view = BatchProgressView::with_target(MultiProgress::with_draw_target(
            ProgressDrawTarget::hidden(),
        ));
        let id = ItemId(1);

        view.handle(&BatchEvent::Started { id, estimated_duration_ms: 300 });
        view.handle(&BatchEvent::Progress { id, percent: 41.6 });
        assert_eq!(view.position(id), Some(42));

        view.handle(&BatchEvent::Stage { id, stage: CompressionStage::Saving });
        view.handle(&BatchEvent::Completed {
            id,
            compressed_size: 10,
            savings_percent: 90,
            output_path: PathBuf::from("a.webp"),
        });
        assert_eq!(view.position(id), Some(100));

        view.handle(&BatchEvent::Removed { id });
        assert_eq!(view.position(id), None);
    }

    #[test]
    fn test_late_stage_keeps_error_message() {
        let mut view = BatchProgressView::with_target(MultiProgress::with_draw_target(
            ProgressDrawTarget::hidden(),
        ));
        let id = ItemId(7);

        view.handle(&BatchEvent::Started { id, estimated_duration_ms: 300 });
        view.handle(&BatchEvent::Progress { id, percent: 30.0 });
        view.handle(&BatchEvent::Failed {
            id,
            message: "corrupt input".to_string(),
        });
        view.handle(&BatchEvent::Stage { id, stage: CompressionStage::Error });
        view.handle(&BatchEvent::Progress { id, percent: 80.0 });

        assert_eq!(view.message(id).as_deref(), Some("❌ corrupt input"));
        assert_eq!(view.position(id), Some(30));
    }
}
