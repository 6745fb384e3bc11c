//! # Batch Orchestrator
//!
//! Orchestratore del batch: collega item, stime, animazione del progresso
//! e compressore, e restituisce allo storico i risultati reali.
//!
//! ## Flusso per ogni item pending (sequenziale):
//! 1. pending → processing(0)
//! 2. Stima della durata (mai bloccante: fallback se lo store non risponde)
//! 3. Avvio di un `AdaptiveProgressManager` il cui osservatore aggiorna
//!    l'item per id
//! 4. `compression_started()` e chiamata al compressore
//! 5. Successo: `compression_completed()`, attesa limitata della convergenza
//!    a 100, processing → completed, registrazione del risultato su un task
//!    bloccante separato
//! 6. Errore: `fail(messaggio)` sul manager, processing → error
//! 7. Rimozione del manager dal registro
//!
//! Il fallimento di un item non interrompe il batch. Il registro dei manager
//! appartiene all'orchestratore: nessuno stato globale.

use crate::adaptive::{AdaptiveProgressManager, ProgressConfig, ProgressObserver};
use crate::batch::events::{BatchEvent, EVENT_CAPACITY};
use crate::batch::item_store::{ItemStore, Replace};
use crate::compressor::{CompressedImage, CompressionRequest, Compressor, StageEvent};
use crate::config::Config;
use crate::error::SqueezeError;
use crate::estimation::{CompressionRecord, EstimationQuery, EstimationService};
use crate::file_manager::FileManager;
use crate::item::{ImageItem, ImageSource, ItemId, ItemStatus, StatusKind};
use crate::progress::BatchSummary;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of processing a single item
#[derive(Debug, Clone, PartialEq)]
enum ItemOutcome {
    Completed { original_size: u64, compressed_size: u64 },
    Failed,
    Skipped,
}

/// Feeds one manager's progress into the item store
struct ItemProgressObserver {
    id: ItemId,
    items: Arc<ItemStore>,
    events: broadcast::Sender<BatchEvent>,
}

impl ProgressObserver for ItemProgressObserver {
    fn on_progress(&self, percent: f64) {
        match self.items.replace(self.id, |item| item.with_progress(percent)) {
            Replace::Updated(item) => {
                let percent = item.progress().unwrap_or(percent);
                let _ = self.events.send(BatchEvent::Progress { id: self.id, percent });
            }
            Replace::Missing => debug!("Progress for removed item {}", self.id),
            Replace::Rejected(e) => debug!("Ignoring progress for {}: {}", self.id, e),
        }
    }

    fn on_complete(&self) {
        debug!("Progress bar of {} reached 100%", self.id);
    }

    fn on_error(&self, message: &str) {
        debug!("Progress bar of {} stopped on error: {}", self.id, message);
    }
}

/// Drives pending items through the compressor one at a time
pub struct BatchOrchestrator<C: Compressor> {
    config: Config,
    compressor: C,
    estimation: Arc<EstimationService>,
    items: Arc<ItemStore>,
    managers: Mutex<HashMap<ItemId, Arc<AdaptiveProgressManager>>>,
    events: broadcast::Sender<BatchEvent>,
    next_id: AtomicU64,
    recordings: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Compressor> BatchOrchestrator<C> {
    pub fn new(config: Config, compressor: C, estimation: Arc<EstimationService>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            compressor,
            estimation,
            items: Arc::new(ItemStore::new()),
            managers: Mutex::new(HashMap::new()),
            events,
            next_id: AtomicU64::new(1),
            recordings: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn estimation(&self) -> &Arc<EstimationService> {
        &self.estimation
    }

    /// Receive every batch event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    /// Snapshot of all items
    pub fn items(&self) -> Arc<Vec<ImageItem>> {
        self.items.snapshot()
    }

    pub fn item(&self, id: ItemId) -> Option<ImageItem> {
        self.items.get(id)
    }

    /// Number of progress managers currently animating
    pub fn active_managers(&self) -> usize {
        self.lock_managers().len()
    }

    fn lock_managers(&self) -> MutexGuard<'_, HashMap<ItemId, Arc<AdaptiveProgressManager>>> {
        self.managers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BatchEvent) {
        let _ = self.events.send(event);
    }

    fn query_for(&self, source: &ImageSource) -> EstimationQuery {
        EstimationQuery {
            input_format: source.format,
            output_format: self.config.target_format(source.format),
            original_size: source.size,
            quality: self.config.quality,
            lossy: self.config.lossy,
        }
    }

    /// Add a pending item carrying its estimated reduction
    pub fn add_source(&self, source: ImageSource) -> ItemId {
        let id = ItemId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let estimate = self.estimation.estimate(&self.query_for(&source));
        debug!(
            "Added {} ({}): ~{:.0}% reduction, confidence {:.2}",
            id, source.name, estimate.percent, estimate.confidence
        );

        let item = ImageItem::new(id, source, estimate);
        self.items.insert(item.clone());
        self.emit(BatchEvent::ItemAdded(item));
        id
    }

    /// Describe a file on disk and add it as a pending item
    pub async fn add_file(&self, path: &Path) -> Result<ItemId, SqueezeError> {
        let source = FileManager::describe(path).await?;
        Ok(self.add_source(source))
    }

    /// Process every pending item sequentially
    pub async fn process_pending(&self) -> BatchSummary {
        let pending: Vec<ItemId> = self
            .items
            .snapshot()
            .iter()
            .filter(|item| item.kind() == StatusKind::Pending)
            .map(|item| item.id)
            .collect();

        info!("🚀 Processing {} pending images", pending.len());
        let mut summary = BatchSummary::new();

        for id in pending {
            match self.process_item(id).await {
                ItemOutcome::Completed {
                    original_size,
                    compressed_size,
                } => summary.add_completed(original_size, compressed_size),
                ItemOutcome::Failed => summary.add_error(),
                ItemOutcome::Skipped => summary.add_skipped(),
            }
        }

        info!("✨ Batch finished: {}", summary.format_summary());
        self.emit(BatchEvent::Finished(summary.clone()));
        summary
    }

    async fn process_item(&self, id: ItemId) -> ItemOutcome {
        let item = match self.items.replace(id, |item| item.start_processing()) {
            Replace::Updated(item) => item,
            Replace::Missing => {
                debug!("Item {} was removed before processing", id);
                return ItemOutcome::Skipped;
            }
            Replace::Rejected(e) => {
                error!("Cannot start {}: {}", id, e);
                return ItemOutcome::Skipped;
            }
        };

        let query = self.query_for(&item.source);
        let duration = self.estimation.estimate_duration(&query);
        debug!(
            "{}: estimated {}ms ({:?}, {} samples)",
            id, duration.duration_ms, duration.source, duration.sample_count
        );
        self.emit(BatchEvent::Started {
            id,
            estimated_duration_ms: duration.duration_ms,
        });

        let progress_config = ProgressConfig::new(duration.duration_ms)
            .with_tick_interval(self.config.tick_interval_ms)
            .with_phases(self.config.phases.clone());
        let observer = Arc::new(ItemProgressObserver {
            id,
            items: Arc::clone(&self.items),
            events: self.events.clone(),
        });
        let manager = Arc::new(AdaptiveProgressManager::start(progress_config, observer));
        self.lock_managers().insert(id, Arc::clone(&manager));

        manager.compression_started();
        let (stages, relay) = self.forward_stages();
        let request = CompressionRequest {
            id,
            path: item.source.path.clone(),
            quality: query.quality,
            output_format: query.output_format,
            lossy: query.lossy,
            output_dir: self.config.output_path.clone(),
            stages: Some(stages),
        };

        let started = Instant::now();
        let result = self.compressor.compress(&request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        drop(request);
        self.flush_stages(id, relay).await;

        let outcome = match result {
            Ok(compressed) => {
                manager.compression_completed();
                manager.settle(self.config.settle_timeout()).await;
                manager.stop();

                self.record(query, &compressed, elapsed_ms);
                self.finish_completed(id, item.source.size, compressed)
            }
            Err(e) => {
                let message = e.to_string();
                manager.fail(&message);
                self.finish_failed(id, message)
            }
        };

        self.lock_managers().remove(&id);
        outcome
    }

    /// Stage sink whose hints are republished as batch events
    fn forward_stages(&self) -> (broadcast::Sender<StageEvent>, JoinHandle<()>) {
        let (tx, mut rx) = broadcast::channel::<StageEvent>(16);
        let events = self.events.clone();

        let relay = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(StageEvent { id, stage }) => {
                        debug!("{}: {}", id, stage);
                        let _ = events.send(BatchEvent::Stage { id, stage });
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        (tx, relay)
    }

    /// Deliver buffered hints before the item turns terminal.
    /// The sink must already be dropped; a compressor still holding a
    /// clone loses whatever it reports afterwards.
    async fn flush_stages(&self, id: ItemId, mut relay: JoinHandle<()>) {
        match tokio::time::timeout(self.config.settle_timeout(), &mut relay).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Stage relay of {} failed: {}", id, e),
            Err(_) => {
                debug!("Stage sink of {} still open, dropping later hints", id);
                relay.abort();
            }
        }
    }

    fn finish_completed(&self, id: ItemId, original_size: u64, compressed: CompressedImage) -> ItemOutcome {
        let CompressedImage {
            compressed_size,
            output_path,
        } = compressed;

        match self
            .items
            .replace(id, |item| item.complete(compressed_size, output_path.clone()))
        {
            Replace::Updated(item) => {
                let savings_percent = match item.status {
                    ItemStatus::Completed { savings_percent, .. } => savings_percent,
                    _ => 0,
                };
                info!(
                    "✅ {}: {} → {} ({}% saved)",
                    item.source.name,
                    FileManager::format_size(original_size),
                    FileManager::format_size(compressed_size),
                    savings_percent
                );
                self.emit(BatchEvent::Completed {
                    id,
                    compressed_size,
                    savings_percent,
                    output_path,
                });
                ItemOutcome::Completed {
                    original_size,
                    compressed_size,
                }
            }
            Replace::Missing => {
                debug!("Item {} was removed while compressing", id);
                ItemOutcome::Skipped
            }
            Replace::Rejected(e) => {
                error!("Cannot complete {}: {}", id, e);
                ItemOutcome::Skipped
            }
        }
    }

    fn finish_failed(&self, id: ItemId, message: String) -> ItemOutcome {
        match self.items.replace(id, |item| item.fail(message.clone())) {
            Replace::Updated(item) => {
                error!("❌ {}: {}", item.source.name, message);
                self.emit(BatchEvent::Failed { id, message });
                ItemOutcome::Failed
            }
            Replace::Missing => {
                debug!("Item {} was removed while compressing", id);
                ItemOutcome::Skipped
            }
            Replace::Rejected(e) => {
                error!("Cannot mark {} as failed: {}", id, e);
                ItemOutcome::Skipped
            }
        }
    }

    /// Feed the true outcome back to the store without blocking the batch
    fn record(&self, query: EstimationQuery, compressed: &CompressedImage, duration_ms: u64) {
        let record = CompressionRecord {
            query,
            compressed_size: compressed.compressed_size,
            duration_ms,
        };
        let estimation = Arc::clone(&self.estimation);
        let handle = tokio::task::spawn_blocking(move || estimation.record(&record));

        let mut recordings = self.recordings.lock().unwrap_or_else(PoisonError::into_inner);
        recordings.retain(|pending| !pending.is_finished());
        recordings.push(handle);
    }

    /// Recording tasks still tracked (finished ones are pruned on the next push)
    pub fn pending_recordings(&self) -> usize {
        self.recordings.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for outstanding background recordings
    pub async fn drain_recordings(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.recordings.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }

        debug!("Waiting for {} pending recordings", handles.len());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Recording task failed: {}", e);
            }
        }
    }

    /// Remove an item, stopping its progress manager if it is animating
    pub fn remove_item(&self, id: ItemId) -> Option<ImageItem> {
        if let Some(manager) = self.lock_managers().remove(&id) {
            manager.stop();
        }
        let removed = self.items.remove(id)?;
        self.emit(BatchEvent::Removed { id });
        Some(removed)
    }

    /// Remove every item and stop every progress manager
    pub fn clear(&self) {
        let managers: Vec<Arc<AdaptiveProgressManager>> =
            self.lock_managers().drain().map(|(_, manager)| manager).collect();
        for manager in &managers {
            manager.stop();
        }

        for item in self.items.snapshot().iter() {
            self.emit(BatchEvent::Removed { id: item.id });
        }
        self.items.clear();
        info!("🧹 Cleared batch ({} active managers stopped)", managers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::CompressionStage;
    use crate::error::CompressionError;
    use crate::estimation::{EstimationStore, MemoryEstimationStore};
    use crate::format::ImageFormat;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Compressor with scripted delay and outcome per file name
    struct ScriptedCompressor {
        delay: Duration,
        failing: &'static str,
    }

    impl Compressor for ScriptedCompressor {
        async fn compress(&self, request: &CompressionRequest) -> Result<CompressedImage, CompressionError> {
            request.report(CompressionStage::Loading);
            tokio::time::sleep(self.delay).await;

            if request.path.ends_with(self.failing) {
                request.report(CompressionStage::Error);
                return Err(CompressionError::EncoderFailed("corrupt input".to_string()));
            }

            request.report(CompressionStage::Complete);
            Ok(CompressedImage {
                compressed_size: 400_000,
                output_path: request.path.with_extension("webp"),
            })
        }
    }

    fn source(name: &str) -> ImageSource {
        ImageSource {
            name: name.to_string(),
            path: PathBuf::from("/photos").join(name),
            size: 800_000,
            format: ImageFormat::Png,
        }
    }

    fn orchestrator(
        delay_ms: u64,
        failing: &'static str,
    ) -> (BatchOrchestrator<ScriptedCompressor>, Arc<MemoryEstimationStore>) {
        let store = Arc::new(MemoryEstimationStore::new());
        let estimation = Arc::new(EstimationService::new(
            Arc::clone(&store) as Arc<dyn EstimationStore>
        ));
        let config = Config {
            output_format: Some(ImageFormat::WebP),
            ..Config::default()
        };
        let compressor = ScriptedCompressor {
            delay: Duration::from_millis(delay_ms),
            failing,
        };
        (BatchOrchestrator::new(config, compressor, estimation), store)
    }

    fn drain(rx: &mut broadcast::Receiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_halt_batch() {
        let (batch, store) = orchestrator(200, "b.png");
        let mut rx = batch.subscribe();
        let a = batch.add_source(source("a.png"));
        let b = batch.add_source(source("b.png"));
        let c = batch.add_source(source("c.png"));

        let summary = batch.process_pending().await;
        batch.drain_recordings().await;

        assert_eq!(summary.files_completed, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.bytes_saved(), 800_000);

        assert!(matches!(
            batch.item(a).unwrap().status,
            ItemStatus::Completed { savings_percent: 50, .. }
        ));
        assert_eq!(
            batch.item(b).unwrap().status,
            ItemStatus::Error {
                message: "Encoder failed: corrupt input".to_string()
            }
        );
        assert_eq!(batch.item(c).unwrap().kind(), StatusKind::Completed);
        assert_eq!(batch.active_managers(), 0);
        assert_eq!(store.count().unwrap(), 2);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(BatchEvent::Finished(_))));
        assert!(events.iter().any(|e| matches!(e, BatchEvent::Stage { id, stage: CompressionStage::Error } if *id == b)));
        assert!(events.iter().any(|e| matches!(e, BatchEvent::Failed { id, .. } if *id == b)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_hints_precede_terminal_event() {
        let (batch, _store) = orchestrator(150, "b.png");
        let mut rx = batch.subscribe();
        let a = batch.add_source(source("a.png"));
        let b = batch.add_source(source("b.png"));

        batch.process_pending().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let events = drain(&mut rx);

        for id in [a, b] {
            let terminal = events
                .iter()
                .position(|e| {
                    matches!(e, BatchEvent::Completed { id: tid, .. } | BatchEvent::Failed { id: tid, .. } if *tid == id)
                })
                .unwrap();
            let last_stage = events
                .iter()
                .rposition(|e| matches!(e, BatchEvent::Stage { id: sid, .. } if *sid == id))
                .unwrap();
            assert!(last_stage < terminal, "stage hint for {} after its terminal event", id);
        }

        let finished = events
            .iter()
            .position(|e| matches!(e, BatchEvent::Finished(_)))
            .unwrap();
        assert_eq!(finished, events.len() - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_recordings_are_pruned() {
        let (batch, store) = orchestrator(100, "none");
        batch.add_source(source("a.png"));
        batch.process_pending().await;
        assert_eq!(batch.pending_recordings(), 1);

        while store.count().unwrap() < 1 {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        std::thread::sleep(std::time::Duration::from_millis(50));

        batch.add_source(source("b.png"));
        batch.process_pending().await;
        assert_eq!(batch.pending_recordings(), 1);

        batch.drain_recordings().await;
        assert_eq!(batch.pending_recordings(), 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_stops_at_terminal_event() {
        let (batch, _store) = orchestrator(250, "b.png");
        let mut rx = batch.subscribe();
        let ids = [
            batch.add_source(source("a.png")),
            batch.add_source(source("b.png")),
        ];

        batch.process_pending().await;
        let events = drain(&mut rx);

        for id in ids {
            let mut last = 0.0;
            let mut terminal = false;
            let mut ticks = 0;
            for event in events.iter().filter(|e| e.item_id() == Some(id)) {
                match event {
                    BatchEvent::Progress { percent, .. } => {
                        assert!(!terminal, "progress after terminal event for {}", id);
                        assert!(*percent >= last);
                        last = *percent;
                        ticks += 1;
                    }
                    BatchEvent::Completed { .. } | BatchEvent::Failed { .. } => terminal = true,
                    _ => {}
                }
            }
            assert!(terminal);
            assert!(ticks > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_bar_reaches_100_before_completion() {
        let (batch, _store) = orchestrator(100, "none");
        let mut rx = batch.subscribe();
        let id = batch.add_source(source("a.png"));

        batch.process_pending().await;
        let events = drain(&mut rx);

        let completed_at = events
            .iter()
            .position(|e| matches!(e, BatchEvent::Completed { .. }))
            .unwrap();
        let last_progress = events[..completed_at]
            .iter()
            .rev()
            .find_map(|e| match e {
                BatchEvent::Progress { id: pid, percent } if *pid == id => Some(*percent),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_progress, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_feeds_later_estimates() {
        let (batch, _store) = orchestrator(200, "none");
        let first = batch.add_source(source("a.png"));
        match batch.item(first).unwrap().status {
            ItemStatus::Pending { ref estimated_reduction } => assert!(!estimated_reduction.is_learning),
            ref other => panic!("unexpected status {:?}", other),
        }

        batch.process_pending().await;
        batch.drain_recordings().await;

        let second = batch.add_source(source("d.png"));
        match batch.item(second).unwrap().status {
            ItemStatus::Pending { ref estimated_reduction } => {
                assert!(estimated_reduction.is_learning);
                assert_eq!(estimated_reduction.sample_count, 1);
                assert!((estimated_reduction.percent - 50.0).abs() < 1e-9);
                assert!(estimated_reduction.mean_duration_ms.is_some());
            }
            ref other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_stops_active_managers() {
        let (batch, _store) = orchestrator(10_000, "none");
        let batch = Arc::new(batch);
        batch.add_source(source("a.png"));
        batch.add_source(source("b.png"));

        let worker = {
            let batch = Arc::clone(&batch);
            tokio::spawn(async move { batch.process_pending().await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(batch.active_managers(), 1);

        batch.clear();
        assert_eq!(batch.active_managers(), 0);
        assert!(batch.items().is_empty());

        let summary = worker.await.unwrap();
        assert_eq!(summary.files_completed, 0);
        assert!(batch.items().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_item_during_processing() {
        let (batch, _store) = orchestrator(2_000, "none");
        let batch = Arc::new(batch);
        let a = batch.add_source(source("a.png"));
        let b = batch.add_source(source("b.png"));

        let worker = {
            let batch = Arc::clone(&batch);
            tokio::spawn(async move { batch.process_pending().await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(batch.item(a).unwrap().progress().unwrap() > 0.0);
        assert!(batch.remove_item(a).is_some());
        assert!(batch.remove_item(a).is_none());

        let summary = worker.await.unwrap();
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_completed, 1);
        assert!(batch.item(a).is_none());
        assert_eq!(batch.item(b).unwrap().kind(), StatusKind::Completed);
    }
}
