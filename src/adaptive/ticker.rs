//! # Progress Manager (timer driver)
//!
//! Collega il motore `AdaptiveProgress` a un timer tokio periodico e a un
//! osservatore con tre metodi.
//!
//! ## Garanzie:
//! - `on_complete` e `on_error` sono mutuamente esclusivi e chiamati al più una volta
//! - Nessun `on_progress` dopo `on_complete`/`on_error`/`stop()`
//! - `stop()` è sincrono e idempotente; il drop del manager equivale a `stop()`
//!
//! Lo stato del motore è protetto da un mutex tenuto anche durante
//! l'emissione verso l'osservatore: quando `stop()` ritorna nessun tick può
//! più emettere. Gli osservatori non devono richiamare il manager.
//!
//! ## Esempio:
//! ```rust,ignore
//! let manager = AdaptiveProgressManager::start(ProgressConfig::new(1200), observer);
//! manager.compression_started();
//! // ... compressore esterno ...
//! manager.compression_completed();
//! manager.finished().await;
//! ```

use crate::adaptive::engine::{AdaptiveProgress, Lifecycle};
use crate::adaptive::phase::{Phase, ProgressConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Receiver of one manager's progress stream
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percent: f64);

    fn on_complete(&self);

    fn on_error(&self, message: &str);
}

struct Shared {
    engine: AdaptiveProgress,
    observer: Arc<dyn ProgressObserver>,
    lifecycle_tx: watch::Sender<Lifecycle>,
}

impl Shared {
    fn publish(&self) {
        self.lifecycle_tx.send_replace(self.engine.lifecycle());
    }
}

/// Animates one item's progress until completion, error or stop
pub struct AdaptiveProgressManager {
    shared: Arc<Mutex<Shared>>,
    lifecycle_rx: watch::Receiver<Lifecycle>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AdaptiveProgressManager {
    /// Start ticking; must be called within a tokio runtime
    pub fn start(config: ProgressConfig, observer: Arc<dyn ProgressObserver>) -> Self {
        let interval = config.tick_interval();
        let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Running);
        let (stop_tx, stop_rx) = watch::channel(false);

        debug!(
            "Progress manager started (estimate {}ms, tick {}ms)",
            config.estimated_duration_ms,
            interval.as_millis()
        );

        let shared = Arc::new(Mutex::new(Shared {
            engine: AdaptiveProgress::new(config, Instant::now()),
            observer,
            lifecycle_tx,
        }));

        let task = tokio::spawn(run_ticks(Arc::clone(&shared), interval, stop_rx));

        Self {
            shared,
            lifecycle_rx,
            stop_tx,
            task,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    pub fn progress(&self) -> f64 {
        self.lock().engine.progress()
    }

    pub fn phase(&self) -> Phase {
        self.lock().engine.phase()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().engine.lifecycle()
    }

    /// Real compression began
    pub fn compression_started(&self) {
        self.lock().engine.compression_started();
    }

    /// Real compression finished; the curve converges to 100
    pub fn compression_completed(&self) {
        self.lock().engine.compression_completed();
    }

    /// Stop ticking and report `message` to the observer once
    pub fn fail(&self, message: &str) {
        {
            let mut shared = self.lock();
            if shared.engine.fail() {
                shared.observer.on_error(message);
                shared.publish();
            }
        }
        let _ = self.stop_tx.send(true);
    }

    /// Cancel without completion or error
    pub fn stop(&self) {
        {
            let mut shared = self.lock();
            if shared.engine.stop() {
                shared.publish();
            }
        }
        let _ = self.stop_tx.send(true);
    }

    /// Wait until the manager leaves the running state
    pub async fn finished(&self) -> Lifecycle {
        let mut rx = self.lifecycle_rx.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.lifecycle();
            }
        }
    }

    /// Like `finished`, but stops the manager when `timeout` expires first
    pub async fn settle(&self, timeout: Duration) -> Lifecycle {
        match tokio::time::timeout(timeout, self.finished()).await {
            Ok(lifecycle) => lifecycle,
            Err(_) => {
                debug!("Progress manager did not settle within {}ms, stopping", timeout.as_millis());
                self.stop();
                self.lifecycle()
            }
        }
    }
}

impl Drop for AdaptiveProgressManager {
    fn drop(&mut self) {
        self.stop();
        self.task.abort();
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_ticks(shared: Arc<Mutex<Shared>>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !tick_once(&shared) {
                    break;
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// One emission; false when ticking should end
fn tick_once(shared: &Mutex<Shared>) -> bool {
    let mut guard = lock_shared(shared);
    let shared = &mut *guard;

    let Some(tick) = shared.engine.tick(Instant::now()) else {
        return false;
    };

    shared.observer.on_progress(tick.progress);
    if tick.finished {
        shared.observer.on_complete();
        shared.publish();
        return false;
    }
    true
}
