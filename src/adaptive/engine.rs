//! # Adaptive Progress Engine
//!
//! Macchina a stati pura (senza timer) che trasforma una durata stimata in
//! una curva di progresso monotona a fasi.
//!
//! ## Algoritmo per tick:
//! 1. `elapsed = now - start`
//! 2. `raw = elapsed / durata * velocità(fase) * 100`, limitato alla banda della fase
//! 3. Se `raw <= ultimo`, avanza comunque di `min_step`
//! 4. Ricalcola la fase dal nuovo valore
//! 5. Se il completamento reale è già stato segnalato, forza la fase `Final`
//! 6. A 100 la fase diventa `Completed` e il motore si ferma
//!
//! Dopo il segnale di completamento, ogni tick copre almeno una frazione
//! della distanza residua così che 100 venga raggiunto entro
//! `convergence_ticks` tick.

use crate::adaptive::phase::{Phase, ProgressConfig};
use tokio::time::Instant;

/// Durations below this always resolve to 100 on the next tick
const MIN_DURATION_MS: f64 = 1.0;

/// Lifecycle of a progress manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Result of one animation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub progress: f64,
    /// Phase computed for this tick's value
    pub phase: Phase,
    /// The curve reached 100 with this tick
    pub finished: bool,
}

/// Timer-free progress state for one item
#[derive(Debug, Clone)]
pub struct AdaptiveProgress {
    config: ProgressConfig,
    started_at: Instant,
    last_progress: f64,
    phase: Phase,
    completion_signaled: bool,
    convergence_left: u32,
    lifecycle: Lifecycle,
}

impl AdaptiveProgress {
    pub fn new(config: ProgressConfig, started_at: Instant) -> Self {
        Self {
            config,
            started_at,
            last_progress: 0.0,
            phase: Phase::Smooth,
            completion_signaled: false,
            convergence_left: 0,
            lifecycle: Lifecycle::Running,
        }
    }

    pub fn progress(&self) -> f64 {
        self.last_progress
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    pub fn completion_signaled(&self) -> bool {
        self.completion_signaled
    }

    /// Advance the curve to `now`; `None` once the engine is no longer running
    pub fn tick(&mut self, now: Instant) -> Option<Tick> {
        if self.lifecycle != Lifecycle::Running {
            return None;
        }

        let table = &self.config.phases;
        let duration_ms = self.config.estimated_duration_ms as f64;

        // A duration shorter than one tick is over by the first tick
        let near_zero = MIN_DURATION_MS.max(self.config.tick_interval_ms as f64);
        let mut candidate = if duration_ms <= near_zero {
            100.0
        } else {
            let elapsed_ms = now.saturating_duration_since(self.started_at).as_secs_f64() * 1000.0;
            let spec = table.spec(self.phase);
            let raw = elapsed_ms / duration_ms * spec.speed * 100.0;
            raw.clamp(spec.start, spec.end)
        };

        if candidate <= self.last_progress {
            candidate = self.last_progress + table.min_step;
        }

        if self.completion_signaled {
            let remaining = self.convergence_left.max(1);
            let floor = self.last_progress + (100.0 - self.last_progress) / f64::from(remaining);
            candidate = candidate.max(floor);
            self.convergence_left = remaining - 1;
        }

        let candidate = candidate.min(100.0);

        let mut phase = table.phase_for(candidate, self.completion_signaled);
        if self.completion_signaled && phase != Phase::Final {
            phase = Phase::Final;
        }

        self.last_progress = candidate;
        self.phase = phase;

        let finished = candidate >= 100.0;
        if finished {
            self.phase = Phase::Completed;
            self.lifecycle = Lifecycle::Completed;
        }

        Some(Tick {
            progress: candidate,
            phase,
            finished,
        })
    }

    /// The compressor really started: undo an overly pessimistic slowdown
    pub fn compression_started(&mut self) {
        if self.lifecycle == Lifecycle::Running
            && self.phase == Phase::Waiting
            && self.last_progress < self.config.phases.recovery_threshold
        {
            self.phase = Phase::Smooth;
        }
    }

    /// The compressor finished: converge to 100 quickly
    pub fn compression_completed(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        if !self.completion_signaled {
            self.completion_signaled = true;
            self.convergence_left = self.config.phases.convergence_ticks;
        }
        self.phase = Phase::Final;
    }

    /// Terminate with an error; true if this call changed the lifecycle
    pub fn fail(&mut self) -> bool {
        self.finish_as(Lifecycle::Failed)
    }

    /// Terminate silently; true if this call changed the lifecycle
    pub fn stop(&mut self) -> bool {
        self.finish_as(Lifecycle::Stopped)
    }

    fn finish_as(&mut self, lifecycle: Lifecycle) -> bool {
        if self.lifecycle != Lifecycle::Running {
            return false;
        }
        self.lifecycle = lifecycle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::phase::PhaseTable;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn engine(duration_ms: u64) -> (AdaptiveProgress, Instant) {
        let t0 = Instant::now();
        (AdaptiveProgress::new(ProgressConfig::new(duration_ms), t0), t0)
    }

    /// Tick every `interval` ms up to `until` ms, returning every emission
    fn run(engine: &mut AdaptiveProgress, t0: Instant, interval: u64, until: u64) -> Vec<Tick> {
        let mut ticks = Vec::new();
        let mut at = interval;
        while at <= until {
            if let Some(tick) = engine.tick(t0 + ms(at)) {
                ticks.push(tick);
            }
            at += interval;
        }
        ticks
    }

    #[test]
    fn test_monotonic_and_bounded() {
        // Deterministic pseudo-random completion points
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for duration in [0, 1, 40, 300, 1000, 5000] {
            for interval in [10, 50, 200] {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let signal_at = (seed >> 33) % 4000;

                let (mut engine, t0) = engine(duration);
                let mut last = 0.0;
                let mut at = interval;
                let mut completions = 0;
                while at <= 30_000 {
                    if at >= signal_at {
                        engine.compression_completed();
                    }
                    if let Some(tick) = engine.tick(t0 + ms(at)) {
                        assert!(tick.progress >= last, "regressed at {}ms", at);
                        assert!((0.0..=100.0).contains(&tick.progress));
                        last = tick.progress;
                        if tick.finished {
                            completions += 1;
                        }
                    }
                    at += interval;
                }
                assert_eq!(completions, 1, "duration {} interval {}", duration, interval);
                assert_eq!(engine.lifecycle(), Lifecycle::Completed);
            }
        }
    }

    #[test]
    fn test_never_smooth_after_estimated_duration() {
        for duration in [200, 1000, 3000] {
            let (mut engine, t0) = engine(duration);
            let ticks = run(&mut engine, t0, 50, duration * 4);
            for (index, tick) in ticks.iter().enumerate() {
                let elapsed = (index as u64 + 1) * 50;
                if elapsed >= duration {
                    assert_ne!(tick.phase, Phase::Smooth, "smooth at {}ms of {}ms", elapsed, duration);
                }
            }
        }
    }

    #[test]
    fn test_signal_below_90_forces_final_on_next_tick() {
        for signal_at in [50, 300, 650, 900] {
            let (mut engine, t0) = engine(1000);
            run(&mut engine, t0, 50, signal_at);
            assert!(engine.progress() < 90.0);
            engine.compression_completed();
            let tick = engine.tick(t0 + ms(signal_at + 50)).unwrap();
            assert_eq!(tick.phase, Phase::Final);
        }
    }

    #[test]
    fn test_scenario_mid_estimate_sample() {
        let (mut engine, t0) = engine(1000);
        let ticks = run(&mut engine, t0, 50, 550);
        let last = ticks.last().unwrap();
        assert!(last.progress > 0.0 && last.progress < 80.0);
        assert!(matches!(last.phase, Phase::Smooth | Phase::Waiting));
        assert!(!last.finished);
    }

    #[test]
    fn test_scenario_completion_at_300ms() {
        let (mut engine, t0) = engine(1000);
        run(&mut engine, t0, 50, 300);
        engine.compression_completed();

        let first = engine.tick(t0 + ms(350)).unwrap();
        assert!(first.progress > 0.0);

        let mut reached = first.finished;
        for extra in 1..=2 {
            if reached {
                break;
            }
            reached = engine.tick(t0 + ms(350 + extra * 50)).unwrap().finished;
        }
        assert!(reached);
        assert_eq!(engine.progress(), 100.0);
        assert!(engine.tick(t0 + ms(2000)).is_none());
    }

    #[test]
    fn test_zero_duration_resolves_next_tick() {
        for duration in [0, 1, 5, 20, 50] {
            let (mut engine, t0) = engine(duration);
            let tick = engine.tick(t0 + ms(50)).unwrap();
            assert_eq!(tick.progress, 100.0, "duration {}ms", duration);
            assert!(tick.finished);
            assert_eq!(engine.phase(), Phase::Completed);
        }

        // Just above one tick the curve animates normally
        let (mut engine, t0) = engine(51);
        assert!(!engine.tick(t0 + ms(50)).unwrap().finished);
    }

    #[test]
    fn test_completion_before_first_tick_emits_intermediate_value() {
        let (mut engine, t0) = engine(10_000);
        engine.compression_completed();

        let first = engine.tick(t0 + ms(50)).unwrap();
        assert!(first.progress > 0.0 && first.progress < 100.0);
        assert!(!first.finished);
        assert_eq!(first.phase, Phase::Final);

        let second = engine.tick(t0 + ms(100)).unwrap();
        assert_eq!(second.progress, 100.0);
        assert!(second.finished);
    }

    #[test]
    fn test_waiting_phase_slows_down() {
        let (mut engine, t0) = engine(1000);
        run(&mut engine, t0, 50, 700);
        assert_eq!(engine.phase(), Phase::Waiting);
        let before = engine.progress();
        let tick = engine.tick(t0 + ms(750)).unwrap();
        assert!((tick.progress - before - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_started_signal_recovers_from_waiting() {
        let (mut engine, t0) = engine(1000);
        run(&mut engine, t0, 50, 750);
        assert_eq!(engine.phase(), Phase::Waiting);
        assert!(engine.progress() < 85.0);
        engine.compression_started();
        assert_eq!(engine.phase(), Phase::Smooth);

        // Past the recovery threshold the signal is ignored
        let (mut late, t0) = self::engine(1000);
        run(&mut late, t0, 50, 2500);
        assert_eq!(late.phase(), Phase::Waiting);
        assert!(late.progress() >= 85.0);
        late.compression_started();
        assert_eq!(late.phase(), Phase::Waiting);
    }

    #[test]
    fn test_fail_and_stop_are_terminal() {
        let (mut engine, t0) = engine(1000);
        engine.tick(t0 + ms(50));
        assert!(engine.fail());
        assert!(!engine.fail());
        assert!(!engine.stop());
        engine.compression_completed();
        assert!(engine.tick(t0 + ms(100)).is_none());
        assert_eq!(engine.lifecycle(), Lifecycle::Failed);

        let (mut stopped, t0) = self::engine(1000);
        assert!(stopped.stop());
        assert!(!stopped.stop());
        assert!(stopped.tick(t0 + ms(50)).is_none());
        assert!(!stopped.fail());
        assert_eq!(stopped.lifecycle(), Lifecycle::Stopped);
    }

    #[test]
    fn test_custom_phase_table() {
        let phases = PhaseTable {
            convergence_ticks: 1,
            ..PhaseTable::default()
        };
        let t0 = Instant::now();
        let mut engine = AdaptiveProgress::new(ProgressConfig::new(5000).with_phases(phases), t0);
        engine.tick(t0 + ms(50));
        engine.compression_completed();
        assert!(engine.tick(t0 + ms(100)).unwrap().finished);
    }
}
