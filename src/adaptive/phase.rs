//! # Phase Table
//!
//! Fasi dell'animazione e loro parametri configurabili.
//!
//! | Fase        | Banda       | Velocità |
//! |-------------|-------------|----------|
//! | `Smooth`    | [0, 70)     | ×1.0     |
//! | `Waiting`   | [70, 90)    | ×0.3     |
//! | `Final`     | [90, 100]   | ×3.0     |
//! | `Completed` | {100}       | ×0       |
//!
//! I confini e le velocità sono valori empirici: vanno trattati come
//! configurazione, non come semantica.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default animation cadence
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Named sub-range of the progress curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Smooth,
    Waiting,
    Final,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Smooth => "smooth",
            Self::Waiting => "waiting",
            Self::Final => "final",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Percent band and speed multiplier of one phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub start: f64,
    pub end: f64,
    pub speed: f64,
}

impl PhaseSpec {
    pub const fn new(start: f64, end: f64, speed: f64) -> Self {
        Self { start, end, speed }
    }
}

/// Tunable shape of the progress curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTable {
    pub smooth: PhaseSpec,
    pub waiting: PhaseSpec,
    pub finishing: PhaseSpec,
    /// Forced advance when the curve would otherwise stall
    pub min_step: f64,
    /// `compression_started()` reverts waiting to smooth below this percent
    pub recovery_threshold: f64,
    /// Ticks needed to reach 100 once completion is signaled
    pub convergence_ticks: u32,
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self {
            smooth: PhaseSpec::new(0.0, 70.0, 1.0),
            waiting: PhaseSpec::new(70.0, 90.0, 0.3),
            finishing: PhaseSpec::new(90.0, 100.0, 3.0),
            min_step: 0.5,
            recovery_threshold: 85.0,
            convergence_ticks: 2,
        }
    }
}

impl PhaseTable {
    const COMPLETED: PhaseSpec = PhaseSpec::new(100.0, 100.0, 0.0);

    pub fn spec(&self, phase: Phase) -> PhaseSpec {
        match phase {
            Phase::Smooth => self.smooth,
            Phase::Waiting => self.waiting,
            Phase::Final => self.finishing,
            Phase::Completed => Self::COMPLETED,
        }
    }

    /// Phase for a progress value (before any completion override)
    pub fn phase_for(&self, progress: f64, completion_signaled: bool) -> Phase {
        if progress < self.waiting.start {
            Phase::Smooth
        } else if progress < self.finishing.start && !completion_signaled {
            Phase::Waiting
        } else {
            Phase::Final
        }
    }

    /// Check bands are contiguous, ordered and reach 100
    pub fn validate(&self) -> Result<(), String> {
        let bands = [("smooth", self.smooth), ("waiting", self.waiting), ("final", self.finishing)];

        for (name, spec) in &bands {
            if !(spec.start < spec.end) {
                return Err(format!("{} phase must have start < end", name));
            }
            if !(spec.speed > 0.0) || !spec.speed.is_finite() {
                return Err(format!("{} phase speed must be positive", name));
            }
        }

        if self.smooth.start != 0.0 || self.finishing.end != 100.0 {
            return Err("phases must cover 0 to 100".to_string());
        }
        if self.smooth.end != self.waiting.start || self.waiting.end != self.finishing.start {
            return Err("phase bands must be contiguous".to_string());
        }
        if !(self.min_step > 0.0) {
            return Err("min_step must be positive".to_string());
        }
        if self.convergence_ticks == 0 {
            return Err("convergence_ticks must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Per-item animation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressConfig {
    pub estimated_duration_ms: u64,
    pub tick_interval_ms: u64,
    pub phases: PhaseTable,
}

impl ProgressConfig {
    pub fn new(estimated_duration_ms: u64) -> Self {
        Self {
            estimated_duration_ms,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            phases: PhaseTable::default(),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval_ms: u64) -> Self {
        self.tick_interval_ms = tick_interval_ms;
        self
    }

    pub fn with_phases(mut self, phases: PhaseTable) -> Self {
        self.phases = phases;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
