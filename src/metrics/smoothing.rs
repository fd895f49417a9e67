//! Exponential smoothing of queue depth samples into load averages.
//!
//! Each window keeps an exponentially weighted moving average updated once
//! per sampling period. The decay factor for a window `w` sampled every `p`
//! is `exp(-p / w)`, which keeps the half-life of each window independent of
//! the chosen period.

use crate::metrics::data::LoadSnapshot;
use std::time::Duration;

/// Length of the one minute window.
pub const ONE_MINUTE: Duration = Duration::from_secs(60);
/// Length of the five minute window.
pub const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
/// Length of the fifteen minute window.
pub const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// Per-window decay factors, each in `(0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayFactors {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

impl DecayFactors {
    /// Derive the factors for samples taken every `period`.
    pub fn for_period(period: Duration) -> Self {
        Self {
            one: decay(period, ONE_MINUTE),
            five: decay(period, FIVE_MINUTES),
            fifteen: decay(period, FIFTEEN_MINUTES),
        }
    }
}

fn decay(period: Duration, window: Duration) -> f64 {
    (-period.as_secs_f64() / window.as_secs_f64()).exp()
}

/// Running 1/5/15 minute averages.
#[derive(Debug, Clone)]
pub struct Smoother {
    factors: DecayFactors,
    current: LoadSnapshot,
}

impl Smoother {
    /// Start from an all-zero snapshot.
    pub fn new(factors: DecayFactors) -> Self {
        Self {
            factors,
            current: LoadSnapshot::ZERO,
        }
    }

    pub fn factors(&self) -> &DecayFactors {
        &self.factors
    }

    pub fn current(&self) -> LoadSnapshot {
        self.current
    }

    /// Seed windows that are still exactly zero from a utilization fraction.
    ///
    /// The one minute window takes `fraction`, the five minute window half of
    /// it and the fifteen minute window a third. Windows that already moved
    /// away from zero are left untouched, so each window is seeded at most
    /// once.
    pub fn bootstrap(&mut self, fraction: f64) {
        if self.current.load1 == 0.0 {
            self.current.load1 = fraction;
        }
        if self.current.load5 == 0.0 {
            self.current.load5 = fraction / 2.0;
        }
        if self.current.load15 == 0.0 {
            self.current.load15 = fraction / 3.0;
        }
    }

    /// Fold one sample into every window.
    pub fn update(&mut self, sample: f64) {
        let f = &self.factors;
        self.current = LoadSnapshot {
            load1: blend(self.current.load1, sample, f.one),
            load5: blend(self.current.load5, sample, f.five),
            load15: blend(self.current.load15, sample, f.fifteen),
        };
    }
}

fn blend(average: f64, sample: f64, factor: f64) -> f64 {
    average * factor + sample * (1.0 - factor)
}
