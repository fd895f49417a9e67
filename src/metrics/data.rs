//! Data structures handed out by the accessors.

use crate::error::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smoothed load averages over the 1, 5 and 15 minute windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// One minute average
    pub load1: f64,
    /// Five minute average
    pub load5: f64,
    /// Fifteen minute average
    pub load15: f64,
}

/// Extended load statistics.
///
/// No platform served by this crate provides these, so the accessors always
/// return the zero value together with [`LoadError::NotImplemented`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiscStat {
    /// Total number of processes
    pub procs_total: u64,
    /// Processes created since boot
    pub procs_created: u64,
    /// Processes currently runnable
    pub procs_running: u64,
    /// Processes blocked on I/O
    pub procs_blocked: u64,
    /// Context switches since boot
    pub ctxt: u64,
}

/// A value together with the most recent error observed while producing it.
///
/// The value is always usable; the error tells the caller whether it is
/// stale (transient read failure) or frozen (permanent source failure).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    /// Best-effort value
    pub value: T,
    /// Most recent error, if any
    pub error: Option<LoadError>,
}

impl LoadSnapshot {
    /// Snapshot with every window at zero.
    pub const ZERO: LoadSnapshot = LoadSnapshot {
        load1: 0.0,
        load5: 0.0,
        load15: 0.0,
    };

    /// Create a snapshot from explicit window values.
    pub fn new(load1: f64, load5: f64, load15: f64) -> Self {
        Self {
            load1,
            load5,
            load15,
        }
    }
}

impl Default for LoadSnapshot {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for LoadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {:.2} {:.2}", self.load1, self.load5, self.load15)
    }
}

impl Default for MiscStat {
    fn default() -> Self {
        Self {
            procs_total: 0,
            procs_created: 0,
            procs_running: 0,
            procs_blocked: 0,
            ctxt: 0,
        }
    }
}

impl<T> Reading<T> {
    /// A reading with no error attached.
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    /// A reading carrying `error` next to its best-effort value.
    pub fn with_error(value: T, error: LoadError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }

    /// Whether the reading carries no error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Discard the value if an error is attached.
    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}
