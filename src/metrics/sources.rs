//! Default system sources for the sampler.
//!
//! The queue depth comes from the `procs_running` line of `/proc/stat`; the
//! utilization fallback comes from `sysinfo`. Platforms without `/proc/stat`
//! fail to open the counter, which leaves the sampler in its degraded mode.

use crate::error::{LoadError, Result};
use crate::metrics::traits::{CounterSource, QueueCounter, UtilizationSource};
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Default location of the kernel statistics file.
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Opens a [`ProcStatCounter`] on a kernel statistics file.
#[derive(Debug, Clone)]
pub struct ProcStatCounterSource {
    path: PathBuf,
}

/// Reads runnable thread counts from a kernel statistics file.
#[derive(Debug, Clone)]
pub struct ProcStatCounter {
    path: PathBuf,
}

impl ProcStatCounterSource {
    /// Read from a file other than `/proc/stat`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ProcStatCounterSource {
    fn default() -> Self {
        Self::with_path(PROC_STAT_PATH)
    }
}

impl CounterSource for ProcStatCounterSource {
    type Counter = ProcStatCounter;

    fn open(self) -> Result<ProcStatCounter> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            LoadError::source_init_error(format!("{}: {}", self.path.display(), e))
        })?;
        parse_procs_running(&contents)
            .map_err(|e| LoadError::source_init_error(format!("{}: {}", self.path.display(), e)))?;

        Ok(ProcStatCounter { path: self.path })
    }
}

impl QueueCounter for ProcStatCounter {
    fn read(&mut self) -> Result<f64> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            LoadError::source_read_error(format!("{}: {}", self.path.display(), e))
        })?;
        let running = parse_procs_running(&contents)
            .map_err(|e| LoadError::source_read_error(e.to_string()))?;

        // The sampling thread is itself running while it reads.
        Ok(running.saturating_sub(1) as f64)
    }
}

/// Extract the `procs_running` count from `/proc/stat` contents.
pub fn parse_procs_running(contents: &str) -> Result<u64> {
    let line = contents
        .lines()
        .find(|line| line.starts_with("procs_running"))
        .ok_or_else(|| LoadError::parse_error("missing procs_running line"))?;

    let value = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| LoadError::parse_error("procs_running has no value"))?;

    value
        .parse::<u64>()
        .map_err(|e| LoadError::parse_error(format!("invalid procs_running value {:?}: {}", value, e)))
}

/// CPU utilization averaged across all cores, via `sysinfo`.
pub struct SysinfoUtilization {
    system: System,
}

impl SysinfoUtilization {
    /// Create the source and take the baseline measurement.
    ///
    /// `sysinfo` reports usage relative to the previous refresh, so the very
    /// first reading after this may still be zero.
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for SysinfoUtilization {
    fn default() -> Self {
        Self::new()
    }
}

impl UtilizationSource for SysinfoUtilization {
    fn utilization(&mut self) -> Result<f64> {
        self.system.refresh_cpu_usage();
        let cpus = self.system.cpus();

        if cpus.is_empty() {
            return Err(LoadError::fallback_error("No CPU information available"));
        }

        let usage_percent = cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32;
        Ok((f64::from(usage_percent) / 100.0).clamp(0.0, 1.0))
    }
}

/// A fallback that is never available; zero readings stay zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl UtilizationSource for NoFallback {
    fn utilization(&mut self) -> Result<f64> {
        Err(LoadError::NotImplemented)
    }
}
