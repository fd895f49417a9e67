//! Load data structures, smoothing math and metric sources.
//!
//! This module provides everything the sampler consumes: the snapshot types
//! handed to callers, the exponential smoothing that turns queue depth samples
//! into load averages, the source traits and their default system
//! implementations.

pub mod data;
pub mod smoothing;
pub mod sources;
pub mod traits;

// Re-export commonly used items
pub use data::{LoadSnapshot, MiscStat, Reading};
pub use smoothing::{DecayFactors, Smoother};
pub use sources::{NoFallback, ProcStatCounterSource, SysinfoUtilization};
pub use traits::{CounterSource, QueueCounter, UtilizationSource};
