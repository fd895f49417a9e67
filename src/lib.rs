//! # Sampled Load - Load Averages by Sampling
//!
//! Approximates the Unix 1, 5 and 15 minute load averages on systems that do
//! not expose them, by sampling the processor run queue length every five
//! seconds and smoothing it with exponential decay.
//!
//! ## Features
//!
//! - **Lazy background sampler**: started by the first call, exactly once
//! - **Consistent snapshots**: readers never see a half-updated triple
//! - **Errors next to values**: a failed source degrades the reading, it never panics
//! - **Pluggable sources**: bring your own queue counter and utilization source
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Process-wide sampler over the default system sources
//!     let reading = sampled_load::avg();
//!     println!("load average: {}", reading.value);
//!
//!     // Or own a sampler and wait for its first tick
//!     let averager = sampled_load::LoadAverager::new(
//!         sampled_load::ProcStatCounterSource::default(),
//!         sampled_load::SysinfoUtilization::new(),
//!     );
//!     let load = averager.next_avg(&CancellationToken::new()).await?.into_result()?;
//!     println!("{:.2} {:.2} {:.2}", load.load1, load.load5, load.load15);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metrics;
pub mod sampler;

// Re-export public API
pub use error::{LoadError, Result};
pub use metrics::{
    data::{LoadSnapshot, MiscStat, Reading},
    smoothing::{DecayFactors, Smoother},
    sources::{NoFallback, ProcStatCounterSource, SysinfoUtilization},
    traits::{CounterSource, QueueCounter, UtilizationSource},
};
pub use sampler::{LoadAverager, RunState, SamplerConfig, SAMPLING_PERIOD};

/// Averager over the default system sources.
pub type SystemLoadAverager = LoadAverager<ProcStatCounterSource, SysinfoUtilization>;

lazy_static::lazy_static! {
    static ref SYSTEM: SystemLoadAverager = LoadAverager::on_dedicated_thread(
        ProcStatCounterSource::default(),
        SysinfoUtilization::new(),
    );
}

/// Process-wide load averages.
///
/// The first call starts a sampler on its own thread that runs until the
/// process exits. See [`LoadAverager::avg`].
pub fn avg() -> Reading<LoadSnapshot> {
    SYSTEM.avg()
}

/// Process-wide extended load statistics; always [`LoadError::NotImplemented`].
pub fn misc() -> Reading<MiscStat> {
    SYSTEM.misc()
}
