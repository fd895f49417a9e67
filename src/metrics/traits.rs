//! Traits for the external metric sources the sampler consumes.

use crate::error::Result;

/// Something that can be opened into a [`QueueCounter`].
///
/// Opening happens once, on the thread of the first accessor call, so it
/// should be quick. A failure here is permanent: the sampler records it and
/// never starts.
pub trait CounterSource: Send + 'static {
    /// The counter produced by a successful open.
    type Counter: QueueCounter;

    /// Acquire the counter handle.
    fn open(self) -> Result<Self::Counter>;
}

/// An opened queue depth counter.
pub trait QueueCounter: Send + 'static {
    /// Read the instantaneous number of threads waiting for a CPU.
    ///
    /// Called from Tokio's blocking pool. Failures are treated as transient;
    /// the sampler tries again next tick.
    fn read(&mut self) -> Result<f64>;
}

/// Instantaneous CPU utilization, used to bootstrap an all-zero signal.
pub trait UtilizationSource: Send + 'static {
    /// Current utilization as a fraction in `[0, 1]`.
    fn utilization(&mut self) -> Result<f64>;
}
