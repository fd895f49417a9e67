//! The background sampler and its accessor.
//!
//! A sampler opens its counter once, then every [`SAMPLING_PERIOD`] reads the
//! queue depth, folds it into the 1/5/15 minute averages and publishes the
//! result to a shared state store that any number of readers
//! can copy from.

pub mod averager;
pub mod config;
pub(crate) mod store;

pub use averager::{LoadAverager, RunState};
pub use config::SamplerConfig;

use crate::error::{LoadError, Result};
use crate::metrics::data::LoadSnapshot;
use crate::metrics::smoothing::{DecayFactors, Smoother};
use crate::metrics::traits::{CounterSource, QueueCounter, UtilizationSource};
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use store::StateStore;
use tokio::runtime::{self, Handle};
use tokio::task;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time between two counter reads.
pub const SAMPLING_PERIOD: Duration = Duration::from_secs(5);

/// Per-tick state of an opened sampler.
pub struct Sampler<Q, U> {
    counter: Q,
    fallback: U,
    smoother: Smoother,
    zero_bootstrap: bool,
}

impl<Q: QueueCounter, U: UtilizationSource> Sampler<Q, U> {
    pub fn new(counter: Q, fallback: U, config: &SamplerConfig) -> Self {
        Self {
            counter,
            fallback,
            smoother: Smoother::new(DecayFactors::for_period(SAMPLING_PERIOD)),
            zero_bootstrap: config.zero_bootstrap,
        }
    }

    pub fn current(&self) -> LoadSnapshot {
        self.smoother.current()
    }

    /// Take one sample and fold it into the averages.
    ///
    /// On a read failure the averages are left untouched and the error is
    /// returned for publishing.
    pub fn tick(&mut self) -> Result<LoadSnapshot> {
        let mut sample = self.counter.read()?;

        if sample == 0.0 && self.zero_bootstrap {
            match self.fallback.utilization() {
                Ok(fraction) => {
                    debug!(fraction, "queue empty, bootstrapping from CPU utilization");
                    self.smoother.bootstrap(fraction);
                    sample = fraction;
                }
                Err(err) => debug!("no utilization fallback this tick: {}", err),
            }
        }

        self.smoother.update(sample);
        Ok(self.smoother.current())
    }

    /// Tick once per sampling period until `cancel` fires.
    ///
    /// Counter and fallback reads run on the blocking pool so a slow source
    /// never stalls the runtime the sampler lives on. A panicking source ends
    /// the loop; the stop guard then reports it.
    async fn run(mut self, store: &StateStore, cancel: &CancellationToken) {
        let mut ticker = time::interval(SAMPLING_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (sampler, outcome) = match task::spawn_blocking(move || {
                let outcome = self.tick();
                (self, outcome)
            })
            .await
            {
                Ok(ticked) => ticked,
                Err(err) => {
                    error!("Load sampler tick failed: {}", err);
                    return;
                }
            };
            self = sampler;

            let error = match outcome {
                Ok(load) => {
                    debug!(load1 = load.load1, load5 = load.load5, load15 = load.load15, "load sampled");
                    None
                }
                Err(err) if err.is_transient() => {
                    warn!("Failed to sample processor queue length: {}", err);
                    Some(err)
                }
                Err(err) => {
                    error!("Unexpected processor queue length error: {}", err);
                    Some(err)
                }
            };
            store.publish(self.current(), error);
        }
    }
}

/// Marks the store halted when the sampler task goes away.
///
/// The guard is moved into the task before it is first polled, so it also
/// fires when the task is dropped unpolled, e.g. because the runtime it was
/// spawned on shut down. Any exit other than cancellation is published as a
/// [`LoadError::Stopped`] next to the last snapshot.
struct StopGuard {
    store: Arc<StateStore>,
    cancelled: bool,
}

impl StopGuard {
    fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            cancelled: false,
        }
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        if !self.cancelled {
            let last = self.store.reading().value;
            warn!("load sampler stopped before it was cancelled");
            self.store
                .publish(last, Some(LoadError::stopped_error("sampler task ended unexpectedly")));
        }
        self.store.halt();
    }
}

async fn run_until_cancelled<Q, U>(
    sampler: Sampler<Q, U>,
    mut guard: StopGuard,
    cancel: CancellationToken,
) where
    Q: QueueCounter,
    U: UtilizationSource,
{
    info!(period = ?SAMPLING_PERIOD, "load sampler started");
    sampler.run(&guard.store, &cancel).await;
    guard.cancelled = cancel.is_cancelled();
    info!("load sampler stopped");
}

/// Open the counter and start the sampler task for `store`.
///
/// The open happens on the calling thread, so a counter that cannot be
/// opened is published as the permanent error before the first accessor
/// call returns; the store then keeps its zero snapshot and no task runs.
///
/// The task runs on the ambient Tokio runtime when there is one and the
/// config does not ask for a dedicated thread. Otherwise a named thread
/// drives it on a current-thread runtime. Failures to start are published
/// to the store rather than returned.
pub(crate) fn start<C, U>(
    source: C,
    fallback: U,
    config: &SamplerConfig,
    store: Arc<StateStore>,
    cancel: CancellationToken,
) where
    C: CounterSource,
    U: UtilizationSource,
{
    let counter = match source.open() {
        Ok(counter) => counter,
        Err(err) => {
            error!("Unexpected processor queue length counter error: {}", err);
            store.publish(LoadSnapshot::ZERO, Some(err));
            store.halt();
            return;
        }
    };

    let sampler = Sampler::new(counter, fallback, config);
    let task = run_until_cancelled(sampler, StopGuard::new(Arc::clone(&store)), cancel);

    if !config.dedicated_thread {
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(task);
            return;
        }
    }

    if let Err(err) = spawn_dedicated(config.thread_name.clone(), Arc::clone(&store), task) {
        error!("Failed to start load sampler thread: {}", err);
        store.publish(LoadSnapshot::ZERO, Some(err));
        store.halt();
    }
}

fn spawn_dedicated<F>(name: String, store: Arc<StateStore>, task: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            match runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt.block_on(task),
                Err(err) => {
                    error!("Failed to build load sampler runtime: {}", err);
                    drop(task);
                    store.publish(LoadSnapshot::ZERO, Some(LoadError::spawn_error(err.to_string())));
                    store.halt();
                }
            }
        })
        .map(|_| ())
        .map_err(|e| LoadError::spawn_error(e.to_string()))
}
