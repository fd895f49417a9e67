//! Lazily started load average accessor.

use crate::error::{LoadError, Result};
use crate::metrics::data::{LoadSnapshot, MiscStat, Reading};
use crate::metrics::traits::{CounterSource, UtilizationSource};
use crate::sampler::config::SamplerConfig;
use crate::sampler::store::StateStore;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

/// Whether a sampler has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
}

/// Load averages backed by a background sampler.
///
/// The sampler is started by the first accessor call, exactly once even when
/// several threads race on that first call. Every call afterwards copies the
/// most recently published snapshot without waiting for a new sample.
///
/// Dropping the averager stops its sampler.
pub struct LoadAverager<C, U> {
    sources: Mutex<Option<(C, U)>>,
    started: AtomicBool,
    ready: AtomicBool,
    config: SamplerConfig,
    store: Arc<StateStore>,
    cancel: CancellationToken,
}

impl<C, U> LoadAverager<C, U>
where
    C: CounterSource,
    U: UtilizationSource,
{
    /// Create an averager with the default configuration.
    pub fn new(counter: C, fallback: U) -> Self {
        Self::build(counter, fallback, SamplerConfig::default())
    }

    /// Create an averager whose sampler runs on its own thread.
    ///
    /// The sampler then outlives the runtime of whoever calls first.
    pub fn on_dedicated_thread(counter: C, fallback: U) -> Self {
        Self::build(
            counter,
            fallback,
            SamplerConfig::default().with_dedicated_thread(true),
        )
    }

    /// Create an averager with a custom configuration.
    pub fn with_config(counter: C, fallback: U, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(counter, fallback, config))
    }

    fn build(counter: C, fallback: U, config: SamplerConfig) -> Self {
        Self {
            sources: Mutex::new(Some((counter, fallback))),
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            config,
            store: Arc::new(StateStore::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn run_state(&self) -> RunState {
        if self.started.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::NotStarted
        }
    }

    /// Current 1/5/15 minute load averages.
    ///
    /// Returns `{0, 0, 0}` until the first tick has been published. The
    /// attached error is the last one the sampler saw: a permanent
    /// [`LoadError::SourceInit`] or the transient error of the latest tick.
    pub fn avg(&self) -> Reading<LoadSnapshot> {
        self.ensure_started();
        self.store.reading()
    }

    /// Wait for the next published tick and return it.
    ///
    /// Returns right away with the current reading once the sampler has
    /// stopped, and with [`LoadError::Cancelled`] if `cancel` fires first.
    pub async fn next_avg(&self, cancel: &CancellationToken) -> Result<Reading<LoadSnapshot>> {
        let mut updates = self.store.subscribe();
        self.ensure_started();

        if !self.store.is_halted() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(LoadError::Cancelled),
                _ = updates.changed() => {}
            }
        }

        Ok(self.store.reading())
    }

    /// Stream of readings, one per published tick.
    ///
    /// The stream ends when the averager is dropped.
    pub fn watch(&self) -> BoxStream<'static, Reading<LoadSnapshot>> {
        let updates = self.store.subscribe();
        self.ensure_started();

        let store = Arc::clone(&self.store);
        WatchStream::from_changes(updates)
            .map(move |_| store.reading())
            .boxed()
    }

    /// Extended load statistics; not available on this platform.
    pub fn misc(&self) -> Reading<MiscStat> {
        Reading::with_error(MiscStat::default(), LoadError::NotImplemented)
    }

    /// Stop the sampler. The last published reading stays available.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Start the sampler on the first call.
    ///
    /// The compare-and-set runs under the sources lock, so callers racing
    /// the first call return only once the counter has been opened and any
    /// open failure is already visible in the store.
    fn ensure_started(&self) {
        if self.ready.load(Ordering::Acquire) {
            return;
        }

        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Some((counter, fallback)) = sources.take() {
                super::start(
                    counter,
                    fallback,
                    &self.config,
                    Arc::clone(&self.store),
                    self.cancel.clone(),
                );
            }
            self.ready.store(true, Ordering::Release);
        }
    }
}

impl<C, U> Drop for LoadAverager<C, U> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
