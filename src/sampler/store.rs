//! Shared state between the sampler and its readers.

use crate::error::LoadError;
use crate::metrics::data::{LoadSnapshot, Reading};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

/// Latest published snapshot and error.
///
/// The sampler is the only writer. Each publish replaces both values under a
/// single write lock, so a reader sees either the whole previous tick or the
/// whole new one.
#[derive(Debug)]
pub(crate) struct StateStore {
    state: RwLock<Published>,
    generation: watch::Sender<u64>,
    halted: AtomicBool,
}

#[derive(Debug, Clone)]
struct Published {
    load: LoadSnapshot,
    error: Option<LoadError>,
}

impl StateStore {
    pub(crate) fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            state: RwLock::new(Published {
                load: LoadSnapshot::ZERO,
                error: None,
            }),
            generation,
            halted: AtomicBool::new(false),
        }
    }

    /// Copy of the current snapshot and error.
    pub(crate) fn reading(&self) -> Reading<LoadSnapshot> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Reading {
            value: state.load,
            error: state.error.clone(),
        }
    }

    /// Replace the snapshot and error, then wake anyone waiting for a tick.
    pub(crate) fn publish(&self, load: LoadSnapshot, error: Option<LoadError>) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.load = load;
            state.error = error;
        }
        self.generation.send_modify(|generation| *generation += 1);
    }

    /// Record that no further publishes will happen.
    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.generation.send_modify(|generation| *generation += 1);
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Receiver that observes every publish made after this call.
    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        *self.generation.borrow()
    }
}
