//! Watch registry - owns every continuous watch by id.
//!
//! # Locking
//!
//! The table sits behind a plain mutex that is only held for map
//! operations. A watch's gate is never acquired while the table lock is
//! held: handles are removed from the table first and deactivated after
//! the lock is released. Callbacks can therefore call back into the
//! registry (clear or replace their own watch) without deadlocking.
//!
//! # Pause / resume
//!
//! [`WatchRegistry::pause`] clears every active watch but remembers its
//! options and callback. [`WatchRegistry::resume`] registers them again
//! with exactly the same parameters. A watch cleared while paused is
//! forgotten; a watch registered again while paused becomes active right
//! away and its remembered entry is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::handle::{WatchCallback, WatchHandle, WatchInfo, WatchOptions};
use crate::provider::{PoolError, ProviderPool, SubscriptionOwner};

/// Parameters remembered across a pause.
#[derive(Clone)]
struct PausedWatch {
    options: WatchOptions,
    callback: Arc<dyn WatchCallback>,
}

#[derive(Default)]
struct RegistryState {
    handles: HashMap<String, WatchHandle>,
    paused: BTreeMap<String, PausedWatch>,
}

/// Table of continuous watches keyed by caller-chosen id.
pub struct WatchRegistry {
    pool: Arc<ProviderPool>,
    state: Mutex<RegistryState>,
}

impl WatchRegistry {
    pub fn new(pool: Arc<ProviderPool>) -> Self {
        Self {
            pool,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register (or replace) the watch `id`.
    ///
    /// An existing watch with the same id is cleared first; the returned
    /// flag reports whether that happened. Fails if no eligible provider
    /// accepted a subscription, in which case no watch is left under `id`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(
        &self,
        id: &str,
        options: WatchOptions,
        callback: Arc<dyn WatchCallback>,
    ) -> Result<bool, PoolError> {
        let evicted = {
            let mut state = self.state.lock();
            state.paused.remove(id);
            state.handles.remove(id)
        };
        let replaced = evicted.is_some();
        if let Some(old) = evicted {
            info!(watch_id = id, "Replacing existing watch");
            self.retire(old);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = self.pool.subscribe_eligible(
            &SubscriptionOwner::watch(id),
            options.update_params(),
            options.high_accuracy,
            &tx,
        )?;
        let providers = subscriptions.providers();
        let handle = WatchHandle::activate(id.to_string(), options, callback, subscriptions, rx);

        // A concurrent register for the same id may have slipped in while
        // the lock was released. Last writer wins.
        let raced = self.state.lock().handles.insert(id.to_string(), handle);
        let replaced = replaced || raced.is_some();
        if let Some(other) = raced {
            warn!(watch_id = id, "Concurrent registration replaced");
            self.retire(other);
        }

        info!(
            watch_id = id,
            providers = ?providers,
            min_interval_ms = options.min_interval.as_millis() as u64,
            min_distance_m = options.min_distance_meters,
            high_accuracy = options.high_accuracy,
            "Watch active"
        );
        Ok(replaced)
    }

    /// Clear the watch `id`.
    ///
    /// Returns false if nothing was registered or remembered under `id`.
    /// Once this returns, no new callback for the watch will start.
    pub fn clear(&self, id: &str) -> bool {
        let (handle, was_paused) = {
            let mut state = self.state.lock();
            (state.handles.remove(id), state.paused.remove(id).is_some())
        };

        match handle {
            Some(handle) => {
                self.retire(handle);
                info!(watch_id = id, "Watch cleared");
                true
            }
            None if was_paused => {
                info!(watch_id = id, "Paused watch forgotten");
                true
            }
            None => false,
        }
    }

    /// Clear every active watch, remembering its parameters for
    /// [`resume`](Self::resume). Returns the number of watches paused.
    pub fn pause(&self) -> usize {
        let drained: Vec<WatchHandle> = {
            let mut state = self.state.lock();
            let drained: Vec<WatchHandle> = state.handles.drain().map(|(_, h)| h).collect();
            for handle in &drained {
                state.paused.insert(
                    handle.id.clone(),
                    PausedWatch {
                        options: handle.options,
                        callback: Arc::clone(&handle.callback),
                    },
                );
            }
            drained
        };

        let count = drained.len();
        for handle in drained {
            self.retire(handle);
        }
        info!(count, "Watches paused");
        count
    }

    /// Re-register every watch remembered by [`pause`](Self::pause).
    ///
    /// Returns the outcome per watch id. A failed resubscription leaves no
    /// watch under that id.
    pub fn resume(&self) -> Vec<(String, Result<(), PoolError>)> {
        let paused = std::mem::take(&mut self.state.lock().paused);

        let mut outcomes = Vec::with_capacity(paused.len());
        for (id, watch) in paused {
            let outcome = self.register(&id, watch.options, watch.callback).map(|_| ());
            if let Err(e) = &outcome {
                warn!(watch_id = %id, error = %e, "Watch could not be resumed");
            }
            outcomes.push((id, outcome));
        }
        info!(count = outcomes.len(), "Watches resumed");
        outcomes
    }

    /// Clear everything and forget paused watches.
    pub fn shutdown(&self) {
        let drained: Vec<WatchHandle> = {
            let mut state = self.state.lock();
            state.paused.clear();
            state.handles.drain().map(|(_, h)| h).collect()
        };
        let count = drained.len();
        for handle in drained {
            self.retire(handle);
        }
        info!(count, "Watch registry shut down");
    }

    /// Snapshot of the watch `id`, if it is active.
    pub fn watch_info(&self, id: &str) -> Option<WatchInfo> {
        let view = self.state.lock().handles.get(id).map(WatchHandle::view)?;
        Some(view.info())
    }

    /// Whether `id` is active or remembered from a pause.
    pub fn contains(&self, id: &str) -> bool {
        let state = self.state.lock();
        state.handles.contains_key(id) || state.paused.contains_key(id)
    }

    /// Ids of active watches, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().handles.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids remembered from a pause, sorted.
    pub fn paused_ids(&self) -> Vec<String> {
        self.state.lock().paused.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retire(&self, handle: WatchHandle) {
        handle.deactivate();
        self.pool.release(&handle.subscriptions);
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WatchRegistry")
            .field("active", &state.handles.len())
            .field("paused", &state.paused.len())
            .finish()
    }
}
