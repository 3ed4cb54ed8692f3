//! Per-watch state and the delivery task.
//!
//! Every watch owns a *gate*: a re-entrant lock around its phase and
//! active-provider set, plus a `cleared` flag readable without the lock.
//! The delivery task holds the gate while it invokes the callback and
//! checks the flag before every delivery.
//!
//! Clearing sets the flag, cancels the delivery task and then takes the
//! gate, so once a clear has returned no callback for that watch can start.
//! The one exception is a clear issued from inside another watch's
//! callback: that thread already holds a gate, so it never waits on a
//! second one. The flag still stops further deliveries, but a callback that
//! was already running elsewhere may finish after the clear returns.
//!
//! The gate is re-entrant so a callback may clear or replace its own watch.
//! No `RefCell` borrow is outstanding while the callback runs.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::provider::{ProviderEvent, ProviderStatus, SubscriptionSet, UpdateParams};
use crate::reading::{ProviderId, Reading};

/// Default minimum time between watch updates.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(10);

/// Default minimum movement between watch updates.
pub const DEFAULT_WATCH_DISTANCE_METERS: f64 = 10.0;

/// Parameters of a continuous watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub min_interval: Duration,
    pub min_distance_meters: f64,
    /// Restrict the watch to GPS.
    pub high_accuracy: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_WATCH_INTERVAL,
            min_distance_meters: DEFAULT_WATCH_DISTANCE_METERS,
            high_accuracy: true,
        }
    }
}

impl WatchOptions {
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_min_distance(mut self, meters: f64) -> Self {
        self.min_distance_meters = meters;
        self
    }

    pub fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    pub fn update_params(&self) -> UpdateParams {
        UpdateParams::new(self.min_interval, self.min_distance_meters)
    }
}

/// Receives every reading streamed by a watch.
///
/// Implemented for any `Fn(&Reading) + Send + Sync` closure.
pub trait WatchCallback: Send + Sync {
    fn on_reading(&self, reading: &Reading);
}

impl<F> WatchCallback for F
where
    F: Fn(&Reading) + Send + Sync,
{
    fn on_reading(&self, reading: &Reading) {
        self(reading)
    }
}

/// Lifecycle phase of a watch.
///
/// `Created -> Active -> Cleared`; `Cleared` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Created,
    Active,
    Cleared,
}

/// Snapshot of a registered watch.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchInfo {
    pub id: String,
    pub phase: WatchPhase,
    pub active_providers: BTreeSet<ProviderId>,
    pub options: WatchOptions,
    pub created_at: DateTime<Utc>,
}

struct GateState {
    phase: WatchPhase,
    active_providers: BTreeSet<ProviderId>,
}

struct Gate {
    state: ReentrantMutex<RefCell<GateState>>,
    cleared: AtomicBool,
}

impl Gate {
    fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(GateState {
                phase: WatchPhase::Created,
                active_providers: BTreeSet::new(),
            })),
            cleared: AtomicBool::new(false),
        }
    }

    fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::Acquire)
    }

    fn address(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

thread_local! {
    /// Address of the gate whose callback is running on this thread, 0 if none.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running a callback under `gate`.
struct Delivering {
    previous: usize,
}

impl Delivering {
    fn enter(gate: &Arc<Gate>) -> Self {
        let previous = DELIVERING.with(|d| d.replace(gate.address()));
        Self { previous }
    }

    /// Whether this thread is inside the callback of a gate other than `gate`.
    fn inside_other(gate: &Arc<Gate>) -> bool {
        let current = DELIVERING.with(Cell::get);
        current != 0 && current != gate.address()
    }
}

impl Drop for Delivering {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.previous));
    }
}

/// A registered watch as held by the registry table.
pub(crate) struct WatchHandle {
    pub(crate) id: String,
    pub(crate) options: WatchOptions,
    pub(crate) callback: Arc<dyn WatchCallback>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) subscriptions: SubscriptionSet,
    gate: Arc<Gate>,
    cancel: CancellationToken,
}

impl WatchHandle {
    /// Activate a watch over `subscriptions` and spawn its delivery task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn activate(
        id: String,
        options: WatchOptions,
        callback: Arc<dyn WatchCallback>,
        subscriptions: SubscriptionSet,
        rx: mpsc::UnboundedReceiver<ProviderEvent>,
    ) -> Self {
        let gate = Arc::new(Gate::new());
        {
            let guard = gate.state.lock();
            let mut state = guard.borrow_mut();
            state.active_providers = subscriptions.providers();
            state.phase = WatchPhase::Active;
        }

        let cancel = CancellationToken::new();
        tokio::spawn(delivery_loop(
            id.clone(),
            rx,
            Arc::clone(&gate),
            Arc::clone(&callback),
            cancel.clone(),
        ));

        Self {
            id,
            options,
            callback,
            created_at: Utc::now(),
            subscriptions,
            gate,
            cancel,
        }
    }

    /// Flip the watch to `Cleared` and stop its delivery task.
    ///
    /// Blocks until any callback currently running on another thread has
    /// returned, unless called from inside a different watch's callback.
    /// The caller releases the subscriptions.
    pub(crate) fn deactivate(&self) {
        self.gate.cleared.store(true, Ordering::Release);
        self.cancel.cancel();

        if Delivering::inside_other(&self.gate) {
            debug!(watch_id = %self.id, "Cleared from another watch's callback");
            return;
        }
        let guard = self.gate.state.lock();
        guard.borrow_mut().phase = WatchPhase::Cleared;
    }

    /// Detached view for reading the gate outside the registry lock.
    pub(crate) fn view(&self) -> WatchView {
        WatchView {
            id: self.id.clone(),
            options: self.options,
            created_at: self.created_at,
            gate: Arc::clone(&self.gate),
        }
    }
}

/// Registry-lock-free handle used to build a [`WatchInfo`].
pub(crate) struct WatchView {
    id: String,
    options: WatchOptions,
    created_at: DateTime<Utc>,
    gate: Arc<Gate>,
}

impl WatchView {
    pub(crate) fn info(self) -> WatchInfo {
        let guard = self.gate.state.lock();
        let state = guard.borrow();
        let phase = if self.gate.is_cleared() {
            WatchPhase::Cleared
        } else {
            state.phase
        };
        WatchInfo {
            id: self.id,
            phase,
            active_providers: state.active_providers.clone(),
            options: self.options,
            created_at: self.created_at,
        }
    }
}

async fn delivery_loop(
    id: String,
    mut rx: mpsc::UnboundedReceiver<ProviderEvent>,
    gate: Arc<Gate>,
    callback: Arc<dyn WatchCallback>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let guard = gate.state.lock();
        if gate.is_cleared() || guard.borrow().phase != WatchPhase::Active {
            break;
        }

        match event {
            ProviderEvent::Reading { reading, .. } => {
                trace!(watch_id = %id, provider = %reading.source(), "Delivering reading");
                let _delivering = Delivering::enter(&gate);
                callback.on_reading(&reading);
            }
            ProviderEvent::Status {
                provider, status, ..
            } => {
                let mut state = guard.borrow_mut();
                match status {
                    ProviderStatus::Disabled => {
                        state.active_providers.remove(&provider);
                    }
                    ProviderStatus::Enabled => {
                        state.active_providers.insert(provider);
                    }
                }
                info!(
                    watch_id = %id,
                    %provider,
                    %status,
                    active = ?state.active_providers,
                    "Watch provider set changed"
                );
            }
        }
    }

    debug!(watch_id = %id, "Delivery task stopped");
}
