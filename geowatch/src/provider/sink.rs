//! Delivery sinks handed to the platform.
//!
//! Each subscription gets two sinks that share the owner's event channel:
//!
//! - [`ReadingSink`] - position updates
//! - [`LifecycleSink`] - provider enabled/disabled notifications, also
//!   re-broadcast to pool-level listeners
//!
//! Keeping the two apart lets status reporting evolve independently of
//! reading delivery.

use tokio::sync::{broadcast, mpsc};

use super::platform::SubscriptionToken;
use crate::reading::{ProviderId, Reading};

/// Provider availability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Enabled,
    Disabled,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Lifecycle notification broadcast to pool listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub provider: ProviderId,
    pub status: ProviderStatus,
}

/// Event delivered to the owner of a subscription.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A position update.
    Reading {
        token: SubscriptionToken,
        reading: Reading,
    },
    /// The subscribed provider changed availability.
    Status {
        token: SubscriptionToken,
        provider: ProviderId,
        status: ProviderStatus,
    },
}

impl ProviderEvent {
    /// Token of the subscription that produced the event.
    pub fn token(&self) -> SubscriptionToken {
        match self {
            Self::Reading { token, .. } | Self::Status { token, .. } => *token,
        }
    }
}

/// Sink accepting readings for one subscription.
#[derive(Debug, Clone)]
pub struct ReadingSink {
    token: SubscriptionToken,
    provider: ProviderId,
    tx: mpsc::UnboundedSender<ProviderEvent>,
}

impl ReadingSink {
    pub(crate) fn new(
        token: SubscriptionToken,
        provider: ProviderId,
        tx: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Self {
        Self {
            token,
            provider,
            tx,
        }
    }

    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Push a reading towards the owner.
    ///
    /// Returns false once the owner has gone away. Platforms may keep
    /// delivering into a dead sink; those readings are dropped.
    pub fn deliver(&self, reading: Reading) -> bool {
        self.tx
            .send(ProviderEvent::Reading {
                token: self.token,
                reading,
            })
            .is_ok()
    }
}

/// Sink accepting provider status changes for one subscription.
#[derive(Debug, Clone)]
pub struct LifecycleSink {
    token: SubscriptionToken,
    provider: ProviderId,
    tx: mpsc::UnboundedSender<ProviderEvent>,
    broadcast_tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleSink {
    pub(crate) fn new(
        token: SubscriptionToken,
        provider: ProviderId,
        tx: mpsc::UnboundedSender<ProviderEvent>,
        broadcast_tx: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            token,
            provider,
            tx,
            broadcast_tx,
        }
    }

    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    pub fn provider_enabled(&self) {
        self.notify(ProviderStatus::Enabled);
    }

    pub fn provider_disabled(&self) {
        self.notify(ProviderStatus::Disabled);
    }

    fn notify(&self, status: ProviderStatus) {
        tracing::info!(
            provider = %self.provider,
            subscription = %self.token,
            %status,
            "Provider status changed"
        );

        let _ = self.tx.send(ProviderEvent::Status {
            token: self.token,
            provider: self.provider,
            status,
        });
        // No listeners is fine
        let _ = self.broadcast_tx.send(LifecycleEvent {
            provider: self.provider,
            status,
        });
    }
}

/// The pair of sinks passed to [`LocationPlatform::subscribe`](super::LocationPlatform::subscribe).
#[derive(Debug, Clone)]
pub struct SubscriptionSinks {
    pub readings: ReadingSink,
    pub lifecycle: LifecycleSink,
}

impl SubscriptionSinks {
    pub fn token(&self) -> SubscriptionToken {
        self.readings.token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinks() -> (
        SubscriptionSinks,
        mpsc::UnboundedReceiver<ProviderEvent>,
        broadcast::Receiver<LifecycleEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (btx, brx) = broadcast::channel(8);
        let token = SubscriptionToken(7);
        let sinks = SubscriptionSinks {
            readings: ReadingSink::new(token, ProviderId::Gps, tx.clone()),
            lifecycle: LifecycleSink::new(token, ProviderId::Gps, tx, btx),
        };
        (sinks, rx, brx)
    }

    #[test]
    fn test_reading_sink_tags_token() {
        let (sinks, mut rx, _brx) = sinks();
        let reading = Reading::new(ProviderId::Gps, 1.0, 2.0, 5.0, 10);

        assert!(sinks.readings.deliver(reading.clone()));

        match rx.try_recv().unwrap() {
            ProviderEvent::Reading { token, reading: r } => {
                assert_eq!(token, SubscriptionToken(7));
                assert_eq!(r, reading);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_deliver_into_dropped_owner_reports_false() {
        let (sinks, rx, _brx) = sinks();
        drop(rx);

        let reading = Reading::new(ProviderId::Gps, 1.0, 2.0, 5.0, 10);
        assert!(!sinks.readings.deliver(reading));
    }

    #[test]
    fn test_lifecycle_sink_notifies_owner_and_listeners() {
        let (sinks, mut rx, mut brx) = sinks();

        sinks.lifecycle.provider_disabled();

        match rx.try_recv().unwrap() {
            ProviderEvent::Status {
                provider, status, ..
            } => {
                assert_eq!(provider, ProviderId::Gps);
                assert_eq!(status, ProviderStatus::Disabled);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let event = brx.try_recv().unwrap();
        assert_eq!(event.status, ProviderStatus::Disabled);
    }
}
