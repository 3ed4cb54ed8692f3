//! A one-shot request waiting for its first reading.

use tokio::time::{Duration, Instant};

/// In-flight one-shot request.
///
/// Resolution is decided exactly once: whichever of [`accept`] or
/// [`expire`] is called first wins and the other becomes a no-op.
///
/// [`accept`]: PendingRequest::accept
/// [`expire`]: PendingRequest::expire
#[derive(Debug)]
pub(crate) struct PendingRequest {
    id: String,
    deadline: Instant,
    resolved: bool,
}

impl PendingRequest {
    pub(crate) fn new(id: String, timeout: Duration) -> Self {
        Self {
            id,
            deadline: Instant::now() + timeout,
            resolved: false,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Claim resolution for a reading that arrived at `now`.
    ///
    /// Fails once resolved or when `now` is at or past the deadline.
    pub(crate) fn accept(&mut self, now: Instant) -> bool {
        if self.resolved || now >= self.deadline {
            return false;
        }
        self.resolved = true;
        true
    }

    /// Claim resolution for the deadline.
    pub(crate) fn expire(&mut self) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_accept_before_deadline() {
        let mut pending = PendingRequest::new("request-1".into(), Duration::from_secs(10));
        let just_before = pending.deadline() - Duration::from_millis(1);

        assert!(pending.accept(just_before));
        assert!(!pending.expire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_at_deadline_is_refused() {
        let mut pending = PendingRequest::new("request-1".into(), Duration::from_secs(10));

        assert!(!pending.accept(pending.deadline()));
        assert!(pending.expire());
        assert!(!pending.accept(pending.deadline() - Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_accept_refused() {
        let mut pending = PendingRequest::new("request-1".into(), Duration::from_secs(10));
        let now = Instant::now();

        assert!(pending.accept(now));
        assert!(!pending.accept(now));
        assert_eq!(pending.id(), "request-1");
    }
}
