use std::time::Duration;
use tokio::time::Instant;

/// A shrinking time budget threaded through every blocking wait that
/// participates in game timing (wait-for-connect, wait-for-genmove, generic
/// move timeouts). `None` means "no deadline" (an infinite timer).
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    target: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Deadline { target: None }
    }

    pub fn after(duration: Duration) -> Self {
        Deadline {
            target: Some(Instant::now() + duration),
        }
    }

    /// Seconds remaining, ceilinged, or `None` for an infinite deadline.
    /// A deadline already in the past yields `Some(Duration::ZERO)`.
    pub fn remaining(&self) -> Option<Duration> {
        self.target.map(|t| t.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}
