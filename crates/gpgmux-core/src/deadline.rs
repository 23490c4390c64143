//! Session deadline

use std::time::Duration;

use tokio::time::Instant;

use crate::error::Error;

/// Absolute instant after which a session must stop waiting.
///
/// Computed once when a session starts and shared read-only by the
/// multiplexer and the final process wait.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// The absolute instant
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left, `None` once the deadline has passed
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.at.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// The timeout error reported for this deadline
    pub fn timeout_error(&self) -> Error {
        Error::Timeout(self.budget)
    }
}
