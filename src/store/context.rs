//! Operation Context
//!
//! Carried into every store operation: cancellation, an optional deadline and
//! an id for correlating log events.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context of one store operation
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Operation ID for tracing
    pub op_id: Uuid,

    /// Cancelling the token abandons the operation
    pub cancel: CancellationToken,

    /// Point after which the operation fails with `Timeout`
    pub deadline: Option<Instant>,
}

impl OpContext {
    /// Create a context with no deadline
    pub fn new() -> Self {
        Self {
            op_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Create a context cancelled through `token`
    pub fn with_cancel(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..Self::new()
        }
    }

    /// Sets the deadline to `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Sets an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Earliest of the context deadline and `fallback` from now
    pub fn effective_deadline(&self, fallback: Option<Duration>) -> Option<Instant> {
        let configured = fallback.map(|timeout| Instant::now() + timeout);
        match (self.deadline, configured) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new()
    }
}
