use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-request context carrying tracing metadata, timing, and cancellation.
/// Threaded by reference through every service and store call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace identifier, caller supplied or generated at the edge.
    pub trace_id: String,
    /// Value of the caller's `Origin` header, if any.
    pub origin: String,
    /// Value of the caller's `User-Agent` header, if any.
    pub user_agent: String,
    /// When the pipeline started timing this request.
    pub started_at: Instant,
    /// Point after which work for this request should stop.
    pub deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            origin: String::new(),
            user_agent: String::new(),
            started_at: Instant::now(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A context with no trace id, no deadline, and no caller metadata.
    #[must_use]
    pub fn background() -> Self {
        Self::new(String::new())
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Token shared by every clone of this context.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Time since `started_at`.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Fails when the context was cancelled or its deadline passed.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error describing why work must stop.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(
                Error::internal("request cancelled").with_field("trace_id", self.trace_id.clone())
            );
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::internal("request deadline exceeded")
                    .with_field("trace_id", self.trace_id.clone()));
            }
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
