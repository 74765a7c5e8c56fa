//! Per-request context carried through verification and issuance.
//!
//! A [`RequestContext`] bundles the request-correlation id used by every log
//! line and error, a cancellation token owned by the caller, and an optional
//! deadline. Only the external key-set resolution step is raced against the
//! cancellation signal; the cryptographic steps are CPU-bound and run to
//! completion.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a cancellable operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The caller cancelled the request.
    Cancelled,
    /// The request deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Context information for a single verify or issue call
#[derive(Clone)]
pub struct RequestContext {
    request_id: String,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::generate()
    }
}

impl RequestContext {
    /// Create a context with an explicit request-correlation id
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Create a context with a freshly generated UUID v4 request id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Attach the caller's cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Give the request a deadline relative to now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Give the request an absolute deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Request-correlation id
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Cancellation token shared with the caller
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Absolute deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the request has been cancelled or has run past its deadline
    pub fn is_interrupted(&self) -> Option<Interrupted> {
        if self.cancellation.is_cancelled() {
            Some(Interrupted::Cancelled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(Interrupted::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Run `fut` until it completes, the request is cancelled, or the deadline passes.
    ///
    /// Cancellation wins ties so that a cancelled request never reports a late success.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the future was abandoned.
    pub async fn run_cancellable<F>(&self, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        if let Some(reason) = self.is_interrupted() {
            return Err(reason);
        }

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Interrupted::Cancelled),
            () = expired => Err(Interrupted::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_request_ids_are_unique() {
        let a = RequestContext::generate();
        let b = RequestContext::generate();
        assert_ne!(a.request_id(), b.request_id());
        assert!(Uuid::parse_str(a.request_id()).is_ok());
    }

    #[tokio::test]
    async fn test_run_cancellable_completes() {
        let ctx = RequestContext::new("req-1");
        let out = ctx.run_cancellable(async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_run_cancellable_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new("req-2").with_cancellation(token.clone());

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.run_cancellable(std::future::pending::<()>()).await }
        });
        token.cancel();

        assert_eq!(handle.await.unwrap(), Err(Interrupted::Cancelled));
        assert_eq!(ctx.is_interrupted(), Some(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancellable_observes_deadline() {
        let ctx = RequestContext::new("req-3").with_timeout(Duration::from_millis(50));
        let out = ctx
            .run_cancellable(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_already_cancelled_context_short_circuits() {
        let ctx = RequestContext::new("req-4");
        ctx.cancellation().cancel();
        let out = ctx.run_cancellable(async { "never" }).await;
        assert_eq!(out, Err(Interrupted::Cancelled));
    }

    #[test]
    fn test_debug_includes_request_id() {
        let ctx = RequestContext::new("req-5");
        let debug = format!("{ctx:?}");
        assert!(debug.contains("req-5"));
    }
}
