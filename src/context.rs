use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DbError;
use crate::pool::CancelHandle;

/// Cancellation and deadline carried into every query helper.
///
/// Query helpers take a [`CancelHandle`] for their connection before the statement starts.
/// When the context is cancelled the backend is told to abort the running statement, and the
/// connection only goes back to the pool once that statement has stopped.
///
/// ```rust
/// use std::time::Duration;
/// use dbsql::prelude::*;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let ctx = Context::background()
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(5));
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set a deadline `timeout` from now. An earlier existing deadline wins.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drive `fut` until it completes, the token is cancelled, or the deadline passes.
    ///
    /// # Errors
    /// Returns `DbError::Cancelled` when cancellation or the deadline wins, otherwise whatever
    /// `fut` returns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        if self.is_cancelled() {
            return Err(self.cancelled_error());
        }
        tokio::select! {
            res = fut => res,
            err = self.done() => Err(err),
        }
    }

    /// Like [`run`](Self::run) for a statement running on a connection: on cancellation the
    /// statement is aborted through `handle`, and `fut` is driven until it settles so the
    /// connection is idle again before it can be reused.
    ///
    /// # Errors
    /// Returns `DbError::Cancelled` when cancellation or the deadline wins, otherwise whatever
    /// `fut` returns.
    pub async fn run_interruptible<F, T>(&self, handle: &CancelHandle, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        if self.is_cancelled() {
            return Err(self.cancelled_error());
        }
        tokio::pin!(fut);
        let err = tokio::select! {
            res = &mut fut => return res,
            err = self.done() => err,
        };
        handle.cancel().await;
        if fut.await.is_ok() {
            tracing::debug!("statement finished before it could be interrupted");
        }
        Err(err)
    }

    /// Resolves with the cancellation error once the token fires or the deadline passes.
    pub(crate) async fn done(&self) -> DbError {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            () = cancelled => DbError::Cancelled("context cancelled".to_string()),
            () = expired => DbError::Cancelled("deadline exceeded".to_string()),
        }
    }

    fn cancelled_error(&self) -> DbError {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            DbError::Cancelled("context cancelled".to_string())
        } else {
            DbError::Cancelled("deadline exceeded".to_string())
        }
    }
}
