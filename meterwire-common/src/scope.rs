//! Execution scopes carrying cancellation and an optional deadline.
//!
//! A [`Scope`] is passed into every export-client operation. Callers cancel
//! it to abort outstanding work; the client derives bounded child scopes from
//! it for individual uploads. Cancelling a scope cancels every child derived
//! from it, and a child's deadline is never later than its parent's.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope is no longer usable.
///
/// When a scope is both cancelled and past its deadline, cancellation wins:
/// it is the stronger signal that the caller gave up on the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The scope (or one of its ancestors) was cancelled.
    #[error("scope was cancelled")]
    Cancelled,

    /// The scope's deadline has passed.
    #[error("scope deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation scope with an optional deadline.
///
/// Cloning a `Scope` yields a handle to the same scope: cancelling one clone
/// cancels them all. Use [`Scope::child`] or [`Scope::child_with_timeout`] to
/// derive a scope that can outlive neither its parent's cancellation nor its
/// parent's deadline.
///
/// The deadline timer only exists while a future is driven through
/// [`Scope::run`]; dropping that future releases it on every exit path.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// Create a root scope with no deadline.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Create a root scope that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Create a root scope that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time remaining until the deadline. `None` when there is no deadline;
    /// zero when the deadline has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Check whether this scope is still usable.
    pub fn check(&self) -> Result<(), ScopeError> {
        if self.token.is_cancelled() {
            return Err(ScopeError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ScopeError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Derive a child scope inheriting this scope's deadline.
    pub fn child(&self) -> Scope {
        Scope {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child scope expiring `timeout` from now, bounded by this
    /// scope's own deadline (whichever is sooner wins).
    pub fn child_with_timeout(&self, timeout: Duration) -> Scope {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent <= candidate => parent,
            _ => candidate,
        };
        Scope {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Drive `future` to completion, racing it against cancellation and the
    /// deadline. Returns the future's output, or the scope's error if the
    /// scope gives out first.
    ///
    /// An already-expired scope fails before the future is polled at all.
    pub async fn run<T>(&self, future: impl Future<Output = T>) -> Result<T, ScopeError> {
        self.check()?;

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ScopeError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(ScopeError::DeadlineExceeded),
                    value = future => Ok(value),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ScopeError::Cancelled),
                    value = future => Ok(value),
                }
            }
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
