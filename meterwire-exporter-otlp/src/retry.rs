//! Retryable-error classification and the injected retry strategy seam.
//!
//! The client does not implement a backoff loop of its own. It runs every
//! upload through a caller-supplied [`Retry`] strategy and exposes
//! [`evaluate`] as the policy that strategy consults: which status codes are
//! worth retrying, and how long the server asked us to wait.

use std::future::Future;
use std::time::Duration;

use meterwire_common::Scope;
use tonic::{Code, Status};
use tonic_types::StatusExt;

use crate::error::Result;

/// Outcome of classifying a failed export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether the call may be retried at all.
    pub retryable: bool,

    /// Server-recommended wait before the next attempt. Zero when the server
    /// did not include one; the strategy's own backoff still applies.
    pub throttle: Duration,
}

/// Classify a failed export status.
///
/// Only a small closed set of codes identifies a call worth repeating; every
/// other code means the request itself is bad and retrying cannot help.
/// Successful calls are normalized away before this is ever consulted.
pub fn evaluate(status: &Status) -> RetryDecision {
    match status.code() {
        Code::Cancelled
        | Code::DeadlineExceeded
        | Code::ResourceExhausted
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unavailable
        | Code::DataLoss => RetryDecision {
            retryable: true,
            throttle: throttle_delay(status),
        },
        _ => RetryDecision {
            retryable: false,
            throttle: Duration::ZERO,
        },
    }
}

/// Extract the server-recommended wait from the status's RetryInfo detail,
/// if it carries one.
fn throttle_delay(status: &Status) -> Duration {
    status
        .get_details_retry_info()
        .and_then(|info| info.retry_delay)
        .unwrap_or(Duration::ZERO)
}

/// Injected retry strategy.
///
/// Given a fallible export attempt, a strategy invokes it, consults
/// [`evaluate`] on failures, sleeps out any throttle delay, and either tries
/// again or propagates the final error. The same `scope` governs every
/// attempt; a strategy must stop once the scope gives out.
pub trait Retry: Send + Sync {
    /// Run `operation` to completion under this strategy.
    fn execute<F, Fut>(&self, scope: &Scope, operation: F) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send;
}

/// The trivial strategy: a single attempt, errors propagate immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl Retry for NoRetry {
    async fn execute<F, Fut>(&self, _scope: &Scope, mut operation: F) -> Result<()>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        operation().await
    }
}
