//! Retry-with-fixed-backoff primitive shared by every dependency probe.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::DependencyKind;
use crate::error::GateError;

/// Default number of attempts per dependency.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default pause between two attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How hard the gate tries before giving up on a dependency.
///
/// The backoff is fixed: every pause lasts exactly `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per dependency, at least 1.
    pub max_attempts: u32,
    /// Pause between two failed attempts.
    pub interval: Duration,
    /// Upper bound on a single attempt.
    pub connect_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Result of a single health-check attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The dependency answered the health check.
    Ready,
    /// Expected failure (refused, timed out, still starting). Retried.
    Unavailable(String),
    /// Unexpected failure. Not retried.
    Fatal(String),
}

/// A single health check against one dependency.
pub trait Probe {
    /// Dependency this probe checks.
    fn dependency(&self) -> DependencyKind;

    /// Performs one attempt. Must not retry internally.
    fn check(&self) -> impl Future<Output = ProbeOutcome>;
}

/// Summary of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    /// Dependency that became ready.
    pub dependency: DependencyKind,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Calls `probe` until it reports [`ProbeOutcome::Ready`] or the policy's
/// attempt budget runs out.
///
/// Sleeps `policy.interval` after each unavailable attempt except the last.
///
/// # Errors
///
/// Returns [`GateError::DependencyUnavailable`] once every attempt reported
/// [`ProbeOutcome::Unavailable`], and [`GateError::ProbeFailed`] as soon as
/// an attempt reports [`ProbeOutcome::Fatal`].
pub async fn retry_with_fixed_backoff<P: Probe>(
    policy: &RetryPolicy,
    probe: &P,
) -> Result<WaitReport, GateError> {
    let dependency = probe.dependency();
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match probe.check().await {
            ProbeOutcome::Ready => {
                let elapsed = started.elapsed();
                tracing::info!(%dependency, attempt, ?elapsed, "dependency is ready");
                return Ok(WaitReport {
                    dependency,
                    attempts: attempt,
                    elapsed,
                });
            }
            ProbeOutcome::Fatal(reason) => {
                tracing::error!(%dependency, attempt, error = %reason, "unexpected probe error");
                return Err(GateError::ProbeFailed { dependency, reason });
            }
            ProbeOutcome::Unavailable(reason) => {
                tracing::warn!(
                    %dependency,
                    attempt,
                    max_attempts,
                    error = %reason,
                    "dependency not ready"
                );
                last_error = reason;
                if attempt < max_attempts {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    Err(GateError::DependencyUnavailable {
        dependency,
        attempts: max_attempts,
        elapsed: started.elapsed(),
        last_error,
    })
}
