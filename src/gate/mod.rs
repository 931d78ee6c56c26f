//! Readiness gate: blocks startup until every dependency answers a health
//! check.
//!
//! Dependencies are described by [`DependencySpec`], resolved from the
//! environment before anything is probed, then checked one after another
//! by [`ReadinessGate::wait_all`] using the fixed-backoff loop in
//! [`retry`].

pub mod postgres_probe;
pub mod redis_probe;
pub mod retry;

use std::fmt;

use crate::config::{PostgresSettings, RedisSettings};
use crate::error::GateError;

pub use postgres_probe::PostgresProbe;
pub use redis_probe::RedisProbe;
pub use retry::{Probe, ProbeOutcome, RetryPolicy, WaitReport, retry_with_fixed_backoff};

/// Kind of backing service a container waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DependencyKind {
    /// PostgreSQL database.
    Postgres,
    /// Redis broker and cache.
    Redis,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// A dependency together with its resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpec {
    /// PostgreSQL with connection settings.
    Postgres(PostgresSettings),
    /// Redis with connection settings.
    Redis(RedisSettings),
}

impl DependencySpec {
    /// Resolves the connection settings of `kind` through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::MissingEnv`] or [`GateError::InvalidEnv`] when
    /// the settings are incomplete or do not form a usable address.
    pub fn resolve<F>(kind: DependencyKind, lookup: &F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match kind {
            DependencyKind::Postgres => PostgresSettings::from_lookup(lookup).map(Self::Postgres),
            DependencyKind::Redis => {
                let settings = RedisSettings::from_lookup(lookup)?;
                settings.connection_info()?;
                Ok(Self::Redis(settings))
            }
        }
    }

    /// Resolves every kind in order, failing on the first incomplete one.
    ///
    /// Duplicates are dropped so a dependency is never waited for twice.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error encountered.
    pub fn resolve_all<F>(kinds: &[DependencyKind], lookup: &F) -> Result<Vec<Self>, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut seen = Vec::with_capacity(kinds.len());
        let mut specs = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if seen.contains(kind) {
                continue;
            }
            seen.push(*kind);
            specs.push(Self::resolve(*kind, lookup)?);
        }
        Ok(specs)
    }

    /// Dependency kind of this spec.
    #[must_use]
    pub const fn kind(&self) -> DependencyKind {
        match self {
            Self::Postgres(_) => DependencyKind::Postgres,
            Self::Redis(_) => DependencyKind::Redis,
        }
    }
}

/// Sequential readiness gate with a shared retry policy.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    policy: RetryPolicy,
}

impl ReadinessGate {
    /// Creates a gate applying `policy` to every dependency.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the gate's retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Waits for a single probe.
    ///
    /// # Errors
    ///
    /// See [`retry_with_fixed_backoff`].
    pub async fn wait_for<P: Probe>(&self, probe: &P) -> Result<WaitReport, GateError> {
        retry_with_fixed_backoff(&self.policy, probe).await
    }

    /// Waits for each dependency in turn. Stops at the first one that never
    /// becomes ready.
    ///
    /// # Errors
    ///
    /// Returns the error of the first dependency that failed.
    pub async fn wait_all(&self, specs: &[DependencySpec]) -> Result<Vec<WaitReport>, GateError> {
        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            tracing::info!(dependency = %spec.kind(), "waiting for dependency");
            let report = match spec {
                DependencySpec::Postgres(settings) => {
                    let probe = PostgresProbe::new(settings.clone(), self.policy.connect_timeout);
                    self.wait_for(&probe).await?
                }
                DependencySpec::Redis(settings) => {
                    let probe = RedisProbe::new(settings, self.policy.connect_timeout)?;
                    self.wait_for(&probe).await?
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }
}
