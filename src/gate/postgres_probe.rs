//! PostgreSQL health check: open a connection, close it straight away.

use std::time::Duration;

use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};

use super::{DependencyKind, Probe, ProbeOutcome};
use crate::config::PostgresSettings;

/// Probe that succeeds once a `PgConnection` can be established.
#[derive(Debug, Clone)]
pub struct PostgresProbe {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PostgresProbe {
    /// Creates a probe for the given settings.
    #[must_use]
    pub fn new(settings: PostgresSettings, connect_timeout: Duration) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database)
            .application_name("crm-gate");
        Self {
            options,
            connect_timeout,
        }
    }
}

impl Probe for PostgresProbe {
    fn dependency(&self) -> DependencyKind {
        DependencyKind::Postgres
    }

    async fn check(&self) -> ProbeOutcome {
        let connect = PgConnection::connect_with(&self.options);
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Err(_) => ProbeOutcome::Unavailable(format!(
                "connection timed out after {:?}",
                self.connect_timeout
            )),
            Ok(Ok(conn)) => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(error = %e, "closing probe connection failed");
                }
                ProbeOutcome::Ready
            }
            Ok(Err(e)) => classify_error(&e),
        }
    }
}

/// Sorts a connection error into retryable and fatal.
///
/// Socket, TLS and protocol failures plus server-side errors such as
/// "the database system is starting up" are expected while the database
/// container boots.
#[must_use]
pub fn classify_error(err: &sqlx::Error) -> ProbeOutcome {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Database(_)
        | sqlx::Error::PoolTimedOut => ProbeOutcome::Unavailable(err.to_string()),
        _ => ProbeOutcome::Fatal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use crate::gate::{ReadinessGate, RetryPolicy};

    fn settings(port: u16) -> PostgresSettings {
        PostgresSettings {
            host: "127.0.0.1".to_string(),
            port,
            user: "crm".to_string(),
            password: "secret".to_string(),
            database: "crm".to_string(),
        }
    }

    #[test]
    fn refused_connection_is_retryable() {
        let err = sqlx::Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(matches!(classify_error(&err), ProbeOutcome::Unavailable(_)));
    }

    #[test]
    fn protocol_error_is_retryable() {
        let err = sqlx::Error::Protocol("unexpected end of stream".to_string());
        assert!(matches!(classify_error(&err), ProbeOutcome::Unavailable(_)));
    }

    #[test]
    fn configuration_error_is_fatal() {
        let err = sqlx::Error::Configuration("invalid sslmode".into());
        assert!(matches!(classify_error(&err), ProbeOutcome::Fatal(_)));
    }

    #[test]
    fn unrelated_error_is_fatal() {
        assert!(matches!(
            classify_error(&sqlx::Error::RowNotFound),
            ProbeOutcome::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn closed_port_is_unavailable() {
        let probe = PostgresProbe::new(settings(1), Duration::from_secs(2));
        assert_eq!(probe.dependency(), DependencyKind::Postgres);
        assert!(matches!(probe.check().await, ProbeOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn closed_port_exhausts_small_budget() {
        let gate = ReadinessGate::new(RetryPolicy {
            max_attempts: 2,
            interval: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(2),
        });
        let probe = PostgresProbe::new(settings(1), Duration::from_secs(2));
        let result = gate.wait_for(&probe).await;
        assert!(matches!(
            result,
            Err(GateError::DependencyUnavailable { attempts: 2, .. })
        ));
    }
}
