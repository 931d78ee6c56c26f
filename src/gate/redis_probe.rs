//! Redis health check: `PING`, expect `PONG`.

use std::time::Duration;

use redis::{ErrorKind, RedisError};

use super::{DependencyKind, Probe, ProbeOutcome};
use crate::config::RedisSettings;
use crate::error::GateError;

/// Probe that succeeds once Redis answers `PING`.
#[derive(Debug, Clone)]
pub struct RedisProbe {
    client: redis::Client,
    connect_timeout: Duration,
}

impl RedisProbe {
    /// Creates a probe for the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidEnv`] if the settings do not form a
    /// valid Redis address.
    pub fn new(settings: &RedisSettings, connect_timeout: Duration) -> Result<Self, GateError> {
        let info = settings.connection_info()?;
        let client = redis::Client::open(info).map_err(|_| GateError::InvalidEnv {
            key: "REDIS_HOST",
            value: settings.host.clone(),
        })?;
        Ok(Self {
            client,
            connect_timeout,
        })
    }
}

impl Probe for RedisProbe {
    fn dependency(&self) -> DependencyKind {
        DependencyKind::Redis
    }

    async fn check(&self) -> ProbeOutcome {
        let ping = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        };
        match tokio::time::timeout(self.connect_timeout, ping).await {
            Err(_) => ProbeOutcome::Unavailable(format!(
                "PING timed out after {:?}",
                self.connect_timeout
            )),
            Ok(Ok(reply)) if reply.eq_ignore_ascii_case("PONG") => ProbeOutcome::Ready,
            Ok(Ok(reply)) => ProbeOutcome::Unavailable(format!("unexpected PING reply {reply:?}")),
            Ok(Err(e)) => classify_error(&e),
        }
    }
}

/// Sorts a Redis error into retryable and fatal.
///
/// A server still loading its dataset answers `LOADING`, which is retried
/// like a refused connection.
#[must_use]
pub fn classify_error(err: &RedisError) -> ProbeOutcome {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.kind() == ErrorKind::BusyLoadingError
    {
        ProbeOutcome::Unavailable(err.to_string())
    } else {
        ProbeOutcome::Fatal(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn refused_connection_is_retryable() {
        let err = RedisError::from(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(matches!(classify_error(&err), ProbeOutcome::Unavailable(_)));
    }

    #[test]
    fn loading_is_retryable() {
        let err = RedisError::from((ErrorKind::BusyLoadingError, "loading dataset"));
        assert!(matches!(classify_error(&err), ProbeOutcome::Unavailable(_)));
    }

    #[test]
    fn authentication_failure_is_fatal() {
        let err = RedisError::from((ErrorKind::AuthenticationFailed, "invalid password"));
        assert!(matches!(classify_error(&err), ProbeOutcome::Fatal(_)));
    }

    #[test]
    fn default_settings_build_a_client() {
        let settings = RedisSettings {
            host: "redis".to_string(),
            port: 6379,
            db: 0,
        };
        let probe = RedisProbe::new(&settings, Duration::from_secs(1));
        assert!(probe.is_ok());
    }

    #[test]
    fn ipv6_loopback_builds_a_client() {
        let settings = RedisSettings {
            host: "::1".to_string(),
            port: 6379,
            db: 2,
        };
        assert!(RedisProbe::new(&settings, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn port_zero_is_rejected() {
        let settings = RedisSettings {
            host: "redis".to_string(),
            port: 0,
            db: 0,
        };
        assert!(matches!(
            RedisProbe::new(&settings, Duration::from_secs(1)),
            Err(GateError::InvalidEnv {
                key: "REDIS_PORT",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn closed_port_is_unavailable() {
        let settings = RedisSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            db: 0,
        };
        let Ok(probe) = RedisProbe::new(&settings, Duration::from_secs(2)) else {
            panic!("client builds for loopback");
        };
        assert_eq!(probe.dependency(), DependencyKind::Redis);
        assert!(matches!(probe.check().await, ProbeOutcome::Unavailable(_)));
    }
}
