//! Entrypoint configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every loader has a `from_lookup`
//! twin taking a closure, so callers can resolve settings from something
//! other than the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GateError;
use crate::gate::RetryPolicy;

/// Default PostgreSQL port when `DB_PORT` is empty.
const DEFAULT_DB_PORT: u16 = 5432;

/// Application home inside the container image.
const DEFAULT_APP_HOME: &str = "/app";

/// Non-root account the supervised processes run as.
const DEFAULT_APP_USER: &str = "appuser";

/// Top-level entrypoint configuration.
///
/// Loaded once at startup via [`GateConfig::from_env`]. Dependency
/// connection settings are not part of it: they are resolved per role,
/// so a Celery container never needs the database variables.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Readiness gate retry policy.
    pub retry: RetryPolicy,
    /// Application paths and identity.
    pub app: AppSettings,
    /// Celery invocation settings.
    pub celery: CelerySettings,
    /// Gunicorn invocation settings.
    pub gunicorn: GunicornSettings,
}

/// Application layout and run-as identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    /// Directory holding `manage.py`; working directory of every command.
    pub home: PathBuf,
    /// Log volume.
    pub logs_dir: PathBuf,
    /// `collectstatic` target volume.
    pub static_dir: PathBuf,
    /// Uploaded media volume.
    pub media_dir: PathBuf,
    /// Account to drop to, as a name or `uid[:gid]`. `None` disables switching.
    pub run_as: Option<String>,
    /// Python interpreter used for `manage.py`.
    pub python: String,
}

/// Celery worker and beat settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CelerySettings {
    /// Value passed to `celery -A`.
    pub app: String,
    /// Value passed to `--loglevel`.
    pub log_level: String,
    /// Beat scheduler PID file.
    pub beat_pidfile: PathBuf,
}

/// Gunicorn settings, mirroring the image's Gunicorn configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GunicornSettings {
    /// WSGI application path.
    pub wsgi_app: String,
    /// Bind address.
    pub bind: String,
    /// Worker processes; `None` means `2 * cpus + 1`.
    pub workers: Option<u32>,
    /// Worker class.
    pub worker_class: String,
    /// Simultaneous clients per worker (async worker classes only).
    pub worker_connections: u32,
    /// Gunicorn log level.
    pub log_level: String,
    /// Access log path.
    pub access_log: PathBuf,
    /// Error log path.
    pub error_log: PathBuf,
}

/// PostgreSQL connection settings. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Database name.
    pub database: String,
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Logical database index.
    pub db: i64,
}

impl GateConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidEnv`] if a variable is set but cannot be
    /// parsed.
    pub fn from_env() -> Result<Self, GateError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }

    /// Loads configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidEnv`] if a variable is set but cannot be
    /// parsed.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_env(lookup, "GATE_MAX_ATTEMPTS", defaults.max_attempts)?,
            interval: Duration::from_secs(parse_env(
                lookup,
                "GATE_RETRY_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            connect_timeout: Duration::from_secs(parse_env(
                lookup,
                "GATE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
        };

        let home = PathBuf::from(var_or(lookup, "APP_HOME", DEFAULT_APP_HOME));
        let logs_dir = path_or(lookup, "APP_LOGS_DIR", home.join("logs"));
        let app = AppSettings {
            static_dir: path_or(lookup, "APP_STATIC_DIR", home.join("staticfiles")),
            media_dir: path_or(lookup, "APP_MEDIA_DIR", home.join("media")),
            run_as: match lookup("APP_USER") {
                Some(user) if user.trim().is_empty() => None,
                Some(user) => Some(user.trim().to_string()),
                None => Some(DEFAULT_APP_USER.to_string()),
            },
            python: var_or(lookup, "PYTHON_BIN", "python"),
            logs_dir: logs_dir.clone(),
            home: home.clone(),
        };

        let celery = CelerySettings {
            app: var_or(lookup, "CELERY_APP", "config"),
            log_level: var_or(lookup, "CELERY_LOG_LEVEL", "info"),
            beat_pidfile: path_or(lookup, "CELERY_BEAT_PIDFILE", home.join("celerybeat.pid")),
        };

        let workers = match non_empty(lookup, "GUNICORN_WORKERS") {
            Some(raw) => Some(parse_value::<u32>("GUNICORN_WORKERS", raw)?),
            None => None,
        };
        let gunicorn = GunicornSettings {
            wsgi_app: var_or(lookup, "GUNICORN_WSGI_APP", "config.wsgi:application"),
            bind: var_or(lookup, "GUNICORN_BIND", "0.0.0.0:8000"),
            workers,
            worker_class: var_or(lookup, "GUNICORN_WORKER_CLASS", "gevent"),
            worker_connections: parse_env(lookup, "GUNICORN_WORKER_CONNECTIONS", 1000)?,
            log_level: var_or(lookup, "GUNICORN_LOG_LEVEL", "info"),
            access_log: logs_dir.join("gunicorn_access.log"),
            error_log: logs_dir.join("gunicorn_error.log"),
        };

        Ok(Self {
            retry,
            app,
            celery,
            gunicorn,
        })
    }
}

impl PostgresSettings {
    /// Reads `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD` and `DB_NAME`.
    ///
    /// An empty `DB_PORT` falls back to 5432; any other missing variable
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::MissingEnv`] for the first missing variable and
    /// [`GateError::InvalidEnv`] for a non-numeric port.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = required(lookup, "DB_NAME")?;
        let user = required(lookup, "DB_USER")?;
        let password = lookup("DB_PASSWORD").ok_or(GateError::MissingEnv("DB_PASSWORD"))?;
        let host = required(lookup, "DB_HOST")?;
        let port = match lookup("DB_PORT") {
            None => return Err(GateError::MissingEnv("DB_PORT")),
            Some(raw) if raw.trim().is_empty() => DEFAULT_DB_PORT,
            Some(raw) => parse_value("DB_PORT", raw)?,
        };

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
        })
    }
}

impl RedisSettings {
    /// Reads `REDIS_HOST` (default `redis`), `REDIS_PORT` (default 6379)
    /// and `REDIS_DB` (default 0).
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidEnv`] for a non-numeric port or db.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            host: var_or(lookup, "REDIS_HOST", "redis"),
            port: parse_env(lookup, "REDIS_PORT", 6379)?,
            db: parse_env(lookup, "REDIS_DB", 0)?,
        })
    }

    /// Connection parameters for the `redis` crate.
    ///
    /// The host is passed through as-is, so IPv6 literals work with or
    /// without surrounding brackets.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidEnv`] for port 0.
    pub fn connection_info(&self) -> Result<redis::ConnectionInfo, GateError> {
        if self.port == 0 {
            return Err(GateError::InvalidEnv {
                key: "REDIS_PORT",
                value: self.port.to_string(),
            });
        }
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        Ok(redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), self.port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                ..Default::default()
            },
        })
    }
}

/// Reads a variable from the process environment.
#[must_use]
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Returns the trimmed value of `key`, treating blank values as unset.
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, GateError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or(GateError::MissingEnv(key))
}

fn var_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).unwrap_or_else(|| default.to_string())
}

fn path_or<F>(lookup: &F, key: &str, default: PathBuf) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).map_or(default, PathBuf::from)
}

/// Parses an environment variable as `T`, returning `default` when unset.
fn parse_env<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, GateError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        Some(raw) => parse_value(key, raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: String) -> Result<T, GateError> {
    raw.trim()
        .parse()
        .map_err(|_| GateError::InvalidEnv { key, value: raw })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn database_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_NAME", "crm"),
            ("DB_USER", "crm"),
            ("DB_PASSWORD", "secret"),
            ("DB_HOST", "db"),
            ("DB_PORT", "5433"),
        ]
    }

    #[test]
    fn defaults_match_container_layout() {
        let Ok(config) = GateConfig::from_lookup(&lookup_from(&[])) else {
            panic!("empty environment should load");
        };
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.app.home, PathBuf::from("/app"));
        assert_eq!(config.app.logs_dir, PathBuf::from("/app/logs"));
        assert_eq!(config.app.static_dir, PathBuf::from("/app/staticfiles"));
        assert_eq!(config.app.media_dir, PathBuf::from("/app/media"));
        assert_eq!(config.app.run_as.as_deref(), Some("appuser"));
        assert_eq!(config.celery.app, "config");
        assert_eq!(config.celery.beat_pidfile, PathBuf::from("/app/celerybeat.pid"));
        assert_eq!(config.gunicorn.bind, "0.0.0.0:8000");
        assert_eq!(config.gunicorn.worker_class, "gevent");
        assert_eq!(config.gunicorn.worker_connections, 1000);
        assert_eq!(config.gunicorn.workers, None);
        assert_eq!(
            config.gunicorn.access_log,
            PathBuf::from("/app/logs/gunicorn_access.log")
        );
        assert_eq!(
            config.gunicorn.error_log,
            PathBuf::from("/app/logs/gunicorn_error.log")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let lookup = lookup_from(&[
            ("GATE_MAX_ATTEMPTS", "5"),
            ("GATE_RETRY_INTERVAL_SECS", "2"),
            ("APP_HOME", "/srv/crm"),
            ("APP_USER", "1000:1000"),
            ("GUNICORN_WORKERS", "3"),
        ]);
        let Ok(config) = GateConfig::from_lookup(&lookup) else {
            panic!("overrides should load");
        };
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.interval, Duration::from_secs(2));
        assert_eq!(config.app.logs_dir, PathBuf::from("/srv/crm/logs"));
        assert_eq!(config.app.run_as.as_deref(), Some("1000:1000"));
        assert_eq!(config.gunicorn.workers, Some(3));
        assert_eq!(
            config.gunicorn.error_log,
            PathBuf::from("/srv/crm/logs/gunicorn_error.log")
        );
    }

    #[test]
    fn blank_app_user_disables_switching() {
        let Ok(config) = GateConfig::from_lookup(&lookup_from(&[("APP_USER", " ")])) else {
            panic!("blank user should load");
        };
        assert_eq!(config.app.run_as, None);
    }

    #[test]
    fn invalid_number_is_reported() {
        let result = GateConfig::from_lookup(&lookup_from(&[("GATE_MAX_ATTEMPTS", "many")]));
        let Err(GateError::InvalidEnv { key, value }) = result else {
            panic!("expected InvalidEnv");
        };
        assert_eq!(key, "GATE_MAX_ATTEMPTS");
        assert_eq!(value, "many");
    }

    #[test]
    fn postgres_settings_from_complete_env() {
        let env = database_env();
        let Ok(settings) = PostgresSettings::from_lookup(&lookup_from(&env)) else {
            panic!("complete env should load");
        };
        assert_eq!(settings.host, "db");
        assert_eq!(settings.port, 5433);
        assert_eq!(settings.database, "crm");
    }

    #[test]
    fn postgres_settings_report_each_missing_variable() {
        for missing in ["DB_NAME", "DB_USER", "DB_PASSWORD", "DB_HOST", "DB_PORT"] {
            let env: Vec<_> = database_env()
                .into_iter()
                .filter(|(k, _)| *k != missing)
                .collect();
            let result = PostgresSettings::from_lookup(&lookup_from(&env));
            let Err(GateError::MissingEnv(key)) = result else {
                panic!("expected MissingEnv for {missing}");
            };
            assert_eq!(key, missing);
        }
    }

    #[test]
    fn empty_password_is_allowed() {
        let mut env = database_env();
        env.retain(|(k, _)| *k != "DB_PASSWORD");
        env.push(("DB_PASSWORD", ""));
        let Ok(settings) = PostgresSettings::from_lookup(&lookup_from(&env)) else {
            panic!("empty password should load");
        };
        assert!(settings.password.is_empty());
    }

    #[test]
    fn postgres_port_must_be_numeric() {
        let mut env = database_env();
        env.retain(|(k, _)| *k != "DB_PORT");
        env.push(("DB_PORT", "pg"));
        let result = PostgresSettings::from_lookup(&lookup_from(&env));
        assert!(matches!(
            result,
            Err(GateError::InvalidEnv { key: "DB_PORT", .. })
        ));
    }

    #[test]
    fn redis_settings_defaults() {
        let Ok(settings) = RedisSettings::from_lookup(&lookup_from(&[])) else {
            panic!("defaults should load");
        };
        assert_eq!(settings.host, "redis");
        assert_eq!(settings.port, 6379);
        let Ok(info) = settings.connection_info() else {
            panic!("defaults form a valid address");
        };
        let redis::ConnectionAddr::Tcp(host, port) = &info.addr else {
            panic!("expected a TCP address");
        };
        assert_eq!((host.as_str(), *port), ("redis", 6379));
        assert_eq!(info.redis.db, 0);
    }

    #[test]
    fn redis_settings_overrides() {
        let lookup = lookup_from(&[("REDIS_HOST", "cache"), ("REDIS_PORT", "6380")]);
        let Ok(settings) = RedisSettings::from_lookup(&lookup) else {
            panic!("overrides should load");
        };
        let Ok(info) = settings.connection_info() else {
            panic!("overrides form a valid address");
        };
        let redis::ConnectionAddr::Tcp(host, port) = &info.addr else {
            panic!("expected a TCP address");
        };
        assert_eq!((host.as_str(), *port), ("cache", 6380));
    }

    #[test]
    fn redis_ipv6_host_is_kept_verbatim() {
        for raw in ["::1", "[::1]"] {
            let Ok(settings) = RedisSettings::from_lookup(&lookup_from(&[("REDIS_HOST", raw)]))
            else {
                panic!("{raw} should load");
            };
            let Ok(info) = settings.connection_info() else {
                panic!("{raw} is a valid host");
            };
            let redis::ConnectionAddr::Tcp(host, _) = &info.addr else {
                panic!("expected a TCP address");
            };
            assert_eq!(host, "::1");
        }
    }

    #[test]
    fn redis_port_zero_is_invalid() {
        let Ok(settings) = RedisSettings::from_lookup(&lookup_from(&[("REDIS_PORT", "0")])) else {
            panic!("port 0 parses");
        };
        assert!(matches!(
            settings.connection_info(),
            Err(GateError::InvalidEnv {
                key: "REDIS_PORT",
                ..
            })
        ));
    }
}
