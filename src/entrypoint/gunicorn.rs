//! Gunicorn command line for the web container.

use crate::config::GunicornSettings;

/// Worker count for `cpus` cores: two per core plus one.
#[must_use]
pub const fn recommended_workers(cpus: u32) -> u32 {
    cpus.saturating_mul(2).saturating_add(1)
}

/// Cores available to the container, at least 1.
#[must_use]
pub fn available_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
        .unwrap_or(1)
}

impl GunicornSettings {
    /// Worker count, falling back to [`recommended_workers`] for `cpus`.
    #[must_use]
    pub fn effective_workers(&self, cpus: u32) -> u32 {
        self.workers.unwrap_or_else(|| recommended_workers(cpus))
    }

    /// Arguments passed to `gunicorn`, WSGI application first.
    #[must_use]
    pub fn to_args(&self, cpus: u32) -> Vec<String> {
        vec![
            self.wsgi_app.clone(),
            format!("--bind={}", self.bind),
            format!("--workers={}", self.effective_workers(cpus)),
            format!("--worker-class={}", self.worker_class),
            format!("--worker-connections={}", self.worker_connections),
            format!("--log-level={}", self.log_level),
            format!("--access-logfile={}", self.access_log.display()),
            format!("--error-logfile={}", self.error_log.display()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn settings(workers: Option<u32>) -> GunicornSettings {
        GunicornSettings {
            wsgi_app: "config.wsgi:application".to_string(),
            bind: "0.0.0.0:8000".to_string(),
            workers,
            worker_class: "gevent".to_string(),
            worker_connections: 1000,
            log_level: "info".to_string(),
            access_log: PathBuf::from("/app/logs/gunicorn_access.log"),
            error_log: PathBuf::from("/app/logs/gunicorn_error.log"),
        }
    }

    #[test]
    fn two_workers_per_core_plus_one() {
        assert_eq!(recommended_workers(1), 3);
        assert_eq!(recommended_workers(4), 9);
        assert_eq!(recommended_workers(u32::MAX), u32::MAX);
    }

    #[test]
    fn available_cpus_is_positive() {
        assert!(available_cpus() >= 1);
    }

    #[test]
    fn explicit_worker_count_wins() {
        assert_eq!(settings(Some(2)).effective_workers(8), 2);
        assert_eq!(settings(None).effective_workers(8), 17);
    }

    #[test]
    fn args_mirror_configuration_file() {
        let args = settings(None).to_args(2);
        assert_eq!(
            args,
            vec![
                "config.wsgi:application",
                "--bind=0.0.0.0:8000",
                "--workers=5",
                "--worker-class=gevent",
                "--worker-connections=1000",
                "--log-level=info",
                "--access-logfile=/app/logs/gunicorn_access.log",
                "--error-logfile=/app/logs/gunicorn_error.log",
            ]
        );
    }
}
