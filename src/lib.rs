//! # crm-gate
//!
//! Container entrypoint for the CRM Django application: the web
//! (Gunicorn), Celery worker and Celery beat containers all start through
//! this binary.
//!
//! Startup is a linear, fail-fast sequence. The readiness gate polls the
//! services the role depends on with a fixed backoff, the role prepares
//! its volumes and runs its setup commands as a non-root account, and the
//! entrypoint finally replaces itself with the supervised process.
//!
//! ## Architecture
//!
//! ```text
//! crm-gate <role>
//!     │
//!     ├── cli / config        (role, environment, retry policy)
//!     │
//!     ├── gate/               Wait: PostgreSQL connect, Redis PING
//!     │     └── retry         fixed-backoff loop
//!     │
//!     └── entrypoint/         Prepare → Setup → Exec
//!           ├── prepare       ownership, log files, stale PID file
//!           ├── process       run-as identity, spawn, exec
//!           └── gunicorn      web server command line
//! ```

pub mod cli;
pub mod config;
pub mod entrypoint;
pub mod error;
pub mod gate;
