//! Command-line interface.
//!
//! The binary is the `ENTRYPOINT` of every container; the subcommand
//! selects the container role.

use clap::Parser;

use crate::entrypoint::Role;
use crate::gate::DependencyKind;

/// Container entrypoint for the CRM web, worker and scheduler services.
#[derive(Parser, Debug)]
#[command(name = "crm-gate")]
#[command(version)]
#[command(
    about = "Wait for PostgreSQL/Redis, prepare volumes, then exec the service",
    long_about = "crm-gate blocks container startup until the required services answer a \
                  health check (30 attempts, 1 second apart by default), performs one-time \
                  setup, then replaces itself with the long-running process.\n\n\
                  Example usage:\n  crm-gate django\n  crm-gate wait postgres redis -- python manage.py shell"
)]
pub struct Cli {
    /// The container role to start.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available container roles.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Wait for the given services, then exec the trailing command.
    Wait(WaitArgs),

    /// Wait for PostgreSQL and Redis, migrate, collect static files, exec Gunicorn.
    Django,

    /// Wait for Redis, exec a Celery worker.
    CeleryWorker,

    /// Wait for Redis, clear the stale PID file, exec Celery beat.
    CeleryBeat,
}

/// Arguments for `crm-gate wait`.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct WaitArgs {
    /// Services to wait for, checked in the given order.
    #[arg(value_enum, required = true)]
    pub dependencies: Vec<DependencyKind>,

    /// Command to exec once every service is ready.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl From<Commands> for Role {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Wait(args) => Self::Wait {
                dependencies: args.dependencies,
                command: args.command,
            },
            Commands::Django => Self::Django,
            Commands::CeleryWorker => Self::CeleryWorker,
            Commands::CeleryBeat => Self::CeleryBeat,
        }
    }
}
