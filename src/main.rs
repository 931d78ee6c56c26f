//! crm-gate entry point.
//!
//! Parses the role, waits for its dependencies, prepares the container and
//! execs the supervised process.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crm_gate::cli::Cli;
use crm_gate::config::{GateConfig, env_lookup};
use crm_gate::entrypoint::gunicorn::available_cpus;
use crm_gate::entrypoint::{self, Identity, Role, StartupPlan, SystemRunner};
use crm_gate::error::GateError;
use crm_gate::gate::{DependencySpec, ReadinessGate};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("crm-gate: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli.command.into()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "startup aborted");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("failed to install JSON log subscriber")
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))
            .context("failed to install log subscriber")
    }
}

fn run(role: Role) -> Result<(), GateError> {
    // Load configuration
    let config = GateConfig::from_env()?;
    tracing::info!(%role, "starting container role");

    // Resolve every dependency before probing any of them
    let specs = DependencySpec::resolve_all(&role.dependencies(), &env_lookup)?;

    let identity = match (&config.app.run_as, role.switches_identity()) {
        (Some(spec), true) => Some(Identity::resolve(spec)?),
        _ => None,
    };

    let plan = StartupPlan::for_role(role, &config, identity, available_cpus());
    let gate = ReadinessGate::new(config.retry);

    entrypoint::start(&plan, &specs, &gate, &mut SystemRunner)
}
