//! Entrypoint sequencing: Wait → Prepare → Setup → Exec.
//!
//! Each container role is turned into a [`StartupPlan`]. The plan is
//! linear and fail-fast: the first failing stage aborts startup and
//! nothing after it runs. The final stage replaces the entrypoint with
//! the supervised process, so the container's exit status is that
//! process's exit status.

pub mod gunicorn;
pub mod identity;
pub mod prepare;
pub mod process;

use std::fmt;

use crate::config::GateConfig;
use crate::error::GateError;
use crate::gate::{DependencyKind, DependencySpec, ReadinessGate};

pub use identity::Identity;
pub use prepare::PrepareSpec;
pub use process::{CommandSpec, ProcessRunner, RunAs, SystemRunner};

/// Container role the entrypoint starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Wait for the listed dependencies, then exec `command` if any.
    Wait {
        /// Dependencies to wait for, in order.
        dependencies: Vec<DependencyKind>,
        /// Command to hand over to; empty means exit after waiting.
        command: Vec<String>,
    },
    /// Django web container served by Gunicorn.
    Django,
    /// Celery worker container.
    CeleryWorker,
    /// Celery beat scheduler container.
    CeleryBeat,
}

impl Role {
    /// Dependencies the role waits for before anything else.
    #[must_use]
    pub fn dependencies(&self) -> Vec<DependencyKind> {
        match self {
            Self::Wait { dependencies, .. } => dependencies.clone(),
            Self::Django => vec![DependencyKind::Postgres, DependencyKind::Redis],
            Self::CeleryWorker | Self::CeleryBeat => vec![DependencyKind::Redis],
        }
    }

    /// Whether the role drops to the configured non-root identity.
    #[must_use]
    pub const fn switches_identity(&self) -> bool {
        !matches!(self, Self::Wait { .. })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wait { .. } => f.write_str("wait"),
            Self::Django => f.write_str("django"),
            Self::CeleryWorker => f.write_str("celery-worker"),
            Self::CeleryBeat => f.write_str("celery-beat"),
        }
    }
}

/// Everything a role does on its way to the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupPlan {
    /// Role the plan was built for.
    pub role: Role,
    /// Dependencies to wait for.
    pub dependencies: Vec<DependencyKind>,
    /// Filesystem preparation.
    pub prepare: PrepareSpec,
    /// Owner handed the prepared paths; `None` leaves ownership alone.
    pub owner: Option<Identity>,
    /// Setup commands run to completion, in order.
    pub setup: Vec<CommandSpec>,
    /// Supervised process; `None` ends startup after setup.
    pub launch: Option<CommandSpec>,
}

impl StartupPlan {
    /// Builds the plan for `role`.
    ///
    /// `identity` is the resolved non-root account (ignored by
    /// [`Role::Wait`]) and `cpus` sizes the Gunicorn worker pool.
    #[must_use]
    pub fn for_role(
        role: Role,
        config: &GateConfig,
        identity: Option<Identity>,
        cpus: u32,
    ) -> Self {
        let owner = identity.filter(|_| role.switches_identity());
        let run_as = RunAs::from_identity(owner.as_ref());
        let app = &config.app;
        let celery = &config.celery;

        let manage = |subcommand: &str| {
            CommandSpec::new(app.python.as_str())
                .args(["manage.py", subcommand, "--noinput"])
                .current_dir(&app.home)
                .run_as(run_as.clone())
        };
        let celery_cmd = |mode: &str| {
            CommandSpec::new("celery")
                .args(["-A", celery.app.as_str(), mode])
                .arg(format!("--loglevel={}", celery.log_level))
                .current_dir(&app.home)
                .run_as(run_as.clone())
        };

        let (prepare, setup, launch) = match &role {
            Role::Wait { command, .. } => {
                let launch = command.split_first().map(|(program, args)| {
                    CommandSpec::new(program.as_str()).args(args.iter().map(String::as_str))
                });
                (PrepareSpec::default(), Vec::new(), launch)
            }
            Role::Django => {
                let prepare = PrepareSpec {
                    owned_dirs: vec![
                        app.logs_dir.clone(),
                        app.static_dir.clone(),
                        app.media_dir.clone(),
                    ],
                    log_files: vec![
                        config.gunicorn.access_log.clone(),
                        config.gunicorn.error_log.clone(),
                    ],
                    stale_pidfile: None,
                };
                let setup = vec![manage("migrate"), manage("collectstatic")];
                let launch = CommandSpec::new("gunicorn")
                    .args(config.gunicorn.to_args(cpus))
                    .current_dir(&app.home)
                    .run_as(run_as.clone());
                (prepare, setup, Some(launch))
            }
            Role::CeleryWorker => (PrepareSpec::default(), Vec::new(), Some(celery_cmd("worker"))),
            Role::CeleryBeat => {
                let prepare = PrepareSpec {
                    stale_pidfile: Some(celery.beat_pidfile.clone()),
                    ..PrepareSpec::default()
                };
                let launch = celery_cmd("beat")
                    .arg(format!("--pidfile={}", celery.beat_pidfile.display()));
                (prepare, Vec::new(), Some(launch))
            }
        };

        Self {
            dependencies: role.dependencies(),
            role,
            prepare,
            owner,
            setup,
            launch,
        }
    }

    /// Runs Prepare, the setup commands and the final handover.
    ///
    /// # Errors
    ///
    /// Returns the first failure; later stages do not run.
    pub fn execute<R: ProcessRunner>(&self, runner: &mut R) -> Result<(), GateError> {
        if !self.prepare.is_empty() {
            tracing::info!(role = %self.role, "preparing volumes");
            self.prepare.apply(self.owner.as_ref())?;
        }
        for step in &self.setup {
            runner.run(step)?;
        }
        match &self.launch {
            Some(launch) => runner.exec(launch),
            None => {
                tracing::info!(role = %self.role, "dependencies ready, nothing to launch");
                Ok(())
            }
        }
    }
}

/// Waits for `specs` through `gate`, then executes `plan`.
///
/// The async runtime only lives for the Wait stage and is shut down before
/// any setup command or the handover runs.
///
/// # Errors
///
/// Returns the first failure of any stage.
pub fn start<R: ProcessRunner>(
    plan: &StartupPlan,
    specs: &[DependencySpec],
    gate: &ReadinessGate,
    runner: &mut R,
) -> Result<(), GateError> {
    if !specs.is_empty() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(GateError::Runtime)?;
        let reports = runtime.block_on(gate.wait_all(specs))?;
        tracing::info!(role = %plan.role, ready = reports.len(), "all dependencies ready");
    }
    plan.execute(runner)
}
