//! Command execution under an explicit identity.
//!
//! Ownership fix-up runs in the entrypoint's own context
//! ([`RunAs::Current`], root inside the image). Setup commands and the
//! supervised process run in a restricted one ([`RunAs::User`]).

use std::fmt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use super::identity::Identity;
use crate::error::GateError;

/// Execution context of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAs {
    /// The entrypoint's own credentials.
    Current,
    /// Dropped to the given account.
    User(Identity),
}

impl RunAs {
    /// Restricted context for `identity`, or the current one when none is
    /// configured.
    #[must_use]
    pub fn from_identity(identity: Option<&Identity>) -> Self {
        identity.map_or(Self::Current, |id| Self::User(id.clone()))
    }
}

/// A command line plus the context it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path, resolved through `PATH`.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory; inherited when `None`.
    pub working_dir: Option<PathBuf>,
    /// Identity the command runs as.
    pub run_as: RunAs,
}

impl CommandSpec {
    /// Creates a command running as the current identity.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            run_as: RunAs::Current,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the execution context.
    #[must_use]
    pub fn run_as(mut self, run_as: RunAs) -> Self {
        self.run_as = run_as;
        self
    }

    /// Builds the `std` command, applying the identity switch.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        if let RunAs::User(identity) = &self.run_as {
            // std drops supplementary groups when switching away from root.
            cmd.gid(identity.gid)
                .uid(identity.uid)
                .env("HOME", &identity.home)
                .env("USER", &identity.name)
                .env("LOGNAME", &identity.name);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs setup steps and hands over to the supervised process.
pub trait ProcessRunner {
    /// Runs `spec` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Spawn`] if it cannot start and
    /// [`GateError::StepFailed`] if it exits unsuccessfully.
    fn run(&mut self, spec: &CommandSpec) -> Result<(), GateError>;

    /// Replaces the current process with `spec`.
    ///
    /// A real implementation never returns on success.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Exec`] when the replacement fails.
    fn exec(&mut self, spec: &CommandSpec) -> Result<(), GateError>;
}

/// [`ProcessRunner`] backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, spec: &CommandSpec) -> Result<(), GateError> {
        tracing::info!(command = %spec, "running setup step");
        let status = spec
            .to_command()
            .status()
            .map_err(|source| GateError::Spawn {
                program: spec.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(GateError::StepFailed {
                step: spec.to_string(),
                status: status.to_string(),
            })
        }
    }

    fn exec(&mut self, spec: &CommandSpec) -> Result<(), GateError> {
        tracing::info!(command = %spec, "handing over to supervised process");
        let source = spec.to_command().exec();
        Err(GateError::Exec {
            program: spec.program.clone(),
            source,
        })
    }
}
