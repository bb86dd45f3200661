use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

/// An external program invocation. Built by the adapters, executed by a
/// [`CommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `-1` when the process was killed by a signal.
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

pub trait CommandRunner {
    /// Runs to completion. Only a failure to spawn is an error; the exit
    /// status is reported in the output.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Fail-fast wrapper: a non-zero exit status becomes an error.
pub fn run_checked(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    context_message: &str,
) -> Result<CommandOutput> {
    let output = runner
        .run(spec)
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.success() {
        return Ok(output);
    }

    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        output.stdout.trim(),
        output.stderr.trim()
    ))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %spec, "executing command");
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .with_context(|| format!("failed to execute {}", spec.program))?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        };
        tracing::debug!(
            command = %spec,
            status = result.status,
            stdout = %result.stdout.trim(),
            stderr = %result.stderr.trim(),
            "command finished"
        );
        Ok(result)
    }
}
