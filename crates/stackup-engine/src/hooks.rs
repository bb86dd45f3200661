use anyhow::{Context, Result};
use stackup_core::{run_checked, CommandRunner, CommandSpec, PostUpgradeConfig, UpgradeError};

/// Final configuration pass run after packages and schema are in place.
pub trait PostConfigure {
    fn run(&mut self) -> Result<()>;
}

/// Operator confirmation. Implementations treat unreadable input as a
/// refusal.
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Progress sink for the operator-facing step lines.
pub trait StepReporter {
    fn step_started(&mut self, label: &str);
    fn step_finished(&mut self, label: &str, error: Option<&UpgradeError>);
    fn line(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl StepReporter for SilentReporter {
    fn step_started(&mut self, _label: &str) {}

    fn step_finished(&mut self, _label: &str, _error: Option<&UpgradeError>) {}

    fn line(&mut self, _text: &str) {}
}

/// Runs the configured post-upgrade command line, if any.
pub struct CommandPostConfigure {
    runner: Box<dyn CommandRunner>,
    command: Vec<String>,
}

impl CommandPostConfigure {
    pub fn new(runner: Box<dyn CommandRunner>, config: &PostUpgradeConfig) -> Self {
        Self {
            runner,
            command: config.command.clone(),
        }
    }
}

impl PostConfigure for CommandPostConfigure {
    fn run(&mut self) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            tracing::debug!("no post upgrade command configured");
            return Ok(());
        };

        let spec = CommandSpec::new(program).args(args.iter().cloned());
        tracing::debug!(command = %spec, "running post upgrade command");
        run_checked(self.runner.as_ref(), &spec, "post upgrade command failed")
            .with_context(|| format!("failed to run {program}"))?;
        Ok(())
    }
}
