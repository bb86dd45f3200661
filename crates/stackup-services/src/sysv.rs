use std::path::PathBuf;

use anyhow::{Context, Result};
use stackup_core::{run_checked, CommandRunner, CommandSpec, ServiceConfig};

use crate::{ServiceController, ServiceStatus};

/// Init-script services driven through the `service` wrapper.
pub struct SysvServiceController {
    runner: Box<dyn CommandRunner>,
    service_exec: String,
    init_dir: PathBuf,
}

impl SysvServiceController {
    pub fn new(runner: Box<dyn CommandRunner>, config: &ServiceConfig) -> Self {
        Self {
            runner,
            service_exec: config.service_exec.clone(),
            init_dir: config.init_dir.clone(),
        }
    }

    fn command(&self, name: &str, action: &str) -> CommandSpec {
        CommandSpec::new(&self.service_exec).args([name, action])
    }
}

impl ServiceController for SysvServiceController {
    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.init_dir.join(name).is_file())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let output = self
            .runner
            .run(&self.command(name, "status"))
            .with_context(|| format!("can't get {name} service status"))?;
        Ok(ServiceStatus::from_exit_code(output.status))
    }

    fn start(&mut self, name: &str) -> Result<()> {
        run_checked(
            self.runner.as_ref(),
            &self.command(name, "start"),
            &format!("can't start the {name} service"),
        )?;
        Ok(())
    }

    fn stop(&mut self, name: &str) -> Result<()> {
        run_checked(
            self.runner.as_ref(),
            &self.command(name, "stop"),
            &format!("can't stop the {name} service"),
        )?;
        Ok(())
    }
}
