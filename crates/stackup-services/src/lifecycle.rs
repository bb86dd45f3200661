use stackup_core::{Messages, UpgradeError};

use crate::{ServiceController, ServiceStatus};

/// An auxiliary service the session may quiesce. Only services this session
/// stopped are started again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub name: String,
    pub installed: Option<bool>,
    pub was_running: bool,
    pub stopped_by_us: bool,
}

impl ServiceHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installed: None,
            was_running: false,
            stopped_by_us: false,
        }
    }
}

pub struct ServiceLifecycleManager {
    controller: Box<dyn ServiceController>,
    primary: String,
}

impl ServiceLifecycleManager {
    pub fn new(controller: Box<dyn ServiceController>, primary: impl Into<String>) -> Self {
        Self {
            controller,
            primary: primary.into(),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn primary_status(&self) -> Result<ServiceStatus, UpgradeError> {
        tracing::debug!(service = %self.primary, "checking primary service status");
        self.controller
            .status(&self.primary)
            .map_err(|err| UpgradeError::service(&self.primary, &err))
    }

    pub fn stop_primary(&mut self) -> Result<(), UpgradeError> {
        tracing::debug!(service = %self.primary, "stopping primary service");
        self.controller
            .stop(&self.primary)
            .map_err(|err| UpgradeError::service(&self.primary, &err))
    }

    pub fn start_primary(&mut self) -> Result<(), UpgradeError> {
        tracing::debug!(service = %self.primary, "starting primary service");
        self.controller
            .start(&self.primary)
            .map_err(|err| UpgradeError::service(&self.primary, &err))
    }

    /// Installation check that degrades to "not installed" with a warning.
    pub fn is_installed(&self, handle: &mut ServiceHandle) -> bool {
        if let Some(installed) = handle.installed {
            return installed;
        }
        let installed = match self.controller.is_installed(&handle.name) {
            Ok(installed) => installed,
            Err(err) => {
                tracing::warn!(service = %handle.name, error = %format!("{err:#}"), "failed to check service installation");
                false
            }
        };
        handle.installed = Some(installed);
        installed
    }

    pub fn stop_if_running(&mut self, handle: &mut ServiceHandle, messages: &mut Messages) {
        if handle.stopped_by_us || !self.is_installed(handle) {
            return;
        }

        let status = match self.controller.status(&handle.name) {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(service = %handle.name, error = %format!("{err:#}"), "failed to query service");
                messages.push(format!("Error: Can't stop the {} service", handle.name));
                return;
            }
        };
        handle.was_running = status == ServiceStatus::Running;
        if !handle.was_running {
            tracing::debug!(service = %handle.name, ?status, "service not running, leaving it alone");
            return;
        }

        tracing::debug!(service = %handle.name, "stopping service");
        match self.controller.stop(&handle.name) {
            Ok(()) => handle.stopped_by_us = true,
            Err(err) => {
                tracing::warn!(service = %handle.name, error = %format!("{err:#}"), "failed to stop service");
                messages.push(format!("Error: Can't stop the {} service", handle.name));
            }
        }
    }

    pub fn start_if_we_stopped_it(&mut self, handle: &mut ServiceHandle, messages: &mut Messages) {
        if !handle.stopped_by_us || !self.is_installed(handle) {
            return;
        }

        tracing::debug!(service = %handle.name, "starting service");
        match self.controller.start(&handle.name) {
            Ok(()) => handle.stopped_by_us = false,
            Err(err) => {
                tracing::warn!(service = %handle.name, error = %format!("{err:#}"), "failed to start service");
                messages.push(format!("Error: Can't start the {} service", handle.name));
            }
        }
    }
}
