use anyhow::Result;

mod lifecycle;
mod sysv;

pub use lifecycle::{ServiceHandle, ServiceLifecycleManager};
pub use sysv::SysvServiceController;

/// LSB `status` exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    /// The process died but left its pid file behind.
    DeadWithPid,
    Stopped,
    Unknown(i32),
}

impl ServiceStatus {
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Running,
            1 => Self::DeadWithPid,
            3 => Self::Stopped,
            other => Self::Unknown(other),
        }
    }
}

pub trait ServiceController {
    fn is_installed(&self, name: &str) -> Result<bool>;
    fn status(&self, name: &str) -> Result<ServiceStatus>;
    fn start(&mut self, name: &str) -> Result<()>;
    fn stop(&mut self, name: &str) -> Result<()>;
}
