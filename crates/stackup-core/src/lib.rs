mod config;
mod error;
mod exec;
mod messages;

pub use config::{
    AuxiliaryServiceConfig, DatabaseConfig, LoggingConfig, PackageConfig, PostUpgradeConfig,
    ServiceConfig, UpgradeConfig, UpgradeOptions, DEFAULT_CONFIG_PATH,
};
pub use error::{FailureClass, UpgradeError};
pub use exec::{run_checked, CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use messages::Messages;

/// Timestamp used for backup files, temporary database names and log files.
/// Only `[0-9_]` so it can be embedded in a SQL identifier.
pub fn session_timestamp() -> String {
    chrono::Local::now().format("%Y_%m_%d_%H_%M_%S").to_string()
}
