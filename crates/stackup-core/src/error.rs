//! Error taxonomy for an upgrade session.
//!
//! Guard errors are raised before anything is mutated. Step errors are raised
//! once the session has side effects and drive the rollback protocol.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Pre-flight refusal; nothing changed.
    Guard,
    /// A forward step failed after mutation started.
    Step,
    /// Plumbing failure outside the upgrade workflow.
    Fatal,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpgradeError {
    #[error(
        "a data center or cluster with compatibility version {version} was found; \
         upgrade all {version} data centers and clusters and rerun the upgrade"
    )]
    UnsupportedVersion { version: String },

    #[error("a new {package} package is available; update it first or force the current one")]
    SetupPackageUpdate { package: String },

    #[error("installed packages are missing from the repositories: {}", .missing.join(", "))]
    RollbackUnavailable { missing: Vec<String> },

    #[error("unable to query packages: {message}")]
    PackageQuery { message: String },

    #[error("package update failed: {message}")]
    PackageUpdate { message: String },

    #[error("version lock file update failed: {message}")]
    VersionLock { message: String },

    #[error("package transaction mismatch: target {target} is not newer than {baseline}")]
    RollbackStaleness { target: String, baseline: String },

    #[error("package rollback failed: {message}")]
    PackageRollback { message: String },

    #[error("database query failed: {message}")]
    DatabaseQuery { message: String },

    #[error("database backup failed: {message}")]
    Backup { message: String },

    #[error(
        "database rename from {from} to {to} failed; check that there are no active \
         connections to the database: {message}"
    )]
    Rename {
        from: String,
        to: String,
        message: String,
    },

    #[error("database update failed: {message}")]
    Migration { message: String },

    #[error("database restore failed: {message}")]
    Restore { message: String },

    #[error("service {service}: {message}")]
    ServiceControl { service: String, message: String },

    #[error("post install configuration failed: {message}")]
    PostConfiguration { message: String },

    #[error("database credentials: {message}")]
    Credentials { message: String },

    #[error("configuration: {message}")]
    Config { message: String },
}

impl UpgradeError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::UnsupportedVersion { .. }
            | Self::SetupPackageUpdate { .. }
            | Self::RollbackUnavailable { .. } => FailureClass::Guard,
            Self::PackageUpdate { .. }
            | Self::VersionLock { .. }
            | Self::RollbackStaleness { .. }
            | Self::PackageRollback { .. }
            | Self::Backup { .. }
            | Self::Rename { .. }
            | Self::Migration { .. }
            | Self::Restore { .. }
            | Self::ServiceControl { .. }
            | Self::PostConfiguration { .. } => FailureClass::Step,
            Self::PackageQuery { .. }
            | Self::DatabaseQuery { .. }
            | Self::Credentials { .. }
            | Self::Config { .. } => FailureClass::Fatal,
        }
    }

    pub fn service(service: &str, err: &anyhow::Error) -> Self {
        Self::ServiceControl {
            service: service.to_string(),
            message: format!("{err:#}"),
        }
    }
}
