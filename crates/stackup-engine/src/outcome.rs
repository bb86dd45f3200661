use std::path::PathBuf;

use stackup_core::UpgradeError;
use stackup_packages::TransactionId;

/// What the compensating rollback managed to undo. Failures here never
/// replace the error that triggered the rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    pub database_restored: bool,
    pub packages_undone: Option<TransactionId>,
    pub package_rollback_skipped: bool,
    pub failures: Vec<UpgradeError>,
}

impl RollbackSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    NoUpdateAvailable,
    CheckOnlyReport { candidates: Vec<String> },
    /// A pre-flight guard refused the upgrade; nothing was changed.
    UpdateBlocked(UpgradeError),
    UserDeclined,
    Success,
    FailedRolledBack {
        cause: UpgradeError,
        rollback: RollbackSummary,
    },
    /// Quiesce or database preparation failed before any package changed.
    Aborted { cause: UpgradeError },
}

impl ExitOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NoUpdateAvailable | Self::UserDeclined | Self::Success => 0,
            Self::CheckOnlyReport { .. } => 100,
            Self::UpdateBlocked(UpgradeError::RollbackUnavailable { .. }) => 2,
            Self::UpdateBlocked(UpgradeError::SetupPackageUpdate { .. }) => 3,
            Self::UpdateBlocked(_) | Self::FailedRolledBack { .. } | Self::Aborted { .. } => 1,
        }
    }

    pub fn cause(&self) -> Option<&UpgradeError> {
        match self {
            Self::UpdateBlocked(cause)
            | Self::FailedRolledBack { cause, .. }
            | Self::Aborted { cause } => Some(cause),
            _ => None,
        }
    }
}

/// Produced once at session end, replacing any reporting tied to object
/// lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub outcome: ExitOutcome,
    pub messages: Vec<String>,
    /// Set only when this session took a backup that is still on disk.
    pub backup_location: Option<PathBuf>,
    pub primary_restart_error: Option<UpgradeError>,
}

impl UpgradeReport {
    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }
}
