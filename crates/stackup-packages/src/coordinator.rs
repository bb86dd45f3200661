use stackup_core::{PackageConfig, UpgradeError};

use crate::history::TransactionId;
use crate::PackageManager;

/// Installed and updatable identifiers for the tracked set, captured once
/// per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSnapshot {
    pub installed: Vec<String>,
    pub updatable: Vec<String>,
}

/// Package half of an upgrade session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageState {
    pub snapshot: Option<PackageSnapshot>,
    /// Newest history id before apply; `None` when the package has no
    /// history yet.
    pub baseline: Option<TransactionId>,
    pub updated: bool,
    pub rolled_back: Option<TransactionId>,
}

impl PackageState {
    /// Substring match against the updatable identifiers, so a bare package
    /// name matches its versioned identifier.
    pub fn is_candidate(&self, name: &str) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.updatable.iter().any(|id| id.contains(name)))
    }

    pub fn candidates(&self) -> &[String] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.updatable.as_slice())
            .unwrap_or_default()
    }
}

pub struct PackageUpdateCoordinator {
    manager: Box<dyn PackageManager>,
    tracked: Vec<String>,
    lock_key: String,
    lock_packages: Vec<String>,
}

impl PackageUpdateCoordinator {
    pub fn new(manager: Box<dyn PackageManager>, config: &PackageConfig) -> Self {
        Self {
            manager,
            tracked: config.tracked.clone(),
            lock_key: config.lock_key.clone(),
            lock_packages: config.lock_packages.clone(),
        }
    }

    pub fn update_available(&self, state: &mut PackageState) -> Result<bool, UpgradeError> {
        if let Some(snapshot) = &state.snapshot {
            return Ok(!snapshot.updatable.is_empty());
        }

        tracing::debug!(packages = ?self.tracked, "listing package updates");
        let installed = self.manager.installed(&self.tracked).map_err(query_error)?;
        let updatable = self.manager.updatable(&self.tracked).map_err(query_error)?;
        tracing::debug!(?installed, "installed packages");
        if updatable.is_empty() {
            tracing::debug!("no packages marked for update");
        } else {
            tracing::debug!(count = updatable.len(), ?updatable, "packages marked for update");
        }

        let available = !updatable.is_empty();
        state.snapshot = Some(PackageSnapshot {
            installed,
            updatable,
        });
        Ok(available)
    }

    /// Installed identifiers the repositories no longer carry. A rollback
    /// would be unable to reinstall any of them.
    pub fn missing_for_rollback(&self, state: &mut PackageState) -> Result<Vec<String>, UpgradeError> {
        self.update_available(state)?;
        let installed = state
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.installed.clone())
            .unwrap_or_default();

        let available = self.manager.available(&self.tracked).map_err(query_error)?;
        tracing::debug!(count = available.len(), ?available, "packages available in repositories");
        let missing = installed
            .into_iter()
            .filter(|id| !available.contains(id))
            .collect::<Vec<_>>();
        for id in &missing {
            tracing::debug!(package = %id, "not available in repositories");
        }
        Ok(missing)
    }

    pub fn rollback_available(&self, state: &mut PackageState) -> Result<bool, UpgradeError> {
        Ok(self.missing_for_rollback(state)?.is_empty())
    }

    pub fn apply(&mut self, state: &mut PackageState) -> Result<(), UpgradeError> {
        state.baseline = self
            .latest_transaction()
            .map_err(|message| UpgradeError::PackageUpdate { message })?;
        tracing::debug!(baseline = ?state.baseline, "pre-upgrade transaction");

        self.unlock_or_relock()?;
        tracing::debug!("package update started");
        let result = self.manager.apply_update(&self.tracked);
        if result.is_ok() {
            state.updated = true;
        }
        let relock = self.relock();

        result.map_err(|err| UpgradeError::PackageUpdate {
            message: format!("{err:#}"),
        })?;
        relock?;
        tracing::debug!("package update completed successfully");
        Ok(())
    }

    /// Undoes the update transaction recorded after the baseline. A no-op
    /// when nothing was applied this session.
    pub fn rollback(&mut self, state: &mut PackageState) -> Result<(), UpgradeError> {
        if !state.updated {
            tracing::debug!("no package rollback needed");
            return Ok(());
        }

        let target = self
            .latest_update_transaction()
            .map_err(|message| UpgradeError::PackageRollback { message })?;
        let target = match (target, state.baseline) {
            (Some(target), Some(baseline)) if target > baseline => target,
            (Some(target), None) => target,
            (target, baseline) => {
                let target = target.map_or_else(|| "none".to_string(), |id| id.to_string());
                let baseline = baseline.map_or_else(|| "none".to_string(), |id| id.to_string());
                tracing::error!(%target, %baseline, "no update transaction newer than baseline");
                return Err(UpgradeError::RollbackStaleness { target, baseline });
            }
        };

        self.unlock_or_relock()?;
        tracing::debug!(%target, "package rollback started");
        let result = self.manager.undo(target);
        if result.is_ok() {
            state.updated = false;
            state.rolled_back = Some(target);
        }
        let relock = self.relock();

        result.map_err(|err| UpgradeError::PackageRollback {
            message: format!("{err:#}"),
        })?;
        relock?;
        tracing::debug!(%target, "package rollback completed successfully");
        Ok(())
    }

    fn latest_transaction(&self) -> Result<Option<TransactionId>, String> {
        let history = self
            .manager
            .history(&self.lock_key)
            .map_err(|err| format!("{err:#}"))?;
        Ok(history.first().map(|entry| entry.id))
    }

    fn latest_update_transaction(&self) -> Result<Option<TransactionId>, String> {
        let history = self
            .manager
            .history(&self.lock_key)
            .map_err(|err| format!("{err:#}"))?;
        Ok(history
            .iter()
            .find(|entry| entry.is_update())
            .map(|entry| entry.id))
    }

    /// A failed unlock may have left the lock file half rewritten, so the
    /// lock is restored before the error is returned.
    fn unlock_or_relock(&mut self) -> Result<(), UpgradeError> {
        let Err(err) = self.manager.unlock(&self.lock_key) else {
            return Ok(());
        };
        tracing::error!(error = %format!("{err:#}"), "failed to lift version lock");
        if self.relock().is_ok() {
            tracing::debug!("version lock restored after failed unlock");
        }
        Err(UpgradeError::VersionLock {
            message: format!("{err:#}"),
        })
    }

    fn relock(&mut self) -> Result<(), UpgradeError> {
        self.manager.lock(&self.lock_packages).map_err(|err| {
            tracing::error!(error = %format!("{err:#}"), "failed to restore version lock");
            UpgradeError::VersionLock {
                message: format!("{err:#}"),
            }
        })
    }
}

fn query_error(err: anyhow::Error) -> UpgradeError {
    UpgradeError::PackageQuery {
        message: format!("{err:#}"),
    }
}
