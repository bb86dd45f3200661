use std::path::{Path, PathBuf};

use stackup_core::{FailureClass, UpgradeConfig, UpgradeError, UpgradeOptions};
use stackup_database::DatabaseLifecycleManager;
use stackup_packages::PackageUpdateCoordinator;
use stackup_services::{ServiceLifecycleManager, ServiceStatus};

use crate::hooks::{PostConfigure, Prompt, StepReporter};
use crate::outcome::{ExitOutcome, RollbackSummary, UpgradeReport};
use crate::session::UpgradeSession;

const CHECKING_UPDATES: &str = "Checking for updates... (This may take several minutes)";
const BACKUP_DATABASE: &str = "Backing Up Database";
const RENAME_DATABASE: &str = "Rename Database";
const UPDATE_PACKAGES: &str = "Updating packages";
const MIGRATE_DATABASE: &str = "Updating Database";
const RESTORE_DATABASE_NAME: &str = "Restore Database name";
const POST_CONFIGURE: &str = "Running post install configuration";
const RESTORE_DATABASE: &str = "Restoring Database";
const ROLLBACK_PACKAGES: &str = "Rolling back packages";
const PROCEED_QUESTION: &str = "Would you like to proceed";

/// The managers and seams one orchestrator drives.
pub struct Collaborators {
    pub packages: PackageUpdateCoordinator,
    pub database: DatabaseLifecycleManager,
    pub services: ServiceLifecycleManager,
    pub post_configure: Box<dyn PostConfigure>,
    pub prompt: Box<dyn Prompt>,
    pub reporter: Box<dyn StepReporter>,
}

pub struct UpgradeOrchestrator {
    config: UpgradeConfig,
    options: UpgradeOptions,
    packages: PackageUpdateCoordinator,
    database: DatabaseLifecycleManager,
    services: ServiceLifecycleManager,
    post_configure: Box<dyn PostConfigure>,
    prompt: Box<dyn Prompt>,
    reporter: Box<dyn StepReporter>,
    log_path: Option<PathBuf>,
}

impl UpgradeOrchestrator {
    pub fn new(config: UpgradeConfig, options: UpgradeOptions, parts: Collaborators) -> Self {
        Self {
            config,
            options,
            packages: parts.packages,
            database: parts.database,
            services: parts.services,
            post_configure: parts.post_configure,
            prompt: parts.prompt,
            reporter: parts.reporter,
            log_path: None,
        }
    }

    /// Log file mentioned in the success messages.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Runs one upgrade session. `Err` is reserved for failures before
    /// anything was changed that are not guard refusals (queries,
    /// credentials, the primary service status check).
    pub fn run(&mut self, timestamp: &str) -> Result<UpgradeReport, UpgradeError> {
        let mut session = UpgradeSession::new(&self.config, timestamp);
        let outcome = match self.preflight(&mut session)? {
            Some(outcome) => outcome,
            None => self.execute(&mut session),
        };
        tracing::info!(?outcome, "upgrade session finished");
        Ok(self.finish(session, outcome))
    }

    /// Steps 1-5 up to the operator's go-ahead. `Some` ends the session
    /// without side effects.
    fn preflight(&mut self, session: &mut UpgradeSession) -> Result<Option<ExitOutcome>, UpgradeError> {
        if let Err(err) = self.compatibility_guard(session) {
            return blocked(err);
        }

        self.reporter.line(CHECKING_UPDATES);
        if !self.packages.update_available(&mut session.packages)? {
            tracing::info!("no updates available");
            return Ok(Some(ExitOutcome::NoUpdateAvailable));
        }
        let candidates = session.packages.candidates().to_vec();
        self.reporter
            .line(&format!("{} Updates available:", candidates.len()));
        for candidate in &candidates {
            self.reporter.line(&format!(" * {candidate}"));
        }
        if self.options.check_only {
            return Ok(Some(ExitOutcome::CheckOnlyReport { candidates }));
        }

        if let Err(err) = self.update_guards(session) {
            return blocked(err);
        }

        let primary = self.services.primary().to_string();
        match self.services.primary_status()? {
            ServiceStatus::Running => {
                tracing::debug!(service = %primary, "primary service is up and running");
                if !self.options.unattended {
                    self.reporter.line(&format!(
                        "During the upgrade process, the {primary} service will not be accessible."
                    ));
                    if !self.prompt.confirm(PROCEED_QUESTION) {
                        tracing::debug!("operator chose not to stop the primary service");
                        return Ok(Some(ExitOutcome::UserDeclined));
                    }
                }
            }
            ServiceStatus::Stopped => {
                tracing::debug!(service = %primary, "primary service is not running");
            }
            ServiceStatus::DeadWithPid => {
                return Err(UpgradeError::ServiceControl {
                    service: primary,
                    message: "service is dead, but pid file exists".to_string(),
                });
            }
            ServiceStatus::Unknown(code) => {
                return Err(UpgradeError::ServiceControl {
                    service: primary,
                    message: format!("can't get service status (exit code {code})"),
                });
            }
        }
        Ok(None)
    }

    fn compatibility_guard(&mut self, session: &UpgradeSession) -> Result<(), UpgradeError> {
        let marker = &self.config.database.unsupported_version;
        if self.database.unsupported_version_present(
            &session.database,
            &self.config.database.compatibility_queries,
            marker,
        )? {
            tracing::error!(version = %marker, "unsupported compatibility version present");
            return Err(UpgradeError::UnsupportedVersion {
                version: marker.clone(),
            });
        }
        Ok(())
    }

    /// Setup-package and rollback-feasibility guards, in that order.
    fn update_guards(&mut self, session: &mut UpgradeSession) -> Result<(), UpgradeError> {
        let setup_package = &self.config.packages.setup_package;
        if session.packages.is_candidate(setup_package) && !self.options.force_current_setup {
            tracing::error!(package = %setup_package, "setup package has a pending update");
            return Err(UpgradeError::SetupPackageUpdate {
                package: setup_package.clone(),
            });
        }

        if self.options.rollback {
            let missing = self.packages.missing_for_rollback(&mut session.packages)?;
            if !missing.is_empty() {
                tracing::error!(?missing, "rollback would not be able to reinstall packages");
                return Err(UpgradeError::RollbackUnavailable { missing });
            }
        }
        Ok(())
    }

    fn execute(&mut self, session: &mut UpgradeSession) -> ExitOutcome {
        let db_relevant = self.db_relevant(session);
        tracing::debug!(db_relevant, "update set evaluated");

        if let Err(cause) = self.quiesce(session, db_relevant) {
            tracing::error!(error = %cause, "upgrade aborted before packages changed");
            self.restart_auxiliary(session);
            self.restart_primary(session);
            return ExitOutcome::Aborted { cause };
        }

        let outcome = match self.forward(session, db_relevant) {
            Ok(()) => ExitOutcome::Success,
            Err(cause) => {
                tracing::error!(error = %cause, "upgrade failed, rolling back");
                self.reporter.line("Error: Upgrade failed, rolling back");
                self.reporter.line(&format!(" **Reason: {cause}**"));
                let rollback = self.rollback(session);
                self.restart_auxiliary(session);
                ExitOutcome::FailedRolledBack { cause, rollback }
            }
        };
        self.restart_primary(session);
        outcome
    }

    fn quiesce(&mut self, session: &mut UpgradeSession, db_relevant: bool) -> Result<(), UpgradeError> {
        let label = format!("Stopping {} Service", self.services.primary());
        self.step(&label, |this| this.services.stop_primary())?;

        if db_relevant {
            for handle in &mut session.auxiliary {
                self.services.stop_if_running(handle, &mut session.messages);
            }
            self.step(BACKUP_DATABASE, |this| this.database.backup(&mut session.database))?;
            let temporary = self.config.database.temporary_name(&session.timestamp);
            self.step(RENAME_DATABASE, |this| {
                this.database.rename(&mut session.database, &temporary)
            })?;
        }
        Ok(())
    }

    fn forward(&mut self, session: &mut UpgradeSession, db_relevant: bool) -> Result<(), UpgradeError> {
        self.step(UPDATE_PACKAGES, |this| this.packages.apply(&mut session.packages))?;

        if db_relevant {
            self.step(MIGRATE_DATABASE, |this| this.database.migrate(&mut session.database))?;
            let original = session.database.original_name.clone();
            self.step(RESTORE_DATABASE_NAME, |this| {
                this.database.rename(&mut session.database, &original)
            })?;
            self.restart_auxiliary(session);
        }

        self.step(POST_CONFIGURE, |this| {
            this.post_configure
                .run()
                .map_err(|err| UpgradeError::PostConfiguration {
                    message: format!("{err:#}"),
                })
        })
    }

    /// Restore first, then undo packages. Each failure is logged and
    /// recorded, and the next compensation still runs.
    fn rollback(&mut self, session: &mut UpgradeSession) -> RollbackSummary {
        let mut summary = RollbackSummary::default();

        if session.database.touched() {
            // Auxiliary services restarted on the forward path hold
            // connections that would block the drop.
            for handle in &mut session.auxiliary {
                self.services.stop_if_running(handle, &mut session.messages);
            }
            match self.step(RESTORE_DATABASE, |this| this.database.restore(&mut session.database)) {
                Ok(()) => summary.database_restored = true,
                Err(err) => {
                    tracing::error!(error = %err, "database restore failed during rollback");
                    summary.failures.push(err);
                }
            }
        }

        if !session.packages.updated {
            return summary;
        }
        if !self.options.rollback {
            tracing::debug!("skipping package rollback");
            self.reporter.line("Skipping package rollback");
            summary.package_rollback_skipped = true;
            return summary;
        }
        match self.step(ROLLBACK_PACKAGES, |this| this.packages.rollback(&mut session.packages)) {
            Ok(()) => summary.packages_undone = session.packages.rolled_back,
            Err(err) => {
                tracing::error!(error = %err, "package rollback failed");
                summary.failures.push(err);
            }
        }
        summary
    }

    fn restart_auxiliary(&mut self, session: &mut UpgradeSession) {
        for handle in &mut session.auxiliary {
            self.services.start_if_we_stopped_it(handle, &mut session.messages);
        }
    }

    /// Attempted whatever happened before. A failure is reported but does
    /// not change the outcome.
    fn restart_primary(&mut self, session: &mut UpgradeSession) {
        let label = format!("Starting {}", self.services.primary());
        if let Err(err) = self.step(&label, |this| this.services.start_primary()) {
            tracing::error!(error = %err, "failed to start primary service");
            session
                .messages
                .push(format!("Error: Can't start {}", self.services.primary()));
            session.primary_restart_error = Some(err);
        }
    }

    fn db_relevant(&self, session: &UpgradeSession) -> bool {
        self.config
            .packages
            .db_packages
            .iter()
            .any(|name| session.packages.is_candidate(name))
    }

    fn finish(&mut self, mut session: UpgradeSession, outcome: ExitOutcome) -> UpgradeReport {
        let backup_location = session.database.backup_location().map(Path::to_path_buf);
        if let Some(path) = &backup_location {
            session
                .messages
                .push(format!("DB Backup available at {}", path.display()));
        }

        if outcome == ExitOutcome::Success {
            for (handle, service) in session
                .auxiliary
                .iter_mut()
                .zip(&self.config.services.auxiliary)
            {
                if let Some(notice) = &service.notice {
                    if self.services.is_installed(handle) {
                        session.messages.push(notice.clone());
                    }
                }
            }
            if let Some(path) = &self.log_path {
                session
                    .messages
                    .push(format!("Upgrade log available at {}", path.display()));
            }
        }

        UpgradeReport {
            outcome,
            messages: session.messages.into_vec(),
            backup_location,
            primary_restart_error: session.primary_restart_error,
        }
    }

    fn step<T>(
        &mut self,
        label: &str,
        op: impl FnOnce(&mut Self) -> Result<T, UpgradeError>,
    ) -> Result<T, UpgradeError> {
        self.reporter.step_started(label);
        let result = op(self);
        self.reporter.step_finished(label, result.as_ref().err());
        result
    }
}

/// Guard refusals end the session as `UpdateBlocked`; anything else raised
/// while checking is fatal.
fn blocked(err: UpgradeError) -> Result<Option<ExitOutcome>, UpgradeError> {
    match err.class() {
        FailureClass::Guard => Ok(Some(ExitOutcome::UpdateBlocked(err))),
        FailureClass::Step | FailureClass::Fatal => Err(err),
    }
}
