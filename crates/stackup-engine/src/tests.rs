use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use stackup_core::{
    CommandOutput, CommandRunner, CommandSpec, PostUpgradeConfig, UpgradeConfig, UpgradeError,
    UpgradeOptions,
};
use stackup_database::{DatabaseClient, DatabaseLifecycleManager, SchemaMigrator};
use stackup_packages::{HistoryEntry, PackageManager, PackageUpdateCoordinator, TransactionId};
use stackup_services::{ServiceController, ServiceLifecycleManager, ServiceStatus};

use super::*;

const TIMESTAMP: &str = "2012_05_02_12_00_00";
const TEMPORARY_DB: &str = "engine_2012_05_02_12_00_00";
const INSTALLED: &[&str] = &[
    "ovirt-engine-3.0.0-1.fc16.noarch",
    "ovirt-engine-backend-3.0.0-1.fc16.noarch",
    "ovirt-engine-setup-3.0.0-1.fc16.noarch",
    "ovirt-engine-webadmin-portal-3.0.0-1.fc16.noarch",
];
const WEBADMIN_UPDATE: &str = "ovirt-engine-webadmin-portal-3.1.0-2.fc17.noarch";
const BACKEND_UPDATE: &str = "ovirt-engine-backend-3.1.0-2.fc17.noarch";
const SETUP_UPDATE: &str = "ovirt-engine-setup-3.1.0-2.fc17.noarch";

struct Host {
    /// Every call that changes the system, in order.
    journal: Vec<String>,
    /// Operator-facing lines and step results.
    report: Vec<String>,
    installed: Vec<String>,
    available: Vec<String>,
    updatable: Vec<String>,
    history: Vec<HistoryEntry>,
    record_transaction: bool,
    compat_rows: Vec<String>,
    primary_status: ServiceStatus,
    aux_installed: Vec<String>,
    aux_running: Vec<String>,
    answer: bool,
    failing: Vec<String>,
}

/// One fake standing in for every collaborator so all calls land in a
/// single ordered journal.
#[derive(Clone)]
struct FakeHost {
    host: Rc<RefCell<Host>>,
}

impl FakeHost {
    fn with_updates(updatable: &[&str]) -> Self {
        let to_strings = |items: &[&str]| items.iter().map(|item| item.to_string()).collect::<Vec<_>>();
        let mut available = to_strings(INSTALLED);
        available.extend(to_strings(updatable));
        Self {
            host: Rc::new(RefCell::new(Host {
                journal: Vec::new(),
                report: Vec::new(),
                installed: to_strings(INSTALLED),
                available,
                updatable: to_strings(updatable),
                history: vec![entry(12, "Install"), entry(11, "Update")],
                record_transaction: true,
                compat_rows: vec!["3.0".to_string()],
                primary_status: ServiceStatus::Running,
                aux_installed: vec!["ovirt-engine-etl".to_string()],
                aux_running: vec!["ovirt-engine-etl".to_string()],
                answer: true,
                failing: Vec::new(),
            })),
        }
    }

    fn fail(&self, what: &str) {
        self.host.borrow_mut().failing.push(what.to_string());
    }

    fn journal(&self) -> Vec<String> {
        self.host.borrow().journal.clone()
    }

    fn report(&self) -> Vec<String> {
        self.host.borrow().report.clone()
    }

    fn record(&self, call: String, what: &str) -> Result<()> {
        let mut host = self.host.borrow_mut();
        host.journal.push(call.clone());
        if host.failing.iter().any(|entry| entry == what) {
            return Err(anyhow!("{call} failed"));
        }
        Ok(())
    }
}

impl PackageManager for FakeHost {
    fn installed(&self, _names: &[String]) -> Result<Vec<String>> {
        Ok(self.host.borrow().installed.clone())
    }

    fn available(&self, _names: &[String]) -> Result<Vec<String>> {
        Ok(self.host.borrow().available.clone())
    }

    fn updatable(&self, _names: &[String]) -> Result<Vec<String>> {
        Ok(self.host.borrow().updatable.clone())
    }

    fn apply_update(&mut self, _names: &[String]) -> Result<()> {
        self.record("apply".to_string(), "apply")?;
        let mut host = self.host.borrow_mut();
        if host.record_transaction {
            let next = host.history.first().map(|entry| entry.id.0 + 1).unwrap_or(1);
            host.history.insert(0, entry(next, "I, U"));
        }
        Ok(())
    }

    fn history(&self, _name: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self.host.borrow().history.clone())
    }

    fn undo(&mut self, id: TransactionId) -> Result<()> {
        self.record(format!("undo:{id}"), "undo")
    }

    fn lock(&mut self, _names: &[String]) -> Result<()> {
        self.record("lock".to_string(), "lock")
    }

    fn unlock(&mut self, key: &str) -> Result<()> {
        self.record(format!("unlock:{key}"), "unlock")
    }
}

impl DatabaseClient for FakeHost {
    fn execute(&mut self, _database: &str, sql: &str) -> Result<Vec<String>> {
        if sql.starts_with("ALTER DATABASE") {
            self.record(format!("sql:{sql}"), "rename")?;
            return Ok(Vec::new());
        }
        Ok(self.host.borrow().compat_rows.clone())
    }

    fn dump(&mut self, database: &str, target: &Path) -> Result<()> {
        self.record(format!("dump:{database}"), "dump")?;
        std::fs::write(target, "-- dump\n")?;
        Ok(())
    }

    fn restore(&mut self, dump: &Path) -> Result<()> {
        self.record(format!("restore:{}", dump.display()), "restore")
    }

    fn drop_database(&mut self, database: &str) -> Result<()> {
        self.record(format!("drop:{database}"), "drop")
    }
}

impl SchemaMigrator for FakeHost {
    fn migrate(&mut self, database: &str) -> Result<()> {
        self.record(format!("migrate:{database}"), "migrate")
    }
}

impl ServiceController for FakeHost {
    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(name == "ovirt-engine" || self.host.borrow().aux_installed.iter().any(|entry| entry == name))
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let host = self.host.borrow();
        if name == "ovirt-engine" {
            return Ok(host.primary_status);
        }
        Ok(if host.aux_running.iter().any(|entry| entry == name) {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        })
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.record(format!("start:{name}"), &format!("start:{name}"))
    }

    fn stop(&mut self, name: &str) -> Result<()> {
        self.record(format!("stop:{name}"), &format!("stop:{name}"))
    }
}

impl PostConfigure for FakeHost {
    fn run(&mut self) -> Result<()> {
        self.record("post".to_string(), "post")
    }
}

impl Prompt for FakeHost {
    fn confirm(&mut self, question: &str) -> bool {
        let mut host = self.host.borrow_mut();
        host.report.push(format!("prompt:{question}"));
        host.answer
    }
}

impl StepReporter for FakeHost {
    fn step_started(&mut self, _label: &str) {}

    fn step_finished(&mut self, label: &str, error: Option<&UpgradeError>) {
        let status = if error.is_some() { "ERROR" } else { "DONE" };
        self.host.borrow_mut().report.push(format!("{label}... [ {status} ]"));
    }

    fn line(&mut self, text: &str) {
        self.host.borrow_mut().report.push(text.to_string());
    }
}

fn entry(id: u64, action: &str) -> HistoryEntry {
    HistoryEntry {
        id: TransactionId(id),
        action: action.to_string(),
    }
}

fn test_config(dir: &Path) -> UpgradeConfig {
    let mut config = UpgradeConfig::default();
    config.database.backup_dir = dir.join("backups");
    config
}

fn orchestrator(host: &FakeHost, config: &UpgradeConfig, options: UpgradeOptions) -> UpgradeOrchestrator {
    UpgradeOrchestrator::new(
        config.clone(),
        options,
        Collaborators {
            packages: PackageUpdateCoordinator::new(Box::new(host.clone()), &config.packages),
            database: DatabaseLifecycleManager::new(
                Box::new(host.clone()),
                Box::new(host.clone()),
                &config.database,
            ),
            services: ServiceLifecycleManager::new(Box::new(host.clone()), config.services.primary.clone()),
            post_configure: Box::new(host.clone()),
            prompt: Box::new(host.clone()),
            reporter: Box::new(host.clone()),
        },
    )
}

fn run(host: &FakeHost, config: &UpgradeConfig, options: UpgradeOptions) -> UpgradeReport {
    orchestrator(host, config, options)
        .run(TIMESTAMP)
        .expect("session must produce a report")
}

fn backup_files(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("backups"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn no_updates_leaves_database_and_services_alone() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[]);
    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());

    assert_eq!(report.outcome, ExitOutcome::NoUpdateAvailable);
    assert_eq!(report.exit_code(), 0);
    assert!(host.journal().is_empty(), "unexpected calls: {:?}", host.journal());
    assert_eq!(backup_files(dir.path()), 0);
    assert_eq!(report.backup_location, None);
}

#[test]
fn check_only_reports_candidates_without_changes() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE, SETUP_UPDATE]);
    let options = UpgradeOptions {
        check_only: true,
        ..UpgradeOptions::default()
    };
    let report = run(&host, &test_config(dir.path()), options);

    assert_eq!(
        report.outcome,
        ExitOutcome::CheckOnlyReport {
            candidates: strings(&[WEBADMIN_UPDATE, SETUP_UPDATE]),
        }
    );
    assert_eq!(report.exit_code(), 100);
    assert!(host.journal().is_empty());
    let lines = host.report();
    assert!(lines.contains(&"2 Updates available:".to_string()), "report: {lines:?}");
    assert!(lines.contains(&format!(" * {WEBADMIN_UPDATE}")));
    assert!(!lines.iter().any(|line| line.starts_with("prompt:")));
}

#[test]
fn package_only_update_skips_database_steps() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = test_config(dir.path());
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    let report = orchestrator(&host, &config, UpgradeOptions::default())
        .with_log_path("/var/log/ovirt-engine/ovirt-engine-upgrade_2012_05_02_12_00_00.log")
        .run(TIMESTAMP)
        .expect("must run");

    assert_eq!(report.outcome, ExitOutcome::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        host.journal(),
        vec![
            "stop:ovirt-engine",
            "unlock:ovirt-engine",
            "apply",
            "lock",
            "post",
            "start:ovirt-engine",
        ]
    );
    assert_eq!(backup_files(dir.path()), 0);
    assert_eq!(report.backup_location, None);

    let etl_notice = config.services.auxiliary[0]
        .notice
        .clone()
        .expect("etl carries a notice by default");
    assert_eq!(
        report.messages,
        vec![
            etl_notice,
            "Upgrade log available at /var/log/ovirt-engine/ovirt-engine-upgrade_2012_05_02_12_00_00.log"
                .to_string(),
        ]
    );
    assert!(host.report().contains(&"prompt:Would you like to proceed".to_string()));
}

#[test]
fn migration_failure_restores_database_and_undoes_packages() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = test_config(dir.path());
    let backup = config.database.backup_path(TIMESTAMP);
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.fail("migrate");

    let report = run(&host, &config, UpgradeOptions::default());

    assert_eq!(
        report.outcome,
        ExitOutcome::FailedRolledBack {
            cause: UpgradeError::Migration {
                message: format!("migrate:{TEMPORARY_DB} failed"),
            },
            rollback: RollbackSummary {
                database_restored: true,
                packages_undone: Some(TransactionId(13)),
                package_rollback_skipped: false,
                failures: Vec::new(),
            },
        }
    );
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        host.journal(),
        vec![
            "stop:ovirt-engine".to_string(),
            "stop:ovirt-engine-etl".to_string(),
            "dump:engine".to_string(),
            format!("sql:ALTER DATABASE engine RENAME TO {TEMPORARY_DB}"),
            "unlock:ovirt-engine".to_string(),
            "apply".to_string(),
            "lock".to_string(),
            format!("migrate:{TEMPORARY_DB}"),
            format!("drop:{TEMPORARY_DB}"),
            format!("restore:{}", backup.display()),
            "unlock:ovirt-engine".to_string(),
            "undo:13".to_string(),
            "lock".to_string(),
            "start:ovirt-engine-etl".to_string(),
            "start:ovirt-engine".to_string(),
        ]
    );
    assert_eq!(report.backup_location.as_deref(), Some(backup.as_path()));
    assert!(report
        .messages
        .contains(&format!("DB Backup available at {}", backup.display())));
    assert!(host.report().contains(&"Updating Database... [ ERROR ]".to_string()));
}

#[test]
fn setup_package_update_blocks_with_exit_three() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE, SETUP_UPDATE]);
    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());

    assert_eq!(
        report.outcome,
        ExitOutcome::UpdateBlocked(UpgradeError::SetupPackageUpdate {
            package: "ovirt-engine-setup".to_string(),
        })
    );
    assert_eq!(report.exit_code(), 3);
    assert!(host.journal().is_empty(), "unexpected calls: {:?}", host.journal());
    assert_eq!(backup_files(dir.path()), 0);
}

#[test]
fn forcing_current_setup_package_proceeds() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE, SETUP_UPDATE]);
    let options = UpgradeOptions {
        force_current_setup: true,
        ..UpgradeOptions::default()
    };
    let report = run(&host, &test_config(dir.path()), options);

    assert_eq!(report.outcome, ExitOutcome::Success);
    assert!(host.journal().contains(&"apply".to_string()));
}

#[test]
fn missing_rollback_packages_block_with_exit_two() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    host.host
        .borrow_mut()
        .available
        .retain(|id| !id.starts_with("ovirt-engine-backend-3.0.0"));

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    assert_eq!(
        report.outcome,
        ExitOutcome::UpdateBlocked(UpgradeError::RollbackUnavailable {
            missing: strings(&["ovirt-engine-backend-3.0.0-1.fc16.noarch"]),
        })
    );
    assert_eq!(report.exit_code(), 2);
    assert!(host.journal().is_empty());

    let options = UpgradeOptions {
        rollback: false,
        ..UpgradeOptions::default()
    };
    let report = run(&host, &test_config(dir.path()), options);
    assert_eq!(report.outcome, ExitOutcome::Success);
}

#[test]
fn unsupported_compatibility_version_blocks_before_update_check() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.host.borrow_mut().compat_rows = strings(&["3.0", " 2.2 "]);

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    assert_eq!(
        report.outcome,
        ExitOutcome::UpdateBlocked(UpgradeError::UnsupportedVersion {
            version: "2.2".to_string(),
        })
    );
    assert_eq!(report.exit_code(), 1);
    assert!(host.journal().is_empty());
    assert!(host.report().is_empty(), "update check must not run: {:?}", host.report());
}

#[test]
fn declining_the_prompt_changes_nothing() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.host.borrow_mut().answer = false;

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    assert_eq!(report.outcome, ExitOutcome::UserDeclined);
    assert_eq!(report.exit_code(), 0);
    assert!(host.journal().is_empty());
    assert!(report.messages.is_empty());
}

#[test]
fn unattended_and_stopped_primary_skip_the_prompt() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = test_config(dir.path());

    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    host.host.borrow_mut().answer = false;
    let options = UpgradeOptions {
        unattended: true,
        ..UpgradeOptions::default()
    };
    assert_eq!(run(&host, &config, options).outcome, ExitOutcome::Success);

    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    {
        let mut state = host.host.borrow_mut();
        state.answer = false;
        state.primary_status = ServiceStatus::Stopped;
    }
    assert_eq!(
        run(&host, &config, UpgradeOptions::default()).outcome,
        ExitOutcome::Success
    );
    assert!(!host.report().iter().any(|line| line.starts_with("prompt:")));
}

#[test]
fn dead_primary_service_is_fatal_before_changes() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    host.host.borrow_mut().primary_status = ServiceStatus::DeadWithPid;

    let err = orchestrator(&host, &test_config(dir.path()), UpgradeOptions::default())
        .run(TIMESTAMP)
        .expect_err("dead primary service must stop the session");
    assert_eq!(
        err,
        UpgradeError::ServiceControl {
            service: "ovirt-engine".to_string(),
            message: "service is dead, but pid file exists".to_string(),
        }
    );
    assert!(host.journal().is_empty());
}

#[test]
fn apply_failure_restores_renamed_database_without_package_undo() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = test_config(dir.path());
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.fail("apply");

    let report = run(&host, &config, UpgradeOptions::default());
    let ExitOutcome::FailedRolledBack { cause, rollback } = &report.outcome else {
        panic!("unexpected outcome: {:?}", report.outcome);
    };
    assert!(matches!(cause, UpgradeError::PackageUpdate { .. }), "unexpected cause: {cause}");
    assert!(rollback.database_restored);
    assert_eq!(rollback.packages_undone, None);

    let journal = host.journal();
    assert!(journal.contains(&format!("drop:{TEMPORARY_DB}")));
    assert!(journal.contains(&format!(
        "restore:{}",
        config.database.backup_path(TIMESTAMP).display()
    )));
    assert!(!journal.iter().any(|call| call.starts_with("undo:")));
    assert!(!journal.iter().any(|call| call.starts_with("migrate:")));
    assert_eq!(journal.last().map(String::as_str), Some("start:ovirt-engine"));
}

#[test]
fn post_configuration_failure_rolls_back_migrated_database() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = test_config(dir.path());
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.fail("post");

    let report = run(&host, &config, UpgradeOptions::default());
    assert!(matches!(
        report.outcome,
        ExitOutcome::FailedRolledBack {
            cause: UpgradeError::PostConfiguration { .. },
            ..
        }
    ));
    let journal = host.journal();
    let tail = &journal[journal.len() - 11..];
    assert_eq!(
        tail,
        &[
            format!("sql:ALTER DATABASE {TEMPORARY_DB} RENAME TO engine"),
            "start:ovirt-engine-etl".to_string(),
            "post".to_string(),
            "stop:ovirt-engine-etl".to_string(),
            "drop:engine".to_string(),
            format!("restore:{}", config.database.backup_path(TIMESTAMP).display()),
            "unlock:ovirt-engine".to_string(),
            "undo:13".to_string(),
            "lock".to_string(),
            "start:ovirt-engine-etl".to_string(),
            "start:ovirt-engine".to_string(),
        ]
    );
}

#[test]
fn stale_history_refuses_package_rollback() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    host.host.borrow_mut().record_transaction = false;
    host.fail("post");

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    let ExitOutcome::FailedRolledBack { rollback, .. } = &report.outcome else {
        panic!("unexpected outcome: {:?}", report.outcome);
    };
    assert_eq!(
        rollback.failures,
        vec![UpgradeError::RollbackStaleness {
            target: "11".to_string(),
            baseline: "12".to_string(),
        }]
    );
    assert!(!host.journal().iter().any(|call| call.starts_with("undo:")));
    assert_eq!(
        host.journal().last().map(String::as_str),
        Some("start:ovirt-engine")
    );
}

#[test]
fn history_without_update_transaction_refuses_package_rollback() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    {
        let mut state = host.host.borrow_mut();
        state.history = vec![entry(12, "Install")];
        state.record_transaction = false;
    }
    host.fail("post");

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    let ExitOutcome::FailedRolledBack { rollback, .. } = &report.outcome else {
        panic!("unexpected outcome: {:?}", report.outcome);
    };
    assert_eq!(
        rollback.failures,
        vec![UpgradeError::RollbackStaleness {
            target: "none".to_string(),
            baseline: "12".to_string(),
        }]
    );
    assert!(!host.journal().iter().any(|call| call.starts_with("undo:")));
}

#[test]
fn restore_failure_still_undoes_packages() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.fail("migrate");
    host.fail("drop");

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    let ExitOutcome::FailedRolledBack { cause, rollback } = &report.outcome else {
        panic!("unexpected outcome: {:?}", report.outcome);
    };
    assert!(matches!(cause, UpgradeError::Migration { .. }), "cause replaced: {cause}");
    assert!(!rollback.database_restored);
    assert!(matches!(rollback.failures.as_slice(), [UpgradeError::Restore { .. }]));
    assert_eq!(rollback.packages_undone, Some(TransactionId(13)));
    assert!(host.journal().contains(&"undo:13".to_string()));
}

#[test]
fn rename_failure_aborts_and_removes_backup() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[BACKEND_UPDATE]);
    host.fail("rename");

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    let ExitOutcome::Aborted { cause } = &report.outcome else {
        panic!("unexpected outcome: {:?}", report.outcome);
    };
    assert!(matches!(cause, UpgradeError::Rename { .. }), "unexpected cause: {cause}");
    assert_eq!(report.exit_code(), 1);
    assert_eq!(backup_files(dir.path()), 0);
    assert_eq!(report.backup_location, None);
    assert_eq!(
        host.journal(),
        vec![
            "stop:ovirt-engine".to_string(),
            "stop:ovirt-engine-etl".to_string(),
            "dump:engine".to_string(),
            format!("sql:ALTER DATABASE engine RENAME TO {TEMPORARY_DB}"),
            "start:ovirt-engine-etl".to_string(),
            "start:ovirt-engine".to_string(),
        ]
    );
}

#[test]
fn disabled_rollback_skips_package_undo() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    host.fail("post");
    let options = UpgradeOptions {
        rollback: false,
        ..UpgradeOptions::default()
    };

    let report = run(&host, &test_config(dir.path()), options);
    let ExitOutcome::FailedRolledBack { rollback, .. } = &report.outcome else {
        panic!("unexpected outcome: {:?}", report.outcome);
    };
    assert!(rollback.package_rollback_skipped);
    assert!(rollback.is_complete());
    assert!(!host.journal().iter().any(|call| call.starts_with("undo:")));
    assert!(host.report().contains(&"Skipping package rollback".to_string()));
}

#[test]
fn primary_restart_failure_does_not_change_outcome() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let host = FakeHost::with_updates(&[WEBADMIN_UPDATE]);
    host.fail("start:ovirt-engine");

    let report = run(&host, &test_config(dir.path()), UpgradeOptions::default());
    assert_eq!(report.outcome, ExitOutcome::Success);
    assert_eq!(
        report.primary_restart_error,
        Some(UpgradeError::ServiceControl {
            service: "ovirt-engine".to_string(),
            message: "start:ovirt-engine failed".to_string(),
        })
    );
    assert!(report
        .messages
        .contains(&"Error: Can't start ovirt-engine".to_string()));
}

#[test]
fn exit_codes_follow_outcome() {
    let blocked = |err| ExitOutcome::UpdateBlocked(err).exit_code();
    assert_eq!(
        blocked(UpgradeError::RollbackUnavailable { missing: Vec::new() }),
        2
    );
    assert_eq!(
        blocked(UpgradeError::SetupPackageUpdate {
            package: "setup".to_string()
        }),
        3
    );
    assert_eq!(
        blocked(UpgradeError::UnsupportedVersion {
            version: "2.2".to_string()
        }),
        1
    );
    assert_eq!(ExitOutcome::UserDeclined.exit_code(), 0);
    assert_eq!(
        ExitOutcome::Aborted {
            cause: UpgradeError::Backup {
                message: "disk full".to_string()
            }
        }
        .exit_code(),
        1
    );
}

struct ScriptedRunner {
    status: i32,
    seen: Rc<RefCell<Vec<String>>>,
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.seen.borrow_mut().push(spec.to_string());
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: "boom".to_string(),
            status: self.status,
        })
    }
}

#[test]
fn command_post_configure_runs_configured_command() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let config = PostUpgradeConfig {
        command: strings(&["/usr/share/ovirt-engine/scripts/post_upgrade.sh", "--quiet"]),
    };
    let mut post = CommandPostConfigure::new(
        Box::new(ScriptedRunner {
            status: 1,
            seen: Rc::clone(&seen),
        }),
        &config,
    );

    let err = post.run().expect_err("non-zero exit must fail");
    assert!(
        format!("{err:#}").contains("post upgrade command failed: status=1"),
        "unexpected error: {err:#}"
    );
    assert_eq!(
        *seen.borrow(),
        vec!["/usr/share/ovirt-engine/scripts/post_upgrade.sh --quiet".to_string()]
    );
}

#[test]
fn empty_post_configure_command_is_noop() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut post = CommandPostConfigure::new(
        Box::new(ScriptedRunner {
            status: 0,
            seen: Rc::clone(&seen),
        }),
        &PostUpgradeConfig::default(),
    );
    post.run().expect("empty command must succeed");
    assert!(seen.borrow().is_empty());
}
