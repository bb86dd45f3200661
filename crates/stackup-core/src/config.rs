use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stackup/upgrade.toml";

const DEFAULT_TRACKED_PACKAGES: &[&str] = &[
    "ovirt-engine",
    "ovirt-engine-backend",
    "ovirt-engine-config",
    "ovirt-engine-dbscripts",
    "ovirt-engine-genericapi",
    "ovirt-engine-notification-service",
    "ovirt-engine-restapi",
    "ovirt-engine-setup",
    "ovirt-engine-tools-common",
    "ovirt-engine-userportal",
    "ovirt-engine-webadmin-portal",
    "ovirt-image-uploader",
    "ovirt-iso-uploader",
    "ovirt-log-collector",
    "vdsm-bootstrap",
];

/// Static description of the stack being upgraded, read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpgradeConfig {
    pub packages: PackageConfig,
    pub database: DatabaseConfig,
    pub services: ServiceConfig,
    pub logging: LoggingConfig,
    pub post_upgrade: PostUpgradeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageConfig {
    /// Package names handed to every list/update call.
    pub tracked: Vec<String>,
    /// Packages whose update requires backup, migration and restore handling.
    pub db_packages: Vec<String>,
    /// The installer package that ships this tool.
    pub setup_package: String,
    /// Version-lock lines containing this key are lifted around apply/undo.
    pub lock_key: String,
    pub lock_packages: Vec<String>,
    pub versionlock_file: PathBuf,
    pub yum_exec: String,
    pub rpm_exec: String,
    pub repoquery_exec: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            tracked: DEFAULT_TRACKED_PACKAGES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            db_packages: vec![
                "ovirt-engine-backend".to_string(),
                "ovirt-engine-dbscripts".to_string(),
            ],
            setup_package: "ovirt-engine-setup".to_string(),
            lock_key: "ovirt-engine".to_string(),
            lock_packages: DEFAULT_TRACKED_PACKAGES
                .iter()
                .filter(|name| name.starts_with("ovirt-engine"))
                .map(|name| name.to_string())
                .collect(),
            versionlock_file: PathBuf::from("/etc/yum/pluginconf.d/versionlock.list"),
            yum_exec: "/usr/bin/yum".to_string(),
            rpm_exec: "/bin/rpm".to_string(),
            repoquery_exec: "/usr/bin/repoquery".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub admin_user: String,
    /// Maintenance database used for rename and restore statements.
    pub template: String,
    pub pgpass_file: PathBuf,
    pub legacy_pgpass_file: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_prefix: String,
    pub migration_dir: PathBuf,
    pub migration_script: String,
    /// Each query returns one compatibility version per row.
    pub compatibility_queries: Vec<String>,
    pub unsupported_version: String,
    pub pg_dump_exec: String,
    pub psql_exec: String,
    pub dropdb_exec: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "engine".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            admin_user: "postgres".to_string(),
            template: "template1".to_string(),
            pgpass_file: PathBuf::from("/etc/ovirt-engine/.pgpass"),
            legacy_pgpass_file: PathBuf::from("/root/.pgpass"),
            backup_dir: PathBuf::from("/var/lib/ovirt-engine/backups"),
            backup_prefix: "ovirt-engine_db_backup".to_string(),
            migration_dir: PathBuf::from("/usr/share/ovirt-engine/dbscripts"),
            migration_script: "upgrade.sh".to_string(),
            compatibility_queries: vec![
                "SELECT compatibility_version FROM storage_pool;".to_string(),
                "SELECT compatibility_version FROM vds_groups;".to_string(),
            ],
            unsupported_version: "2.2".to_string(),
            pg_dump_exec: "/usr/bin/pg_dump".to_string(),
            psql_exec: "/usr/bin/psql".to_string(),
            dropdb_exec: "/usr/bin/dropdb".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn migration_script_path(&self) -> PathBuf {
        self.migration_dir.join(&self.migration_script)
    }

    pub fn backup_path(&self, timestamp: &str) -> PathBuf {
        self.backup_dir
            .join(format!("{}_{timestamp}.sql", self.backup_prefix))
    }

    pub fn temporary_name(&self, timestamp: &str) -> String {
        format!("{}_{timestamp}", self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    pub primary: String,
    pub auxiliary: Vec<AuxiliaryServiceConfig>,
    pub service_exec: String,
    /// A service counts as installed when its init script exists here.
    pub init_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            primary: "ovirt-engine".to_string(),
            auxiliary: vec![
                AuxiliaryServiceConfig {
                    name: "ovirt-engine-etl".to_string(),
                    notice: Some(
                        "Perform the following steps to upgrade the history service or the reporting package:\n\
                         1. Execute: yum update ovirt-engine-reports*\n\
                         2. Execute: ovirt-engine-dwh-setup\n\
                         3. Execute: ovirt-engine-reports-setup"
                            .to_string(),
                    ),
                },
                AuxiliaryServiceConfig {
                    name: "ovirt-engine-notifierd".to_string(),
                    notice: None,
                },
            ],
            service_exec: "/sbin/service".to_string(),
            init_dir: PathBuf::from("/etc/init.d"),
        }
    }
}

/// A service holding database connections that must be quiesced during
/// schema work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuxiliaryServiceConfig {
    pub name: String,
    /// Printed after a successful upgrade when the service is installed.
    #[serde(default)]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/log/ovirt-engine"),
            file_prefix: "ovirt-engine-upgrade".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_path(&self, timestamp: &str) -> PathBuf {
        self.dir.join(format!("{}_{timestamp}.log", self.file_prefix))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostUpgradeConfig {
    /// Program followed by its arguments. Empty means nothing to run.
    pub command: Vec<String>,
}

impl UpgradeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse upgrade config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, or the default location when `path` is `None`. Only the
    /// default location is allowed to be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        match fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml_str(&raw)
                .with_context(|| format!("invalid upgrade config: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to read upgrade config: {}", path.display())),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.packages.tracked.is_empty() {
            return Err(anyhow!("packages.tracked must name at least one package"));
        }
        if self.packages.lock_key.trim().is_empty() {
            return Err(anyhow!("packages.lock_key must not be empty"));
        }
        if !is_sql_identifier(&self.database.name) {
            return Err(anyhow!(
                "database.name must be a plain SQL identifier: {}",
                self.database.name
            ));
        }
        if self.services.primary.trim().is_empty() {
            return Err(anyhow!("services.primary must not be empty"));
        }
        for db_package in &self.packages.db_packages {
            if !self.packages.tracked.contains(db_package) {
                return Err(anyhow!(
                    "db package '{db_package}' is not in packages.tracked"
                ));
            }
        }
        Ok(())
    }
}

fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Per-run switches taken from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub rollback: bool,
    pub unattended: bool,
    pub force_current_setup: bool,
    pub check_only: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            rollback: true,
            unattended: false,
            force_current_setup: false,
            check_only: false,
        }
    }
}
