use std::fs;
use std::path::{Path, PathBuf};

use stackup_core::{DatabaseConfig, UpgradeError};

use crate::compat::versions_contain;
use crate::fs_utils::remove_file_if_exists;
use crate::{DatabaseClient, SchemaMigrator};

/// Where the database stands within one session.
///
/// `Untouched -> BackedUp -> Renamed -> Migrated -> RestoredOriginal`, with
/// `BackedUp -> Migrated` allowed when no rename is wanted. Restoring is
/// only meaningful from `Renamed` or `Migrated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Untouched,
    BackedUp,
    Renamed,
    Migrated,
    RestoredOriginal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub taken: bool,
}

/// Database half of an upgrade session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSession {
    pub original_name: String,
    pub current_name: String,
    pub state: DatabaseState,
    pub backup: BackupArtifact,
    renamed: bool,
}

impl DatabaseSession {
    pub fn new(original_name: impl Into<String>, backup_path: impl Into<PathBuf>) -> Self {
        let original_name = original_name.into();
        Self {
            current_name: original_name.clone(),
            original_name,
            state: DatabaseState::Untouched,
            backup: BackupArtifact {
                path: backup_path.into(),
                taken: false,
            },
            renamed: false,
        }
    }

    pub fn from_config(config: &DatabaseConfig, timestamp: &str) -> Self {
        Self::new(config.name.clone(), config.backup_path(timestamp))
    }

    /// The session changed the live database and a restore is owed on
    /// failure.
    pub fn touched(&self) -> bool {
        matches!(self.state, DatabaseState::Renamed | DatabaseState::Migrated)
    }

    pub fn migrated(&self) -> bool {
        self.state == DatabaseState::Migrated
    }

    pub fn renamed(&self) -> bool {
        self.renamed
    }

    /// The backup file, if this session took one and it is still on disk.
    pub fn backup_location(&self) -> Option<&Path> {
        (self.backup.taken && self.backup.path.exists()).then_some(self.backup.path.as_path())
    }
}

pub struct DatabaseLifecycleManager {
    client: Box<dyn DatabaseClient>,
    migrator: Box<dyn SchemaMigrator>,
    template: String,
}

impl DatabaseLifecycleManager {
    pub fn new(
        client: Box<dyn DatabaseClient>,
        migrator: Box<dyn SchemaMigrator>,
        config: &DatabaseConfig,
    ) -> Self {
        Self {
            client,
            migrator,
            template: config.template.clone(),
        }
    }

    /// Runs every compatibility query against the live database and reports
    /// whether any row carries the unsupported `marker`.
    pub fn unsupported_version_present(
        &mut self,
        session: &DatabaseSession,
        queries: &[String],
        marker: &str,
    ) -> Result<bool, UpgradeError> {
        for query in queries {
            let rows = self
                .client
                .execute(&session.current_name, query)
                .map_err(|err| UpgradeError::DatabaseQuery {
                    message: format!("failed to connect to database: {err:#}"),
                })?;
            tracing::debug!(query = %query, ?rows, "compatibility versions");
            if versions_contain(&rows, marker) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn backup(&mut self, session: &mut DatabaseSession) -> Result<(), UpgradeError> {
        if session.state != DatabaseState::Untouched {
            tracing::debug!(state = ?session.state, "backup already taken this session");
            return Ok(());
        }

        let path = session.backup.path.clone();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| UpgradeError::Backup {
                message: format!("failed to create {}: {err}", parent.display()),
            })?;
        }

        tracing::debug!(database = %session.current_name, path = %path.display(), "database backup started");
        if let Err(err) = self.client.dump(&session.current_name, &path) {
            if let Err(cleanup) = remove_file_if_exists(&path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial backup");
            }
            return Err(UpgradeError::Backup {
                message: format!("{err:#}"),
            });
        }

        session.backup.taken = true;
        session.state = DatabaseState::BackedUp;
        tracing::debug!("database backup completed successfully");
        Ok(())
    }

    pub fn rename(
        &mut self,
        session: &mut DatabaseSession,
        new_name: &str,
    ) -> Result<(), UpgradeError> {
        if session.current_name == new_name {
            return Ok(());
        }

        let rename_error = |message: String| UpgradeError::Rename {
            from: session.current_name.clone(),
            to: new_name.to_string(),
            message,
        };
        match session.state {
            DatabaseState::Untouched => {
                return Err(rename_error("no backup taken this session".to_string()));
            }
            DatabaseState::RestoredOriginal => {
                return Err(rename_error("database was already restored".to_string()));
            }
            DatabaseState::BackedUp | DatabaseState::Renamed | DatabaseState::Migrated => {}
        }

        let query = format!(
            "ALTER DATABASE {} RENAME TO {}",
            session.current_name, new_name
        );
        tracing::debug!(query = %query, "renaming database");
        if let Err(err) = self.client.execute(&self.template, &query) {
            let error = rename_error(format!("{err:#}"));
            // Nothing depends on the backup until the live database changes.
            if session.state == DatabaseState::BackedUp {
                match remove_file_if_exists(&session.backup.path) {
                    Ok(_) => session.backup.taken = false,
                    Err(cleanup) => tracing::warn!(
                        path = %session.backup.path.display(),
                        error = %cleanup,
                        "failed to remove orphaned backup"
                    ),
                }
            }
            return Err(error);
        }

        session.current_name = new_name.to_string();
        session.renamed = true;
        if session.state == DatabaseState::BackedUp {
            session.state = DatabaseState::Renamed;
        }
        Ok(())
    }

    pub fn migrate(&mut self, session: &mut DatabaseSession) -> Result<(), UpgradeError> {
        match session.state {
            DatabaseState::BackedUp | DatabaseState::Renamed => {}
            state => {
                return Err(UpgradeError::Migration {
                    message: format!("database is not ready for migration (state={state:?})"),
                });
            }
        }

        // Recorded before the script runs so a failure mid-script still
        // triggers a restore.
        session.state = DatabaseState::Migrated;
        tracing::debug!(database = %session.current_name, "database update started");
        self.migrator
            .migrate(&session.current_name)
            .map_err(|err| UpgradeError::Migration {
                message: format!("{err:#}"),
            })?;
        tracing::debug!("database update completed successfully");
        Ok(())
    }

    /// Drops whatever the session left behind and reloads the backup under
    /// the original name. A no-op unless the session touched the database.
    pub fn restore(&mut self, session: &mut DatabaseSession) -> Result<(), UpgradeError> {
        if !session.touched() {
            tracing::debug!(state = ?session.state, "no database restore needed");
            return Ok(());
        }
        if !session.backup.taken {
            return Err(UpgradeError::Restore {
                message: "no backup artifact recorded for this session".to_string(),
            });
        }

        tracing::debug!(database = %session.current_name, "database restore started");
        self.client
            .drop_database(&session.current_name)
            .map_err(|err| UpgradeError::Restore {
                message: format!("database drop failed: {err:#}"),
            })?;
        self.client
            .restore(&session.backup.path)
            .map_err(|err| UpgradeError::Restore {
                message: format!("{err:#}"),
            })?;

        session.current_name = session.original_name.clone();
        session.state = DatabaseState::RestoredOriginal;
        tracing::debug!("database restore completed successfully");
        Ok(())
    }
}
