use std::path::Path;

use anyhow::Result;

mod compat;
mod fs_utils;
mod lifecycle;
mod pgpass;
mod postgres;

pub use compat::versions_contain;
pub use lifecycle::{BackupArtifact, DatabaseLifecycleManager, DatabaseSession, DatabaseState};
pub use pgpass::{ensure_pgpass, PgpassStatus};
pub use postgres::{PostgresClient, ScriptMigrator};

/// Remote access to the database server.
pub trait DatabaseClient {
    /// Runs `sql` against `database` and returns one trimmed line per row.
    fn execute(&mut self, database: &str, sql: &str) -> Result<Vec<String>>;

    /// Writes a self-contained dump that recreates `database` under its
    /// current name.
    fn dump(&mut self, database: &str, target: &Path) -> Result<()>;

    fn restore(&mut self, dump: &Path) -> Result<()>;

    fn drop_database(&mut self, database: &str) -> Result<()>;
}

/// The schema upgrade script shipped with the new packages.
pub trait SchemaMigrator {
    fn migrate(&mut self, database: &str) -> Result<()>;
}
