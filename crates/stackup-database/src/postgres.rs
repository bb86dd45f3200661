use std::path::{Path, PathBuf};

use anyhow::Result;
use stackup_core::{run_checked, CommandRunner, CommandSpec, DatabaseConfig};

use crate::{DatabaseClient, SchemaMigrator};

/// PostgreSQL through `psql`, `pg_dump` and `dropdb`. Credentials come from
/// the pgpass file handed to every command via `PGPASSFILE`.
pub struct PostgresClient {
    runner: Box<dyn CommandRunner>,
    host: String,
    port: String,
    user: String,
    template: String,
    pgpass_file: PathBuf,
    psql_exec: String,
    pg_dump_exec: String,
    dropdb_exec: String,
}

impl PostgresClient {
    pub fn new(runner: Box<dyn CommandRunner>, config: &DatabaseConfig) -> Self {
        Self {
            runner,
            host: config.host.clone(),
            port: config.port.to_string(),
            user: config.admin_user.clone(),
            template: config.template.clone(),
            pgpass_file: config.pgpass_file.clone(),
            psql_exec: config.psql_exec.clone(),
            pg_dump_exec: config.pg_dump_exec.clone(),
            dropdb_exec: config.dropdb_exec.clone(),
        }
    }

    fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program)
            .args([
                "-U".to_string(),
                self.user.clone(),
                "-h".to_string(),
                self.host.clone(),
                "-p".to_string(),
                self.port.clone(),
            ])
            .env("PGPASSFILE", self.pgpass_file.display().to_string())
    }
}

impl DatabaseClient for PostgresClient {
    fn execute(&mut self, database: &str, sql: &str) -> Result<Vec<String>> {
        let spec = self
            .command(&self.psql_exec)
            .args(["-d", database, "-t", "-A", "-c", sql]);
        let output = run_checked(self.runner.as_ref(), &spec, "failed running sql query")?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn dump(&mut self, database: &str, target: &Path) -> Result<()> {
        let spec = self
            .command(&self.pg_dump_exec)
            .args([
                "-C",
                "-E",
                "UTF8",
                "--column-inserts",
                "--disable-dollar-quoting",
                "--disable-triggers",
                "--format=p",
                "-f",
            ])
            .arg(target.display().to_string())
            .arg(database);
        run_checked(self.runner.as_ref(), &spec, "database backup failed")?;
        Ok(())
    }

    fn restore(&mut self, dump: &Path) -> Result<()> {
        let spec = self
            .command(&self.psql_exec)
            .args(["-d", self.template.as_str(), "-f"])
            .arg(dump.display().to_string());
        run_checked(self.runner.as_ref(), &spec, "database restore failed")?;
        Ok(())
    }

    fn drop_database(&mut self, database: &str) -> Result<()> {
        let spec = self.command(&self.dropdb_exec).arg(database);
        run_checked(self.runner.as_ref(), &spec, "database drop failed")?;
        Ok(())
    }
}

/// Runs the packaged `upgrade.sh`-style script from its own directory.
pub struct ScriptMigrator {
    runner: Box<dyn CommandRunner>,
    script: PathBuf,
    working_dir: PathBuf,
    host: String,
    port: String,
    user: String,
}

impl ScriptMigrator {
    pub fn new(runner: Box<dyn CommandRunner>, config: &DatabaseConfig) -> Self {
        Self {
            runner,
            script: config.migration_script_path(),
            working_dir: config.migration_dir.clone(),
            host: config.host.clone(),
            port: config.port.to_string(),
            user: config.admin_user.clone(),
        }
    }
}

impl SchemaMigrator for ScriptMigrator {
    fn migrate(&mut self, database: &str) -> Result<()> {
        let spec = CommandSpec::new(self.script.display().to_string())
            .args([
                "-s", self.host.as_str(),
                "-p", self.port.as_str(),
                "-u", self.user.as_str(),
                "-d", database,
            ])
            .current_dir(&self.working_dir);
        run_checked(self.runner.as_ref(), &spec, "database update failed")?;
        Ok(())
    }
}
