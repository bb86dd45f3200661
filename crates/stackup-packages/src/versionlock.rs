use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// The yum versionlock plugin list: one locked package per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLockFile {
    path: PathBuf,
}

impl VersionLockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_entries(&self) -> Result<Vec<String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read version lock file: {}", self.path.display())
                });
            }
        };

        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn append(&self, entries: &[String]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| {
                format!("failed to open version lock file: {}", self.path.display())
            })?;
        for entry in entries {
            writeln!(file, "{}", entry.trim()).with_context(|| {
                format!("failed to append version lock file: {}", self.path.display())
            })?;
        }
        file.flush()
            .with_context(|| format!("failed to flush version lock file: {}", self.path.display()))?;
        Ok(())
    }

    /// Drops every line containing `key`. Returns how many were removed.
    pub fn remove_matching(&self, key: &str) -> Result<usize> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read version lock file: {}", self.path.display())
                });
            }
        };

        let mut kept = String::with_capacity(raw.len());
        let mut removed = 0;
        for line in raw.lines() {
            if line.contains(key) {
                removed += 1;
                continue;
            }
            kept.push_str(line);
            kept.push('\n');
        }

        fs::write(&self.path, kept.as_bytes()).with_context(|| {
            format!("failed to write version lock file: {}", self.path.display())
        })?;
        Ok(removed)
    }
}
