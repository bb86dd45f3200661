use std::fs;

use stackup_core::{DatabaseConfig, UpgradeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgpassStatus {
    Present,
    MovedFromLegacy,
}

/// Makes sure the password file the database tools read exists, migrating
/// it from the legacy location when needed.
pub fn ensure_pgpass(config: &DatabaseConfig) -> Result<PgpassStatus, UpgradeError> {
    if config.pgpass_file.exists() {
        tracing::info!(path = %config.pgpass_file.display(), "pgpass file found");
        return Ok(PgpassStatus::Present);
    }

    if !config.legacy_pgpass_file.exists() {
        return Err(UpgradeError::Credentials {
            message: format!(
                "password file was not found; verify that this system was previously installed \
                 and that there's a password file at {} or {}",
                config.pgpass_file.display(),
                config.legacy_pgpass_file.display()
            ),
        });
    }

    tracing::info!(
        from = %config.legacy_pgpass_file.display(),
        to = %config.pgpass_file.display(),
        "moving pgpass file to its new location"
    );
    let credentials_error = |err: std::io::Error| UpgradeError::Credentials {
        message: format!(
            "failed to copy {} to {}: {err}",
            config.legacy_pgpass_file.display(),
            config.pgpass_file.display()
        ),
    };
    if let Some(parent) = config.pgpass_file.parent() {
        fs::create_dir_all(parent).map_err(credentials_error)?;
    }
    fs::copy(&config.legacy_pgpass_file, &config.pgpass_file).map_err(credentials_error)?;
    restrict_permissions(&config.pgpass_file).map_err(credentials_error)?;
    Ok(PgpassStatus::MovedFromLegacy)
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
