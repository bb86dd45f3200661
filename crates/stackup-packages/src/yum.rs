use anyhow::{anyhow, Context, Result};
use stackup_core::{run_checked, CommandRunner, CommandSpec, PackageConfig};

use crate::history::{parse_history_list, HistoryEntry, TransactionId};
use crate::versionlock::VersionLockFile;
use crate::PackageManager;

const RPM_QUERY_FORMAT: &str = "%{NAME}-%{VERSION}-%{RELEASE}.%{ARCH}\\n";
const REPOQUERY_FORMAT: &str = "%{name}-%{version}-%{release}.%{arch}";

/// `yum check-update` exit status when updates are pending.
const CHECK_UPDATE_PENDING: i32 = 100;

/// Drives yum, rpm and repoquery through a [`CommandRunner`] and keeps the
/// versionlock list in step with apply/undo calls.
pub struct YumPackageManager {
    runner: Box<dyn CommandRunner>,
    yum_exec: String,
    rpm_exec: String,
    repoquery_exec: String,
    lock_file: VersionLockFile,
}

impl YumPackageManager {
    pub fn new(runner: Box<dyn CommandRunner>, config: &PackageConfig) -> Self {
        Self {
            runner,
            yum_exec: config.yum_exec.clone(),
            rpm_exec: config.rpm_exec.clone(),
            repoquery_exec: config.repoquery_exec.clone(),
            lock_file: VersionLockFile::new(&config.versionlock_file),
        }
    }

    fn rpm_installed(&self, name: &str) -> Result<bool> {
        let output = self
            .runner
            .run(&CommandSpec::new(&self.rpm_exec).args(["-q", name]))
            .with_context(|| format!("failed to query rpm database for {name}"))?;
        Ok(output.success())
    }
}

impl PackageManager for YumPackageManager {
    fn installed(&self, names: &[String]) -> Result<Vec<String>> {
        // rpm exits non-zero when any name is missing; those names print a
        // "not installed" line instead of an identifier.
        let spec = CommandSpec::new(&self.rpm_exec)
            .args(["-q", "--qf", RPM_QUERY_FORMAT])
            .args(names.iter().cloned());
        let output = self
            .runner
            .run(&spec)
            .context("failed to query installed packages")?;
        let mut installed = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains("is not installed"))
            .map(str::to_string)
            .collect::<Vec<_>>();
        installed.sort();
        installed.dedup();
        Ok(installed)
    }

    fn available(&self, names: &[String]) -> Result<Vec<String>> {
        let spec = CommandSpec::new(&self.repoquery_exec)
            .args(["--show-duplicates", "--qf", REPOQUERY_FORMAT])
            .args(names.iter().cloned());
        let output = run_checked(
            self.runner.as_ref(),
            &spec,
            "failed to list repository packages",
        )?;
        let mut available = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        available.sort();
        available.dedup();
        Ok(available)
    }

    fn updatable(&self, names: &[String]) -> Result<Vec<String>> {
        let spec = CommandSpec::new(&self.yum_exec)
            .args(["-q", "check-update"])
            .args(names.iter().cloned());
        let output = self
            .runner
            .run(&spec)
            .context("failed to check for package updates")?;
        match output.status {
            0 => Ok(Vec::new()),
            CHECK_UPDATE_PENDING => Ok(parse_check_update(&output.stdout)),
            status => Err(anyhow!(
                "yum check-update failed: status={status} stderr='{}'",
                output.stderr.trim()
            )),
        }
    }

    fn apply_update(&mut self, names: &[String]) -> Result<()> {
        let spec = CommandSpec::new(&self.yum_exec)
            .args(["update", "-q", "-y"])
            .args(names.iter().cloned());
        run_checked(self.runner.as_ref(), &spec, "yum update failed")?;
        Ok(())
    }

    fn history(&self, name: &str) -> Result<Vec<HistoryEntry>> {
        let spec = CommandSpec::new(&self.yum_exec).args(["history", "list", name]);
        let output = run_checked(
            self.runner.as_ref(),
            &spec,
            "can't get history from yum",
        )?;
        Ok(parse_history_list(&output.stdout))
    }

    fn undo(&mut self, id: TransactionId) -> Result<()> {
        let spec = CommandSpec::new(&self.yum_exec).args([
            "history".to_string(),
            "-y".to_string(),
            "undo".to_string(),
            id.to_string(),
        ]);
        run_checked(self.runner.as_ref(), &spec, "can't rollback yum")?;
        Ok(())
    }

    fn lock(&mut self, names: &[String]) -> Result<()> {
        let mut present = Vec::new();
        for name in names {
            if self.rpm_installed(name)? {
                present.push(name.clone());
            }
        }
        if present.is_empty() {
            tracing::debug!("no lockable packages installed");
            return Ok(());
        }

        let spec = CommandSpec::new(&self.rpm_exec)
            .arg("-q")
            .args(present);
        let output = run_checked(self.runner.as_ref(), &spec, "can't edit yum lock file")?;
        let entries = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        self.lock_file.append(&entries)?;
        tracing::debug!(
            count = entries.len(),
            file = %self.lock_file.path().display(),
            "version lock restored"
        );
        Ok(())
    }

    fn unlock(&mut self, key: &str) -> Result<()> {
        let removed = self.lock_file.remove_matching(key)?;
        tracing::debug!(
            removed,
            file = %self.lock_file.path().display(),
            "version lock lifted"
        );
        Ok(())
    }
}

/// Turns `yum check-update` rows (`name.arch  version-release  repo`) into
/// `name-version-release.arch` identifiers. A `name.arch` too long for its
/// column is printed alone, with `version repo` on the next indented line.
/// The obsoletes section is ignored.
pub fn parse_check_update(raw: &str) -> Vec<String> {
    let mut updates = Vec::new();
    let mut wrapped: Option<&str> = None;
    for line in raw.lines() {
        if line.starts_with("Obsoleting Packages") {
            break;
        }
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if line.starts_with(char::is_whitespace) {
            if let (Some(name_arch), [version, _repo, ..]) = (wrapped.take(), fields.as_slice()) {
                push_update(&mut updates, name_arch, version);
            }
            continue;
        }
        wrapped = None;
        match fields.as_slice() {
            [name_arch] => wrapped = Some(*name_arch),
            [name_arch, version, _repo, ..] => push_update(&mut updates, name_arch, version),
            _ => {}
        }
    }
    updates.sort();
    updates.dedup();
    updates
}

fn push_update(updates: &mut Vec<String>, name_arch: &str, version: &str) {
    let Some((name, arch)) = name_arch.rsplit_once('.') else {
        return;
    };
    let version = version
        .split_once(':')
        .map(|(_, version)| version)
        .unwrap_or(version);
    updates.push(format!("{name}-{version}.{arch}"));
}
