use anyhow::Result;

mod coordinator;
mod history;
mod versionlock;
mod yum;

pub use coordinator::{PackageSnapshot, PackageState, PackageUpdateCoordinator};
pub use history::{parse_history_list, HistoryEntry, TransactionId};
pub use versionlock::VersionLockFile;
pub use yum::{parse_check_update, YumPackageManager};

/// The system package manager as seen by the upgrade.
///
/// Package identifiers are `name-version-release.arch` strings so installed
/// and repository packages compare by plain equality.
pub trait PackageManager {
    fn installed(&self, names: &[String]) -> Result<Vec<String>>;

    /// Every repository package matching `names`, including versions already
    /// installed.
    fn available(&self, names: &[String]) -> Result<Vec<String>>;

    fn updatable(&self, names: &[String]) -> Result<Vec<String>>;

    fn apply_update(&mut self, names: &[String]) -> Result<()>;

    /// Transactions touching `name`, newest first.
    fn history(&self, name: &str) -> Result<Vec<HistoryEntry>>;

    fn undo(&mut self, id: TransactionId) -> Result<()>;

    /// Pins the installed versions of `names` against unrelated updates.
    fn lock(&mut self, names: &[String]) -> Result<()>;

    /// Lifts every pin whose entry contains `key`.
    fn unlock(&mut self, key: &str) -> Result<()>;
}
