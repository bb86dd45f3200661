use stackup_core::{Messages, UpgradeConfig, UpgradeError};
use stackup_database::DatabaseSession;
use stackup_packages::PackageState;
use stackup_services::ServiceHandle;

/// In-memory record of one upgrade attempt. Never persisted; every run
/// starts from system introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSession {
    pub timestamp: String,
    pub packages: PackageState,
    pub database: DatabaseSession,
    pub auxiliary: Vec<ServiceHandle>,
    pub primary_restart_error: Option<UpgradeError>,
    pub messages: Messages,
}

impl UpgradeSession {
    pub fn new(config: &UpgradeConfig, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        Self {
            packages: PackageState::default(),
            database: DatabaseSession::from_config(&config.database, &timestamp),
            auxiliary: config
                .services
                .auxiliary
                .iter()
                .map(|service| ServiceHandle::new(service.name.clone()))
                .collect(),
            primary_restart_error: None,
            messages: Messages::new(),
            timestamp,
        }
    }
}
