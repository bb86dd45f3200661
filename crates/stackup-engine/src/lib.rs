//! Upgrade orchestration: guarded forward steps plus the compensating
//! rollback that runs when a step fails after packages start changing.

mod hooks;
mod orchestrator;
mod outcome;
mod session;

pub use hooks::{CommandPostConfigure, PostConfigure, Prompt, SilentReporter, StepReporter};
pub use orchestrator::{Collaborators, UpgradeOrchestrator};
pub use outcome::{ExitOutcome, RollbackSummary, UpgradeReport};
pub use session::UpgradeSession;

#[cfg(test)]
mod tests;
