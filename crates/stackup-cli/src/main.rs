use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use stackup_core::{session_timestamp, ProcessRunner, UpgradeConfig, UpgradeOptions};
use stackup_database::{ensure_pgpass, DatabaseLifecycleManager, PostgresClient, ScriptMigrator};
use stackup_engine::{Collaborators, CommandPostConfigure, UpgradeOrchestrator};
use stackup_packages::{PackageUpdateCoordinator, YumPackageManager};
use stackup_services::{ServiceLifecycleManager, SysvServiceController};

mod prompt;
mod render;

use prompt::TerminalPrompt;
use render::{current_output_style, format_report_lines, render_status_line, TerminalRenderer};

const APP_NAME: &str = "oVirt Engine";

#[derive(Parser, Debug)]
#[command(name = "stackup")]
#[command(about = "Upgrade the engine packages, database and services in place", long_about = None)]
struct Cli {
    /// Don't undo the package transaction if the upgrade fails
    #[arg(short = 'r', long = "no-rollback")]
    no_rollback: bool,
    /// Don't ask before stopping the engine service
    #[arg(short = 'u', long)]
    unattended: bool,
    /// Proceed even when a newer setup package is available
    #[arg(short = 's', long)]
    force_current_setup: bool,
    /// Only report available package updates
    #[arg(short = 'c', long = "check-update")]
    check_update: bool,
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> UpgradeOptions {
        UpgradeOptions {
            rollback: !self.no_rollback,
            unattended: self.unattended,
            force_current_setup: self.force_current_setup,
            check_only: self.check_update,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let timestamp = session_timestamp();

    let config = match UpgradeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::from(1);
        }
    };
    let log_path = config.logging.log_path(&timestamp);
    if let Err(err) = init_tracing(&log_path) {
        eprintln!("Error: failed to initiate logger: {err:#}");
        return ExitCode::from(1);
    }
    tracing::info!(options = ?cli.options(), config = ?cli.config, "upgrade started");

    match run_cli(&cli, config, &timestamp, &log_path) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "upgrade failed");
            println!(
                "{}",
                render_status_line(current_output_style(), "error", &format!("Error: {err}"))
            );
            println!("Error: Upgrade failed.\nplease check log at {}", log_path.display());
            ExitCode::from(1)
        }
    }
}

fn run_cli(cli: &Cli, config: UpgradeConfig, timestamp: &str, log_path: &Path) -> Result<u8> {
    ensure_pgpass(&config.database)?;

    let style = current_output_style();
    let mut orchestrator = build_orchestrator(config, cli.options()).with_log_path(log_path);
    let report = orchestrator.run(timestamp)?;
    for line in format_report_lines(&report, style, APP_NAME) {
        println!("{line}");
    }
    if report.outcome.cause().is_some() {
        println!("please check log at {}", log_path.display());
    }
    Ok(report.exit_code())
}

fn build_orchestrator(config: UpgradeConfig, options: UpgradeOptions) -> UpgradeOrchestrator {
    let packages = PackageUpdateCoordinator::new(
        Box::new(YumPackageManager::new(Box::new(ProcessRunner), &config.packages)),
        &config.packages,
    );
    let database = DatabaseLifecycleManager::new(
        Box::new(PostgresClient::new(Box::new(ProcessRunner), &config.database)),
        Box::new(ScriptMigrator::new(Box::new(ProcessRunner), &config.database)),
        &config.database,
    );
    let services = ServiceLifecycleManager::new(
        Box::new(SysvServiceController::new(Box::new(ProcessRunner), &config.services)),
        config.services.primary.clone(),
    );
    let parts = Collaborators {
        packages,
        database,
        services,
        post_configure: Box::new(CommandPostConfigure::new(
            Box::new(ProcessRunner),
            &config.post_upgrade,
        )),
        prompt: Box::new(TerminalPrompt::stdin()),
        reporter: Box::new(TerminalRenderer::current()),
    };
    UpgradeOrchestrator::new(config, options, parts)
}

/// Per-run log file receiving debug and above for our crates. `RUST_LOG`
/// overrides the filter.
fn init_tracing(log_path: &Path) -> Result<()> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    let file = File::create(log_path)
        .with_context(|| format!("failed to create log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,stackup=debug,stackup_core=debug,stackup_packages=debug,\
                     stackup_database=debug,stackup_services=debug,stackup_engine=debug",
                )
            }),
        )
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
        .context("failed to install tracing subscriber")
}
