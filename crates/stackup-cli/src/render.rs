use std::io::{IsTerminal, Write};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use stackup_core::UpgradeError;
use stackup_engine::{ExitOutcome, StepReporter, UpgradeReport};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

/// Terminal side of the step protocol: a spinner while a step runs, then a
/// `label... [ DONE ]` line.
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
    spinner: Option<ProgressBar>,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self {
            style,
            spinner: None,
        }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl StepReporter for TerminalRenderer {
    fn step_started(&mut self, label: &str) {
        self.clear_spinner();
        match self.style {
            OutputStyle::Rich => {
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
                    spinner.set_style(style.tick_chars("|/-\\ "));
                }
                spinner.set_message(format!("{label}..."));
                spinner.enable_steady_tick(Duration::from_millis(80));
                self.spinner = Some(spinner);
            }
            OutputStyle::Plain => {
                print!("{label}... ");
                let _ = std::io::stdout().flush();
            }
        }
    }

    fn step_finished(&mut self, label: &str, error: Option<&UpgradeError>) {
        self.clear_spinner();
        match self.style {
            OutputStyle::Rich => println!("{}", render_step_line(self.style, label, error.is_none())),
            OutputStyle::Plain => println!("{}", step_badge(self.style, error.is_none())),
        }
        if let Some(error) = error {
            println!("{}", render_reason_line(error));
        }
    }

    fn line(&mut self, text: &str) {
        self.clear_spinner();
        println!("{text}");
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        self.clear_spinner();
    }
}

fn step_badge(style: OutputStyle, ok: bool) -> String {
    let (text, color) = if ok {
        ("[ DONE ]", AnsiColor::BrightGreen)
    } else {
        ("[ ERROR ]", AnsiColor::BrightRed)
    };
    match style {
        OutputStyle::Plain => text.to_string(),
        OutputStyle::Rich => colorize(
            Style::new().fg_color(Some(color.into())).effects(Effects::BOLD),
            text,
        ),
    }
}

pub(crate) fn render_step_line(style: OutputStyle, label: &str, ok: bool) -> String {
    format!("{label}... {}", step_badge(style, ok))
}

pub(crate) fn render_reason_line(error: &UpgradeError) -> String {
    format!(" **Reason: {error}**")
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => colorize(success_style(), "[OK]"),
                "warn" => colorize(warning_style(), "[WARN]"),
                "error" => colorize(error_style(), "[ERROR]"),
                _ => format!("[{}]", status.to_ascii_uppercase()),
            };
            format!("{badge} {message}")
        }
    }
}

/// Closing lines printed after the orchestrator returns.
pub(crate) fn format_report_lines(report: &UpgradeReport, style: OutputStyle, app: &str) -> Vec<String> {
    let mut lines = Vec::new();
    match &report.outcome {
        ExitOutcome::NoUpdateAvailable => lines.push("No updates available".to_string()),
        ExitOutcome::CheckOnlyReport { .. } => {}
        ExitOutcome::UpdateBlocked(cause) => {
            lines.push(render_status_line(style, "error", &format!("Error: {cause}")));
            if let UpgradeError::RollbackUnavailable { .. } = cause {
                lines.push("Please check your package repositories or use --no-rollback".to_string());
            }
        }
        ExitOutcome::UserDeclined => lines.push("Upgrade stopped, Goodbye.".to_string()),
        ExitOutcome::Success => {
            lines.push(String::new());
            lines.push(render_status_line(
                style,
                "ok",
                &format!("{app} upgrade completed successfully!"),
            ));
            lines.push(String::new());
        }
        ExitOutcome::FailedRolledBack { cause, rollback } => {
            lines.push(render_status_line(style, "error", &format!("Error: Upgrade failed: {cause}")));
            for failure in &rollback.failures {
                lines.push(render_status_line(style, "warn", &format!("rollback incomplete: {failure}")));
            }
        }
        ExitOutcome::Aborted { cause } => {
            lines.push(render_status_line(style, "error", &format!("Error: Upgrade aborted: {cause}")));
        }
    }
    for message in &report.messages {
        lines.push(format!("* {}", message.trim()));
    }
    lines
}

fn success_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightGreen.into()))
        .effects(Effects::BOLD)
}

fn warning_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightYellow.into()))
        .effects(Effects::BOLD)
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
