use std::io::{self, BufRead, Write};

use stackup_engine::Prompt;

/// Yes/no question on the controlling terminal.
pub(crate) struct TerminalPrompt<R> {
    input: R,
}

impl TerminalPrompt<io::StdinLock<'static>> {
    pub(crate) fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> TerminalPrompt<R> {
    pub(crate) fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> Prompt for TerminalPrompt<R> {
    fn confirm(&mut self, question: &str) -> bool {
        loop {
            print!("{question}? (yes|no): ");
            let _ = io::stdout().flush();

            let mut answer = String::new();
            match self.input.read_line(&mut answer) {
                Ok(0) => {
                    tracing::warn!("no answer on input, treating as no");
                    return false;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read answer, treating as no");
                    return false;
                }
            }

            if let Some(choice) = parse_answer(&answer) {
                tracing::debug!(question, choice, "operator answered");
                return choice;
            }
        }
    }
}

pub(crate) fn parse_answer(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}
