/// Ordered, non-fatal notes collected during a session and shown to the
/// operator when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Messages {
    entries: Vec<String>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(message = %message, "session message");
        self.entries.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.entries
    }
}
