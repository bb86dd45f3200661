use std::fmt;

/// Package-manager transaction id. Ids grow monotonically with history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: TransactionId,
    pub action: String,
}

impl HistoryEntry {
    /// `Update` in long form, `U` in the abbreviated multi-action form
    /// (`I, U`).
    pub fn is_update(&self) -> bool {
        self.action
            .split(|ch: char| ch.is_whitespace() || ch == ',')
            .any(|token| token == "Update" || token == "U")
    }
}

/// Parses the `ID | Login user | Date and time | Action(s) | Altered` table
/// printed by `yum history list`. Header, separator and summary lines are
/// skipped.
pub fn parse_history_list(raw: &str) -> Vec<HistoryEntry> {
    raw.lines()
        .filter_map(|line| {
            let columns = line.split('|').collect::<Vec<_>>();
            if columns.len() <= 3 {
                return None;
            }
            let action = columns[3].trim();
            if action.contains("Action") {
                return None;
            }
            let id = columns[0].trim().parse::<u64>().ok()?;
            Some(HistoryEntry {
                id: TransactionId(id),
                action: action.to_string(),
            })
        })
        .collect()
}
