/// True when any row reported by a compatibility query equals `marker`.
pub fn versions_contain(rows: &[String], marker: &str) -> bool {
    rows.iter().any(|row| row.trim() == marker)
}
