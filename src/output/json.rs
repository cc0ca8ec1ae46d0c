//! JSON output driver (spec §6): `{ stats, sources[], nodes[], edges[], by_language }`.

use super::Report;

pub fn render(report: &Report) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}
