use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::grading::GradingResult;

/// One persisted grading result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub result: GradingResult,
    pub title: String,
}

impl HistoryEntry {
    /// Wrap a fresh result, stamped now and titled with today's date.
    pub fn new(result: GradingResult) -> Self {
        Self::created_at(result, Utc::now())
    }

    pub fn created_at(result: GradingResult, at: DateTime<Utc>) -> Self {
        let local = at.with_timezone(&Local);
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: at.timestamp_millis(),
            result,
            title: format!("Submission {}", local.format("%d/%m/%Y")),
        }
    }

    /// Creation time in local time, if the stored timestamp is representable.
    pub fn created_local(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::grading::fixtures;

    #[test]
    fn new_entry_has_unique_id_and_title() {
        let a = HistoryEntry::new(fixtures::result("text", vec![]));
        let b = HistoryEntry::new(fixtures::result("text", vec![]));
        assert_ne!(a.id, b.id);
        assert!(a.title.starts_with("Submission "));
    }

    #[test]
    fn timestamp_is_epoch_millis() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let entry = HistoryEntry::created_at(fixtures::result("text", vec![]), at);
        assert_eq!(entry.timestamp, at.timestamp_millis());
        assert_eq!(entry.created_local().unwrap().with_timezone(&Utc), at);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let entry = HistoryEntry::new(fixtures::result("text", vec![]));
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("timestamp").is_some());
        assert!(value["result"].get("recognizedText").is_some());
    }
}
