use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::Stage;
use pageforge_transport::TokenUsage;

/// One persisted generation attempt.
///
/// The record is written before the first network call and after every
/// completed stage, so a crash at any point leaves a resumable snapshot.
/// `input_topic` is immutable for the life of the record; `token_usage` only
/// grows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Primary key for persistence, dedupe, and resume.
    pub id: String,
    /// The original natural-language request.
    pub input_topic: String,
    /// Current position in the stage sequence.
    pub stage: Stage,
    /// Current best full document (empty before the first successful stage).
    pub document: String,
    /// Intermediate artifact passed between stages (checklist, inspection
    /// summary).
    pub side_artifact: String,
    /// Running token totals across all stages and retries.
    pub token_usage: TokenUsage,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// True from creation until the terminal stage or an explicit stop.
    pub is_running: bool,
}

impl GenerationRecord {
    /// Creates a fresh record at the first stage.
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input_topic: topic.into(),
            stage: Stage::Draft,
            document: String::new(),
            side_artifact: String::new(),
            token_usage: TokenUsage::default(),
            started_at: Utc::now(),
            is_running: true,
        }
    }
}

/// Generates an opaque id for callers that do not supply one.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_running_at_draft() {
        let record = GenerationRecord::new("g1", "a single-button counter");
        assert_eq!(record.stage, Stage::Draft);
        assert!(record.is_running);
        assert!(record.document.is_empty());
        assert_eq!(record.token_usage.total_tokens, 0);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = GenerationRecord::new("g1", "topic");
        record.stage = Stage::PlatformOptimize;
        record.document = "<!doctype html><html></html>".into();
        let json = serde_json::to_string(&record).expect("serialize");
        let back: GenerationRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
