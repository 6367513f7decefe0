//! Journal records emitted to persistence sinks.
//!
//! Every sink call is captured as an immutable record; the JSONL sink writes
//! them verbatim and can replay them for inspection.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::task::{FileType, Segment, Task, TaskStatus};

/// Which sink operation produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Task status changed
    StatusChanged,

    /// Extraction output saved
    ContentSaved,

    /// Human-corrected text saved
    ContentVerified,
}

/// A single entry in the task journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier for this record
    pub id: Uuid,

    /// When the record was written
    pub timestamp: DateTime<Utc>,

    /// Source path of the task
    pub path: PathBuf,

    /// Optional grouping tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    pub file_type: FileType,

    pub kind: RecordKind,

    /// Task status at the time of the record
    pub status: TaskStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Text payload (extracted or verified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// SHA256 prefix of `content`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_scores: Option<HashMap<String, f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_confidence_segments: Option<Vec<Segment>>,
}

impl TaskRecord {
    fn base(task: &Task, kind: RecordKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            path: task.path.clone(),
            topic: task.topic.clone(),
            file_type: task.file_type,
            kind,
            status: task.status,
            error: None,
            content: None,
            content_hash: None,
            confidence_scores: None,
            low_confidence_segments: None,
        }
    }

    /// Record a status change (carries the error for failed tasks)
    pub fn status_changed(task: &Task) -> Self {
        let mut record = Self::base(task, RecordKind::StatusChanged);
        record.error = task.error.clone();
        record
    }

    /// Record the extraction output of a task
    pub fn content_saved(task: &Task) -> Self {
        let mut record = Self::base(task, RecordKind::ContentSaved).with_content(task.result.clone());
        record.confidence_scores = task.confidence_scores.clone();
        record.low_confidence_segments = task.low_confidence_segments.clone();
        record
    }

    /// Record a human correction
    pub fn content_verified(task: &Task, text: &str) -> Self {
        Self::base(task, RecordKind::ContentVerified).with_content(Some(text.to_string()))
    }

    fn with_content(mut self, content: Option<String>) -> Self {
        self.content_hash = content.as_deref().map(content_hash);
        self.content = content;
        self
    }
}

/// Hash content (first 16 hex chars of SHA256)
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::Lane;

    #[test]
    fn test_record_serialization() {
        let mut task = Task::new("a.txt", FileType::Text, Lane::Small)
            .with_topic(Some("biology".to_string()));
        task.start().unwrap();
        task.finish("hello".to_string(), None, 0.7).unwrap();

        let record = TaskRecord::content_saved(&task);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: TaskRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.kind, RecordKind::ContentSaved);
        assert_eq!(parsed.status, TaskStatus::Completed);
        assert_eq!(parsed.topic.as_deref(), Some("biology"));
        assert_eq!(parsed.content.as_deref(), Some("hello"));
        assert_eq!(parsed.content_hash, Some(content_hash("hello")));
    }

    #[test]
    fn test_status_record_carries_error() {
        let mut task = Task::new("a.wav", FileType::Audio, Lane::Small);
        task.start().unwrap();
        task.fail("boom".to_string()).unwrap();

        let record = TaskRecord::status_changed(&task);
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.content.is_none());
    }

    #[test]
    fn test_content_hash_consistency() {
        assert_eq!(content_hash("x"), content_hash("x"));
        assert_ne!(content_hash("x"), content_hash("y"));
        assert_eq!(content_hash("x").len(), 16);
    }
}
