//! Task state and the status state machine.
//!
//! A Task represents one source file tracked by a session. Its status only
//! moves along the edges encoded in [`TaskStatus::can_transition_to`].

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced synchronously by the task manager
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Maximum number of files ({max}) reached for this session")]
    CapacityExceeded { max: usize },

    #[error("Task already tracked: {}", .0.display())]
    AlreadyTracked(PathBuf),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("No task found for file: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid state transition for {}: {from} → {to}", .path.display())]
    InvalidState {
        path: PathBuf,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("No extractor registered for {0} files")]
    NoExtractor(FileType),

    #[error("Task manager is already running")]
    AlreadyRunning,

    #[error("Batch has {paths} paths but {types} file types")]
    BatchMismatch { paths: usize, types: usize },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Kind of source file; selects the extraction collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Spoken audio (wav, mp3, m4a)
    Audio,

    /// Scanned page or photo (jpg, png, pdf, ...)
    Image,

    /// Plain text
    Text,

    /// Video file or YouTube URL, transcribed from its audio track
    #[serde(rename = "youtube")]
    YouTube,
}

impl FileType {
    /// All variants, in declaration order
    pub const ALL: [FileType; 4] = [
        FileType::Audio,
        FileType::Image,
        FileType::Text,
        FileType::YouTube,
    ];
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Audio => write!(f, "audio"),
            FileType::Image => write!(f, "image"),
            FileType::Text => write!(f, "text"),
            FileType::YouTube => write!(f, "youtube"),
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(FileType::Audio),
            "image" | "ocr" => Ok(FileType::Image),
            "text" | "txt" => Ok(FileType::Text),
            "youtube" | "yt" | "video" => Ok(FileType::YouTube),
            _ => anyhow::bail!("Unknown file type: {}", s),
        }
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Enqueued, not yet picked up by a lane worker
    Pending,

    /// Dequeued and being extracted
    InProgress,

    /// Finished successfully (terminal)
    Completed,

    /// Extraction failed (terminal)
    Failed,

    /// Extracted, but held for human correction
    NeedsVerification,
}

impl TaskStatus {
    /// Whether moving from `self` to `next` is a legal edge
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, NeedsVerification)
                | (InProgress, Failed)
                | (NeedsVerification, Completed)
        )
    }

    /// Statuses for which `Task::result` is populated
    pub fn has_result(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::NeedsVerification)
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::NeedsVerification => "needs_verification",
        };
        f.pad(s)
    }
}

/// Priority lane a task was routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Files at or under the small-file threshold
    Small,

    /// Everything else, including remote sources of unknown size
    Large,
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Small => write!(f, "small"),
            Lane::Large => write!(f, "large"),
        }
    }
}

/// A scored unit of extracted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub confidence: f64,
}

impl Segment {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// One tracked source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Source path (or URL); unique within a session
    pub path: PathBuf,

    /// Which extractor handles this task
    pub file_type: FileType,

    /// Current status
    pub status: TaskStatus,

    /// Extracted (or verified) text
    pub result: Option<String>,

    /// Extraction error message, verbatim
    pub error: Option<String>,

    /// Segment text -> confidence (image tasks only)
    pub confidence_scores: Option<HashMap<String, f64>>,

    /// Segments below the confidence threshold, in extraction order (image tasks only)
    pub low_confidence_segments: Option<Vec<Segment>>,

    /// Lane the task was routed to
    pub lane: Lane,

    /// Size in bytes at add time (None for remote sources)
    pub size_bytes: Option<u64>,

    /// Opaque grouping tag forwarded to the persistence sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task
    pub fn new(path: impl Into<PathBuf>, file_type: FileType, lane: Lane) -> Self {
        Self {
            path: path.into(),
            file_type,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            confidence_scores: None,
            low_confidence_segments: None,
            lane,
            size_bytes: None,
            topic: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic;
        self
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidState {
                path: self.path.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Pending → InProgress
    pub fn start(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// InProgress → Completed or NeedsVerification.
    ///
    /// `segments` are only recorded for image tasks; a single segment strictly
    /// below `threshold` parks the task for verification.
    pub fn finish(
        &mut self,
        text: String,
        segments: Option<Vec<Segment>>,
        threshold: f64,
    ) -> Result<(), TaskError> {
        let (scores, low) = if self.file_type == FileType::Image {
            let segments = segments.unwrap_or_default();
            let scores: HashMap<String, f64> = segments
                .iter()
                .map(|s| (s.text.clone(), s.confidence))
                .collect();
            let low: Vec<Segment> = segments
                .into_iter()
                .filter(|s| s.confidence < threshold)
                .collect();
            (Some(scores), Some(low))
        } else {
            (None, None)
        };

        let next = match &low {
            Some(low) if !low.is_empty() => TaskStatus::NeedsVerification,
            _ => TaskStatus::Completed,
        };
        self.transition(next)?;

        self.result = Some(text);
        self.confidence_scores = scores;
        self.low_confidence_segments = low;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// InProgress → Failed
    pub fn fail(&mut self, error: String) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// NeedsVerification → Completed, replacing the result unconditionally
    pub fn verify(&mut self, corrected_text: String) -> Result<(), TaskError> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(corrected_text);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_task() -> Task {
        let mut task = Task::new("scan.png", FileType::Image, Lane::Small);
        task.start().unwrap();
        task
    }

    #[test]
    fn test_task_creation() {
        let task = Task::new("notes.txt", FileType::Text, Lane::Small).with_size(11);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.size_bytes, Some(11));
        assert!(task.result.is_none());
        assert!(task.error.is_none());
        assert!(task.confidence_scores.is_none());
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        let all = [Pending, InProgress, Completed, Failed, NeedsVerification];
        let legal = [
            (Pending, InProgress),
            (InProgress, Completed),
            (InProgress, NeedsVerification),
            (InProgress, Failed),
            (NeedsVerification, Completed),
        ];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} → {to}"
                );
            }
        }
    }

    #[test]
    fn test_low_confidence_parks_image() {
        let mut task = image_task();
        let segments = vec![Segment::new("ok", 0.95), Segment::new("maybe", 0.4)];

        task.finish("ok maybe".to_string(), Some(segments), 0.7).unwrap();

        assert_eq!(task.status, TaskStatus::NeedsVerification);
        assert_eq!(
            task.low_confidence_segments,
            Some(vec![Segment::new("maybe", 0.4)])
        );
        assert_eq!(task.confidence_scores.as_ref().unwrap().len(), 2);
        assert_eq!(task.result.as_deref(), Some("ok maybe"));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut task = image_task();
        task.finish("edge".to_string(), Some(vec![Segment::new("edge", 0.7)]), 0.7)
            .unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.low_confidence_segments, Some(vec![]));
    }

    #[test]
    fn test_segments_ignored_for_non_image() {
        let mut task = Task::new("memo.wav", FileType::Audio, Lane::Small);
        task.start().unwrap();
        task.finish("hi".to_string(), Some(vec![Segment::new("hi", 0.1)]), 0.7)
            .unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.confidence_scores.is_none());
        assert!(task.low_confidence_segments.is_none());
    }

    #[test]
    fn test_verify_requires_needs_verification() {
        let mut task = Task::new("notes.txt", FileType::Text, Lane::Small);
        task.start().unwrap();
        task.finish("text".to_string(), None, 0.7).unwrap();

        let err = task.verify("other".to_string()).unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidState {
                from: TaskStatus::Completed,
                to: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(task.result.as_deref(), Some("text"));
    }

    #[test]
    fn test_fail_records_error() {
        let mut task = Task::new("memo.wav", FileType::Audio, Lane::Large);
        task.start().unwrap();
        task.fail("whisper exploded".to_string()).unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("whisper exploded"));
        assert!(task.result.is_none());
        assert!(task.start().is_err());
    }

    #[test]
    fn test_file_type_from_str() {
        assert_eq!("Audio".parse::<FileType>().unwrap(), FileType::Audio);
        assert_eq!("yt".parse::<FileType>().unwrap(), FileType::YouTube);
        assert!("spreadsheet".parse::<FileType>().is_err());
    }
}
