//! Verification Integration Tests
//!
//! Low-confidence image results and human corrections.

mod common;

use common::*;
use notecrew::{ExtractorRegistry, FileType, Segment, TaskError, TaskStatus};
use tempfile::TempDir;

#[tokio::test]
async fn test_low_confidence_image_is_parked_then_verified() {
    let temp = TempDir::new().unwrap();
    let sink = RecordingSink::new();
    let manager = manager_with(
        test_config(),
        ExtractorRegistry::new().with(
            FileType::Image,
            FixedExtractor::segments(&[("ok", 0.95), ("maybe", 0.4)]),
        ),
        sink.clone(),
    );
    let scan = write_file(&temp, "scan.png", "png");
    manager.add_task(&scan, FileType::Image).await.unwrap();

    manager.run_until_drained().await.unwrap();

    let parked = manager.get_tasks_needing_verification().await;
    assert_eq!(parked.len(), 1);
    let task = &parked[0];
    assert_eq!(task.status, TaskStatus::NeedsVerification);
    assert_eq!(task.result.as_deref(), Some("ok maybe"));
    assert_eq!(
        task.low_confidence_segments,
        Some(vec![Segment::new("maybe", 0.4)])
    );
    let scores = task.confidence_scores.as_ref().unwrap();
    assert_eq!(scores.get("ok"), Some(&0.95));
    assert_eq!(scores.get("maybe"), Some(&0.4));

    manager
        .apply_user_verification(&scan, "corrected")
        .await
        .unwrap();

    let task = manager.get_task(&scan).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("corrected"));
    assert!(manager.get_tasks_needing_verification().await.is_empty());

    assert_eq!(
        sink.calls_for(&scan),
        vec![
            SinkCall::Status(scan.clone(), TaskStatus::InProgress),
            SinkCall::Content(
                scan.clone(),
                TaskStatus::NeedsVerification,
                Some("ok maybe".to_string())
            ),
            SinkCall::Status(scan.clone(), TaskStatus::NeedsVerification),
            SinkCall::Verified(scan.clone(), "corrected".to_string()),
            SinkCall::Status(scan.clone(), TaskStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_confident_image_completes() {
    let temp = TempDir::new().unwrap();
    let manager = manager_with(
        test_config(),
        ExtractorRegistry::new().with(
            FileType::Image,
            FixedExtractor::segments(&[("clear", 0.99), ("edge", 0.7)]),
        ),
        RecordingSink::new(),
    );
    let scan = write_file(&temp, "scan.jpg", "jpg");
    manager.add_task(&scan, FileType::Image).await.unwrap();

    manager.run_until_drained().await.unwrap();

    let task = manager.get_task(&scan).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.low_confidence_segments, Some(vec![]));
    assert!(manager.get_tasks_needing_verification().await.is_empty());
}

#[tokio::test]
async fn test_low_scores_on_non_image_are_ignored() {
    let temp = TempDir::new().unwrap();
    let manager = manager_with(
        test_config(),
        ExtractorRegistry::new().with(
            FileType::Audio,
            FixedExtractor::segments(&[("mumble", 0.1)]),
        ),
        RecordingSink::new(),
    );
    let memo = write_file(&temp, "memo.wav", "RIFF");
    manager.add_task(&memo, FileType::Audio).await.unwrap();

    manager.run_until_drained().await.unwrap();

    let task = manager.get_task(&memo).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.confidence_scores.is_none());
    assert!(task.low_confidence_segments.is_none());
}

#[tokio::test]
async fn test_verification_rejected_outside_needs_verification() {
    let temp = TempDir::new().unwrap();
    let sink = RecordingSink::new();
    let registry = ExtractorRegistry::new()
        .with(FileType::Text, FixedExtractor::text("hello world"))
        .with(FileType::Audio, FixedExtractor::failing("no audio"));
    let manager = manager_with(test_config(), registry, sink.clone());

    let note = write_file(&temp, "note.txt", "hello world");
    let memo = write_file(&temp, "memo.wav", "RIFF");
    manager.add_task(&note, FileType::Text).await.unwrap();
    manager.add_task(&memo, FileType::Audio).await.unwrap();
    manager.run_until_drained().await.unwrap();
    let calls_before = sink.calls().len();

    let err = manager
        .apply_user_verification(&note, "other")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TaskError::InvalidState {
            from: TaskStatus::Completed,
            ..
        }
    ));
    assert_eq!(
        manager.get_task(&note).await.unwrap().result.as_deref(),
        Some("hello world")
    );

    let err = manager
        .apply_user_verification(&memo, "other")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TaskError::InvalidState {
            from: TaskStatus::Failed,
            ..
        }
    ));
    let memo_task = manager.get_task(&memo).await.unwrap();
    assert_eq!(memo_task.status, TaskStatus::Failed);
    assert!(memo_task.result.is_none());

    let unknown = temp.path().join("unknown.png");
    let err = manager
        .apply_user_verification(&unknown, "other")
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::NotFound(ref p) if p == &unknown));

    assert_eq!(sink.calls().len(), calls_before);
}

#[tokio::test]
async fn test_sink_failure_does_not_fail_task() {
    let temp = TempDir::new().unwrap();
    let sink = RecordingSink::failing();
    let manager = manager_with(
        test_config(),
        ExtractorRegistry::new().with(
            FileType::Image,
            FixedExtractor::segments(&[("blurry", 0.2)]),
        ),
        sink.clone(),
    );
    let scan = write_file(&temp, "scan.png", "png");
    manager.add_task(&scan, FileType::Image).await.unwrap();

    manager.run_until_drained().await.unwrap();
    assert_eq!(
        manager.get_task(&scan).await.unwrap().status,
        TaskStatus::NeedsVerification
    );

    manager
        .apply_user_verification(&scan, "sharp")
        .await
        .unwrap();
    let task = manager.get_task(&scan).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("sharp"));

    // Every call was attempted despite the errors
    assert_eq!(sink.calls().len(), 5);
}
