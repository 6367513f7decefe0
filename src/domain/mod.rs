//! Domain types for the task manager.
//!
//! This module contains the core data structures:
//! - Task: a tracked source file and its status state machine
//! - TaskRecord: journal entries handed to persistence sinks

pub mod record;
pub mod task;

// Re-export commonly used types
pub use record::{content_hash, RecordKind, TaskRecord};
pub use task::{FileType, Lane, Segment, Task, TaskError, TaskStatus};
