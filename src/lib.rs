//! notecrew - Dual-lane note extraction orchestrator
//!
//! Turns heterogeneous sources (audio, scanned images, text, video) into
//! text. Each session tracks a bounded set of files, routes them into a
//! small-file or large-file lane, and runs both lanes concurrently.
//!
//! # Architecture
//!
//! - Tasks move through a fixed status state machine
//! - Image extraction yields scored segments; anything below the
//!   confidence threshold parks the task until a human supplies a correction
//! - Every transition is reported to a persistence sink (JSONL or SQLite)
//!
//! # Modules
//!
//! - `adapters`: Extractors (whisper, vision OCR, yt-dlp, plain text)
//! - `core`: Classifier, lane scheduler, TaskManager
//! - `domain`: Task, statuses, journal records
//! - `persistence`: Sinks for task updates
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Extract a batch of files
//! notecrew process memo.m4a scan.png notes.txt
//!
//! # Review low-confidence OCR interactively
//! notecrew process scan.png --verify
//!
//! # Show the journal for a file
//! notecrew history scan.png
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod persistence;

// Re-export main types at crate root for convenience
pub use adapters::{Extraction, Extractor, ExtractorRegistry};
pub use config::SessionConfig;
pub use crate::core::{classify, SessionStatus, TaskManager};
pub use domain::{FileType, Lane, Segment, Task, TaskError, TaskStatus};
pub use persistence::{JsonlSink, NullSink, PersistenceSink, SqliteSink};
