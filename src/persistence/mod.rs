//! Persistence sinks for task updates.
//!
//! The task manager reports every status change and content update to a
//! [`PersistenceSink`]. Sinks are best effort: the manager logs their errors
//! and carries on.

pub mod jsonl;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{PersistenceBackend, PersistenceSettings};
use crate::domain::Task;

pub use jsonl::JsonlSink;
pub use sqlite::SqliteSink;

/// Receiver of task updates.
///
/// Each call gets a snapshot of the task taken right after the transition.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Human-readable sink name
    fn name(&self) -> &str;

    /// The task's status changed (error is set on failed tasks)
    async fn update_task_status(&self, task: &Task) -> Result<()>;

    /// Extraction output is available on the task
    async fn save_processed_content(&self, task: &Task) -> Result<()>;

    /// A human replaced the task's result with `text`
    async fn update_verified_content(&self, task: &Task, text: &str) -> Result<()>;
}

/// Sink that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn update_task_status(&self, _task: &Task) -> Result<()> {
        Ok(())
    }

    async fn save_processed_content(&self, _task: &Task) -> Result<()> {
        Ok(())
    }

    async fn update_verified_content(&self, _task: &Task, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Open the sink selected by configuration
pub async fn open_sink(settings: &PersistenceSettings) -> Result<Arc<dyn PersistenceSink>> {
    let sink: Arc<dyn PersistenceSink> = match settings.backend {
        PersistenceBackend::Jsonl => Arc::new(JsonlSink::open(&settings.path).await?),
        PersistenceBackend::Sqlite => Arc::new(SqliteSink::open(&settings.path).await?),
        PersistenceBackend::None => Arc::new(NullSink),
    };
    Ok(sink)
}
