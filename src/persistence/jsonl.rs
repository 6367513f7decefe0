//! Append-only JSONL task journal.
//!
//! Every sink call becomes one [`TaskRecord`] line. Appends take an exclusive
//! file lock so concurrent lanes (or processes) never interleave lines.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::domain::{Task, TaskRecord};

use super::PersistenceSink;

/// File-based task journal
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Open (or create the directory for) a journal
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create journal directory: {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    /// Append a record to the journal
    pub async fn append(&self, record: &TaskRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize task record")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &json))
            .await
            .context("Journal writer panicked")?
    }

    /// Replay all records in order
    pub async fn replay(&self) -> Result<Vec<TaskRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: TaskRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse task record: {}", line))?;
            records.push(record);
        }

        Ok(records)
    }

    /// All records for one source path, in order
    pub async fn history(&self, path: &Path) -> Result<Vec<TaskRecord>> {
        let records = self.replay().await?;
        Ok(records.into_iter().filter(|r| r.path == path).collect())
    }
}

fn append_line(path: &Path, json: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open journal: {}", path.display()))?;

    file.lock_exclusive()
        .with_context(|| format!("Failed to lock journal: {}", path.display()))?;

    writeln!(file, "{}", json).context("Failed to write task record")?;
    file.flush().context("Failed to flush task record")?;

    // Lock is released when file is dropped
    Ok(())
}

#[async_trait]
impl PersistenceSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn update_task_status(&self, task: &Task) -> Result<()> {
        self.append(&TaskRecord::status_changed(task)).await
    }

    async fn save_processed_content(&self, task: &Task) -> Result<()> {
        self.append(&TaskRecord::content_saved(task)).await
    }

    async fn update_verified_content(&self, task: &Task, text: &str) -> Result<()> {
        self.append(&TaskRecord::content_verified(task, text)).await
    }
}
