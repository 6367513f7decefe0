//! SQLite task store.
//!
//! Tables:
//! - `topics`: optional grouping tags
//! - `sources`: one row per task path with its latest status
//! - `contents`: versioned text per source (extracted, then verified)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::Task;

use super::PersistenceSink;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS topics (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS sources (
    id         INTEGER PRIMARY KEY,
    topic_id   INTEGER REFERENCES topics(id),
    type       TEXT NOT NULL,
    origin     TEXT NOT NULL UNIQUE,
    status     TEXT NOT NULL,
    error      TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contents (
    id           INTEGER PRIMARY KEY,
    source_id    INTEGER NOT NULL REFERENCES sources(id),
    content_type TEXT NOT NULL,
    content      TEXT NOT NULL,
    confidence   TEXT,
    version      INTEGER NOT NULL,
    created_at   TEXT NOT NULL
);
"#;

/// Latest stored content for a source
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContent {
    pub content_type: String,
    pub content: String,
    pub version: i64,
}

/// SQLite-backed persistence sink
#[derive(Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSink {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let db_path = path;
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&db_path)
                .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
            conn.execute_batch(SCHEMA).context("Failed to create schema")?;
            Ok(conn)
        })
        .await
        .context("Database opener panicked")??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
            f(&guard)
        })
        .await
        .context("Database worker panicked")?
    }

    /// Current status string recorded for a source path
    pub async fn source_status(&self, origin: &Path) -> Result<Option<String>> {
        let origin = origin.to_string_lossy().to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT status FROM sources WHERE origin = ?1",
                params![origin],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query source status")
        })
        .await
    }

    /// Highest-version content stored for a source path
    pub async fn latest_content(&self, origin: &Path) -> Result<Option<StoredContent>> {
        let origin = origin.to_string_lossy().to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT c.content_type, c.content, c.version
                 FROM contents c JOIN sources s ON s.id = c.source_id
                 WHERE s.origin = ?1
                 ORDER BY c.version DESC LIMIT 1",
                params![origin],
                |row| {
                    Ok(StoredContent {
                        content_type: row.get(0)?,
                        content: row.get(1)?,
                        version: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query content")
        })
        .await
    }

    /// Source paths grouped under a topic
    pub async fn topic_sources(&self, topic: &str) -> Result<Vec<String>> {
        let topic = topic.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.origin FROM sources s JOIN topics t ON t.id = s.topic_id
                 WHERE t.name = ?1 ORDER BY s.id",
            )?;
            let rows = stmt
                .query_map(params![topic], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to query topic sources")?;
            Ok(rows)
        })
        .await
    }
}

/// Insert or update the source row for a task, returning its id
fn upsert_source(conn: &Connection, task: &SourceRow) -> Result<i64> {
    let topic_id: Option<i64> = match task.topic.as_deref() {
        Some(name) => {
            conn.execute(
                "INSERT OR IGNORE INTO topics (name) VALUES (?1)",
                params![name],
            )?;
            Some(conn.query_row(
                "SELECT id FROM topics WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?)
        }
        None => None,
    };

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sources (topic_id, type, origin, status, error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(origin) DO UPDATE SET
             topic_id = excluded.topic_id,
             status = excluded.status,
             error = excluded.error,
             updated_at = excluded.updated_at",
        params![topic_id, task.file_type, task.origin, task.status, task.error, now],
    )
    .context("Failed to upsert source")?;

    conn.query_row(
        "SELECT id FROM sources WHERE origin = ?1",
        params![task.origin],
        |row| row.get(0),
    )
    .context("Failed to read source id")
}

/// Append a new content version for a source
fn insert_content(
    conn: &Connection,
    source_id: i64,
    content_type: &str,
    content: &str,
    confidence: Option<&str>,
) -> Result<i64> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM contents WHERE source_id = ?1",
        params![source_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO contents (source_id, content_type, content, confidence, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            source_id,
            content_type,
            content,
            confidence,
            version,
            Utc::now().to_rfc3339()
        ],
    )
    .context("Failed to insert content")?;

    Ok(version)
}

/// Owned copy of the task fields the store needs
struct SourceRow {
    origin: String,
    topic: Option<String>,
    file_type: String,
    status: String,
    error: Option<String>,
}

impl From<&Task> for SourceRow {
    fn from(task: &Task) -> Self {
        Self {
            origin: task.path.to_string_lossy().to_string(),
            topic: task.topic.clone(),
            file_type: task.file_type.to_string(),
            status: task.status.to_string(),
            error: task.error.clone(),
        }
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn update_task_status(&self, task: &Task) -> Result<()> {
        let row = SourceRow::from(task);
        self.with_conn(move |conn| upsert_source(conn, &row).map(|_| ()))
            .await
    }

    async fn save_processed_content(&self, task: &Task) -> Result<()> {
        let row = SourceRow::from(task);
        let content = task.result.clone().unwrap_or_default();
        let confidence = match (&task.confidence_scores, &task.low_confidence_segments) {
            (None, None) => None,
            (scores, low) => Some(
                serde_json::to_string(&serde_json::json!({
                    "scores": scores,
                    "low_confidence_segments": low,
                }))
                .context("Failed to serialize confidence data")?,
            ),
        };

        self.with_conn(move |conn| {
            let source_id = upsert_source(conn, &row)?;
            insert_content(conn, source_id, "extracted", &content, confidence.as_deref())?;
            Ok(())
        })
        .await
    }

    async fn update_verified_content(&self, task: &Task, text: &str) -> Result<()> {
        let row = SourceRow::from(task);
        let text = text.to_string();

        self.with_conn(move |conn| {
            let source_id = upsert_source(conn, &row)?;
            insert_content(conn, source_id, "verified", &text, None)?;
            Ok(())
        })
        .await
    }
}
