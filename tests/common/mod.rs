//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use notecrew::{
    Extraction, Extractor, ExtractorRegistry, FileType, PersistenceSink, Segment, SessionConfig,
    Task, TaskManager, TaskStatus,
};

/// Returns the same extraction (or error) for every path
pub struct FixedExtractor {
    outcome: std::result::Result<Extraction, String>,
}

impl FixedExtractor {
    pub fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(Extraction::text(text)),
        })
    }

    pub fn segments(segments: &[(&str, f64)]) -> Arc<Self> {
        let segments = segments
            .iter()
            .map(|(text, confidence)| Segment::new(*text, *confidence))
            .collect();
        Arc::new(Self {
            outcome: Ok(Extraction::from_segments(segments)),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl Extractor for FixedExtractor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(&self, _path: &Path) -> Result<Extraction> {
        match &self.outcome {
            Ok(extraction) => Ok(extraction.clone()),
            Err(message) => anyhow::bail!("{}", message),
        }
    }
}

/// Blocks every extraction until a permit is released
pub struct GatedExtractor {
    gate: Semaphore,
    started: AtomicUsize,
    order: Mutex<Vec<PathBuf>>,
}

impl GatedExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        })
    }

    /// Let `n` blocked (or future) extractions finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Paths in the order their extraction began
    pub fn start_order(&self) -> Vec<PathBuf> {
        self.order.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` extractions have begun
    pub async fn wait_started(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("extraction never started");
    }
}

#[async_trait]
impl Extractor for GatedExtractor {
    fn name(&self) -> &str {
        "gated"
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        self.order.lock().unwrap().push(path.to_path_buf());
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await?.forget();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Extraction::text(format!("text of {}", name)))
    }
}

/// Panics on every extraction
pub struct PanickingExtractor;

#[async_trait]
impl Extractor for PanickingExtractor {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn extract(&self, path: &Path) -> Result<Extraction> {
        panic!("decoder blew up on {}", path.display());
    }
}

/// One observed sink call
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Status(PathBuf, TaskStatus),
    Content(PathBuf, TaskStatus, Option<String>),
    Verified(PathBuf, String),
}

/// Records every call; optionally fails all of them
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, path: &Path) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                SinkCall::Status(p, _) | SinkCall::Content(p, _, _) | SinkCall::Verified(p, _) => {
                    p == path
                }
            })
            .collect()
    }

    fn record(&self, call: SinkCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn update_task_status(&self, task: &Task) -> Result<()> {
        self.record(SinkCall::Status(task.path.clone(), task.status))
    }

    async fn save_processed_content(&self, task: &Task) -> Result<()> {
        self.record(SinkCall::Content(
            task.path.clone(),
            task.status,
            task.result.clone(),
        ))
    }

    async fn update_verified_content(&self, task: &Task, text: &str) -> Result<()> {
        self.record(SinkCall::Verified(task.path.clone(), text.to_string()))
    }
}

/// Session config with a short idle wait so tests stay fast
pub fn test_config() -> SessionConfig {
    SessionConfig::default().with_idle_wait(Duration::from_millis(10))
}

pub fn manager_with(
    config: SessionConfig,
    registry: ExtractorRegistry,
    sink: Arc<dyn PersistenceSink>,
) -> Arc<TaskManager> {
    Arc::new(TaskManager::new(config, registry, sink).unwrap())
}

/// Write `content` to a new file under `dir`
pub fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Create a sparse file of exactly `len` bytes
pub fn sized_file(dir: &TempDir, name: &str, len: u64) -> PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(len).unwrap();
    path
}

/// Poll until the task reaches `status`
pub async fn wait_for_status(manager: &TaskManager, path: &Path, status: TaskStatus) -> Task {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = manager.get_task(path).await {
                if task.status == status {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {}", path.display(), status))
}

/// Every file type mapped to the same extractor
pub fn registry_for_all(extractor: Arc<dyn Extractor>) -> ExtractorRegistry {
    FileType::ALL
        .iter()
        .fold(ExtractorRegistry::new(), |registry, file_type| {
            registry.with(*file_type, extractor.clone())
        })
}
