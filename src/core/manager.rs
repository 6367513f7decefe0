//! Session task manager.
//!
//! Owns the task table and both lanes. Lane workers and the verification
//! path mutate tasks only inside short critical sections on the session
//! mutex; extractor and sink calls always happen with the lock released.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::youtube::is_url;
use crate::adapters::ExtractorRegistry;
use crate::config::SessionConfig;
use crate::domain::{FileType, Lane, Task, TaskError, TaskStatus};
use crate::persistence::{NullSink, PersistenceSink};

use super::scheduler::{
    route, wait_for_signal, wait_for_work, Control, ControlSignal, LaneQueues, LaneSignals,
    QueuedTask,
};

/// Point-in-time view of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub total: usize,
    pub pending_small: usize,
    pub pending_large: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub needs_verification: usize,
    pub failed: usize,
    pub is_paused: bool,
    pub is_cancelled: bool,
}

/// Tasks in insertion order plus the lane queues
#[derive(Debug, Default)]
struct SessionState {
    tasks: Vec<Task>,
    index: HashMap<PathBuf, usize>,
    queues: LaneQueues,
}

impl SessionState {
    fn task_mut(&mut self, path: &Path) -> Option<&mut Task> {
        let idx = *self.index.get(path)?;
        self.tasks.get_mut(idx)
    }

    fn task(&self, path: &Path) -> Option<&Task> {
        self.index.get(path).and_then(|&idx| self.tasks.get(idx))
    }

    fn check_admission(&self, path: &Path, max: usize) -> Result<(), TaskError> {
        if self.tasks.len() >= max {
            return Err(TaskError::CapacityExceeded { max });
        }
        if self.index.contains_key(path) {
            return Err(TaskError::AlreadyTracked(path.to_path_buf()));
        }
        Ok(())
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// Clears the running flag when a run ends (normally or by unwinding)
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Dual-lane task manager for one session
pub struct TaskManager {
    config: SessionConfig,
    registry: ExtractorRegistry,
    sink: Arc<dyn PersistenceSink>,
    state: Mutex<SessionState>,
    control: Control,
    lane_signals: LaneSignals,
    running: AtomicBool,
}

impl TaskManager {
    /// Create a manager; fails if the session config is invalid
    pub fn new(
        config: SessionConfig,
        registry: ExtractorRegistry,
        sink: Arc<dyn PersistenceSink>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            sink,
            state: Mutex::new(SessionState::default()),
            control: Control::new(),
            lane_signals: LaneSignals::default(),
            running: AtomicBool::new(false),
        })
    }

    /// Manager that persists nothing
    pub fn without_persistence(
        config: SessionConfig,
        registry: ExtractorRegistry,
    ) -> anyhow::Result<Self> {
        Self::new(config, registry, Arc::new(NullSink))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Track a new source file and enqueue it in its lane
    pub async fn add_task(
        &self,
        path: impl AsRef<Path>,
        file_type: FileType,
    ) -> Result<Task, TaskError> {
        self.add(path.as_ref(), file_type, None).await
    }

    /// Like [`add_task`](Self::add_task), tagging the task with a topic
    pub async fn add_task_with_topic(
        &self,
        path: impl AsRef<Path>,
        file_type: FileType,
        topic: impl Into<String>,
    ) -> Result<Task, TaskError> {
        self.add(path.as_ref(), file_type, Some(topic.into())).await
    }

    async fn add(
        &self,
        path: &Path,
        file_type: FileType,
        topic: Option<String>,
    ) -> Result<Task, TaskError> {
        let max = self.config.max_files_per_session;
        self.state.lock().await.check_admission(path, max)?;

        let extractor = self
            .registry
            .get(file_type)
            .ok_or(TaskError::NoExtractor(file_type))?;

        let size = source_size(path).await?;
        let lane = route(size, self.config.small_file_threshold_bytes);

        let mut task = Task::new(path, file_type, lane).with_topic(topic);
        task.size_bytes = size;

        {
            let mut state = self.state.lock().await;
            // Another add may have landed while the file was being measured
            state.check_admission(path, max)?;

            let idx = state.tasks.len();
            state.index.insert(path.to_path_buf(), idx);
            state.tasks.push(task.clone());
            state.queues.push(
                lane,
                QueuedTask {
                    path: path.to_path_buf(),
                    extractor,
                },
            );
        }
        self.lane_signals.notify(lane);

        info!(
            path = %path.display(),
            %file_type,
            %lane,
            size_bytes = ?size,
            "Task added"
        );
        Ok(task)
    }

    /// Run both lane workers until [`cancel`](Self::cancel) is observed.
    ///
    /// Returns immediately if the manager was already cancelled.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), TaskError> {
        let _guard = self.acquire_run()?;
        self.run_lanes().await;
        Ok(())
    }

    /// Run until both lanes are empty and nothing is in progress, then cancel
    #[instrument(skip(self))]
    pub async fn run_until_drained(&self) -> Result<(), TaskError> {
        let _guard = self.acquire_run()?;
        tokio::join!(self.run_lanes(), self.cancel_when_drained());
        Ok(())
    }

    /// Add every `(path, type)` pair, then [`run`](Self::run).
    ///
    /// Not atomic: if an add fails, earlier adds stay enqueued and the error
    /// is returned without running.
    pub async fn process_batch(
        &self,
        paths: &[PathBuf],
        types: &[FileType],
    ) -> Result<(), TaskError> {
        if paths.len() != types.len() {
            return Err(TaskError::BatchMismatch {
                paths: paths.len(),
                types: types.len(),
            });
        }

        for (path, file_type) in paths.iter().zip(types) {
            self.add_task(path, *file_type).await?;
        }

        self.run().await
    }

    /// Stop dequeuing in both lanes (in-flight tasks finish)
    pub fn pause(&self) {
        if self.control.pause() {
            info!("Task manager paused");
        }
    }

    /// Resume dequeuing after [`pause`](Self::pause)
    pub fn resume(&self) {
        if self.control.resume() {
            info!("Task manager resumed");
        }
    }

    /// Stop both lanes for good
    pub fn cancel(&self) {
        if self.control.cancel() {
            info!("Task manager cancelled");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.control.current() == ControlSignal::Paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.current() == ControlSignal::Cancelled
    }

    /// Counts per status and lane
    pub async fn get_status(&self) -> SessionStatus {
        let state = self.state.lock().await;

        SessionStatus {
            total: state.tasks.len(),
            pending_small: state.queues.len(Lane::Small),
            pending_large: state.queues.len(Lane::Large),
            in_progress: state.count(TaskStatus::InProgress),
            completed: state.count(TaskStatus::Completed),
            needs_verification: state.count(TaskStatus::NeedsVerification),
            failed: state.count(TaskStatus::Failed),
            is_paused: self.is_paused(),
            is_cancelled: self.is_cancelled(),
        }
    }

    /// Snapshot of one task
    pub async fn get_task(&self, path: impl AsRef<Path>) -> Option<Task> {
        self.state.lock().await.task(path.as_ref()).cloned()
    }

    /// Snapshot of all tasks, in insertion order
    pub async fn tasks(&self) -> Vec<Task> {
        self.state.lock().await.tasks.clone()
    }

    /// Tasks parked for human review, in insertion order
    pub async fn get_tasks_needing_verification(&self) -> Vec<Task> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::NeedsVerification)
            .cloned()
            .collect()
    }

    /// Replace a parked task's result with corrected text and complete it
    pub async fn apply_user_verification(
        &self,
        path: impl AsRef<Path>,
        corrected_text: impl Into<String>,
    ) -> Result<(), TaskError> {
        let path = path.as_ref();
        let text = corrected_text.into();

        let snapshot = {
            let mut state = self.state.lock().await;
            let task = state
                .task_mut(path)
                .ok_or_else(|| TaskError::NotFound(path.to_path_buf()))?;
            task.verify(text.clone())?;
            task.clone()
        };

        info!(path = %path.display(), "Verification applied");

        if let Err(e) = self.sink.update_verified_content(&snapshot, &text).await {
            warn!(
                path = %path.display(),
                sink = self.sink.name(),
                error = %e,
                "Failed to persist verified content"
            );
        }
        self.report_status(&snapshot).await;

        Ok(())
    }

    fn acquire_run(&self) -> Result<RunGuard<'_>, TaskError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TaskError::AlreadyRunning);
        }
        Ok(RunGuard(&self.running))
    }

    async fn run_lanes(&self) {
        info!("Starting lane workers");
        tokio::join!(self.lane_loop(Lane::Small), self.lane_loop(Lane::Large));
        info!("Lane workers stopped");
    }

    async fn cancel_when_drained(&self) {
        let mut control = self.control.subscribe();
        loop {
            if *control.borrow_and_update() == ControlSignal::Cancelled {
                return;
            }
            if self.is_drained().await {
                debug!("Both lanes drained");
                self.cancel();
                return;
            }
            wait_for_signal(&mut control, self.config.idle_wait).await;
        }
    }

    /// Both lanes empty and nothing in flight
    async fn is_drained(&self) -> bool {
        let state = self.state.lock().await;
        state.queues.is_empty() && state.count(TaskStatus::InProgress) == 0
    }

    async fn lane_loop(&self, lane: Lane) {
        let mut control = self.control.subscribe();
        let notify = self.lane_signals.get(lane);
        let idle = self.config.idle_wait;

        loop {
            let signal = *control.borrow_and_update();
            match signal {
                ControlSignal::Cancelled => break,
                ControlSignal::Paused => {
                    wait_for_signal(&mut control, idle).await;
                    continue;
                }
                ControlSignal::Running => {}
            }

            match self.dequeue(lane).await {
                Some((task, queued)) => self.process(task, queued).await,
                None => wait_for_work(notify, &mut control, idle).await,
            }
        }

        debug!(%lane, "Lane worker stopped");
    }

    /// Pop the lane head and mark it in progress in one critical section
    async fn dequeue(&self, lane: Lane) -> Option<(Task, QueuedTask)> {
        let mut state = self.state.lock().await;
        let queued = state.queues.pop(lane)?;

        let Some(task) = state.task_mut(&queued.path) else {
            error!(path = %queued.path.display(), "Queued task missing from table");
            return None;
        };
        if let Err(e) = task.start() {
            error!(error = %e, "Dropping queued task");
            return None;
        }

        Some((task.clone(), queued))
    }

    async fn process(&self, task: Task, queued: QueuedTask) {
        let path = queued.path.clone();
        info!(
            path = %path.display(),
            lane = %task.lane,
            extractor = queued.extractor.name(),
            "Processing task"
        );
        self.report_status(&task).await;

        let started = Instant::now();
        // A panicking extractor fails its own task, not the lane
        let outcome = match AssertUnwindSafe(queued.extractor.extract(&path))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!(
                "Extractor {} panicked: {}",
                queued.extractor.name(),
                panic_message(panic.as_ref())
            )),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let snapshot = {
            let mut state = self.state.lock().await;
            let Some(task) = state.task_mut(&path) else {
                error!(path = %path.display(), "Task vanished while processing");
                return;
            };

            let applied = match outcome {
                Ok(extraction) => task.finish(
                    extraction.text,
                    extraction.segments,
                    self.config.confidence_threshold,
                ),
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(path = %path.display(), error = %message, "Extraction failed");
                    task.fail(message)
                }
            };
            if let Err(e) = applied {
                error!(error = %e, "Could not record extraction outcome");
                return;
            }
            task.clone()
        };

        if snapshot.status.has_result() {
            if let Err(e) = self.sink.save_processed_content(&snapshot).await {
                warn!(
                    path = %path.display(),
                    sink = self.sink.name(),
                    error = %e,
                    "Failed to persist processed content"
                );
            }
        }
        self.report_status(&snapshot).await;

        info!(
            path = %path.display(),
            status = %snapshot.status,
            duration_ms,
            "Task finished"
        );
    }

    async fn report_status(&self, task: &Task) {
        if let Err(e) = self.sink.update_task_status(task).await {
            warn!(
                path = %task.path.display(),
                status = %task.status,
                sink = self.sink.name(),
                error = %e,
                "Failed to persist task status"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Size of a local source; None for remote URLs
async fn source_size(path: &Path) -> Result<Option<u64>, TaskError> {
    if is_url(&path.to_string_lossy()) {
        return Ok(None);
    }

    let metadata = tokio::fs::metadata(path).await.map_err(|source| TaskError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(metadata.len()))
}
