//! Dual-lane scheduling primitives.
//!
//! Tasks are routed by size into a small or large lane, each drained by its
//! own worker loop. Workers observe a shared tri-state [`ControlSignal`] at
//! every poll boundary and sleep on a per-lane [`Notify`] when idle.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};

use crate::adapters::Extractor;
pub use crate::domain::Lane;

/// Pick the lane for a task of `size_bytes` (None = unknown, e.g. a URL).
///
/// The threshold is inclusive to the small lane.
pub fn route(size_bytes: Option<u64>, small_threshold_bytes: u64) -> Lane {
    match size_bytes {
        Some(size) if size <= small_threshold_bytes => Lane::Small,
        _ => Lane::Large,
    }
}

/// A task waiting in a lane, with its extractor already resolved
#[derive(Clone)]
pub struct QueuedTask {
    pub path: PathBuf,
    pub extractor: Arc<dyn Extractor>,
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("path", &self.path)
            .field("extractor", &self.extractor.name())
            .finish()
    }
}

/// FIFO queues for both lanes
#[derive(Debug, Default)]
pub struct LaneQueues {
    small: VecDeque<QueuedTask>,
    large: VecDeque<QueuedTask>,
}

impl LaneQueues {
    fn lane_mut(&mut self, lane: Lane) -> &mut VecDeque<QueuedTask> {
        match lane {
            Lane::Small => &mut self.small,
            Lane::Large => &mut self.large,
        }
    }

    pub fn push(&mut self, lane: Lane, task: QueuedTask) {
        self.lane_mut(lane).push_back(task);
    }

    pub fn pop(&mut self, lane: Lane) -> Option<QueuedTask> {
        self.lane_mut(lane).pop_front()
    }

    pub fn len(&self, lane: Lane) -> usize {
        match lane {
            Lane::Small => self.small.len(),
            Lane::Large => self.large.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.small.is_empty() && self.large.is_empty()
    }
}

/// Wakeups for idle lane workers
#[derive(Debug, Default)]
pub struct LaneSignals {
    small: Notify,
    large: Notify,
}

impl LaneSignals {
    pub fn get(&self, lane: Lane) -> &Notify {
        match lane {
            Lane::Small => &self.small,
            Lane::Large => &self.large,
        }
    }

    /// Wake the lane's worker (or leave a permit if it is busy)
    pub fn notify(&self, lane: Lane) {
        self.get(lane).notify_one();
    }
}

/// Global run state observed by both lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Running,
    Paused,
    Cancelled,
}

/// Owner of the control signal.
///
/// Cancellation is sticky: once cancelled, pause and resume are no-ops.
#[derive(Debug)]
pub struct Control {
    tx: watch::Sender<ControlSignal>,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlSignal::Running);
        Self { tx }
    }

    /// Current signal
    pub fn current(&self) -> ControlSignal {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSignal> {
        self.tx.subscribe()
    }

    /// Running → Paused; returns whether the signal changed
    pub fn pause(&self) -> bool {
        self.tx.send_if_modified(|signal| {
            if *signal == ControlSignal::Running {
                *signal = ControlSignal::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Paused → Running; returns whether the signal changed
    pub fn resume(&self) -> bool {
        self.tx.send_if_modified(|signal| {
            if *signal == ControlSignal::Paused {
                *signal = ControlSignal::Running;
                true
            } else {
                false
            }
        })
    }

    /// Any → Cancelled; returns whether the signal changed
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|signal| {
            if *signal != ControlSignal::Cancelled {
                *signal = ControlSignal::Cancelled;
                true
            } else {
                false
            }
        })
    }
}

/// Idle until work is enqueued, the control signal changes, or `idle` elapses
pub async fn wait_for_work(
    notify: &Notify,
    control: &mut watch::Receiver<ControlSignal>,
    idle: Duration,
) {
    tokio::select! {
        _ = notify.notified() => {}
        _ = control.changed() => {}
        _ = tokio::time::sleep(idle) => {}
    }
}

/// Idle until the control signal changes or `idle` elapses
pub async fn wait_for_signal(control: &mut watch::Receiver<ControlSignal>, idle: Duration) {
    tokio::select! {
        _ = control.changed() => {}
        _ = tokio::time::sleep(idle) => {}
    }
}
