//! Core orchestration logic.
//!
//! This module contains:
//! - Classifier: file name to file type mapping
//! - Scheduler: lane routing and the pause/cancel signal
//! - TaskManager: session task table and lane workers

pub mod classifier;
pub mod manager;
pub mod scheduler;

// Re-export commonly used types
pub use classifier::{classify, is_supported};
pub use manager::{SessionStatus, TaskManager};
pub use scheduler::{route, ControlSignal};
