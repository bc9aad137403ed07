//! Task records tracked by the Worker Pool.

use crate::model::{TaskPhase, TaskPayload, TaskProgress, TaskType};
use crate::strategies::CancellationToken;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub(crate) struct QueuedTask {
    pub task_id: String,
    pub task_type: TaskType,
    pub payload: TaskPayload,
    pub timeout: Duration,
    pub token: CancellationToken,
    pub submitted_at: DateTime<Utc>,
}

/// The pool's canonical, mutable record for one task.
pub(crate) struct TaskRecord {
    pub task_type: TaskType,
    pub phase: TaskPhase,
    pub progress: u8,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub token: CancellationToken,
}

impl TaskRecord {
    pub fn to_progress(&self, task_id: &str) -> TaskProgress {
        TaskProgress {
            task_id: task_id.to_string(),
            phase: self.phase,
            progress: self.progress,
            message: self.message.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// A handle returned on submission: the task's id and a way to request
/// cancellation.
#[derive(Clone)]
pub struct TaskHandle {
    pub task_id: String,
    pub(crate) token: CancellationToken,
}

impl TaskHandle {
    /// Transitions the task to `cancelled` if it is not already terminal.
    /// A no-op after the task has reached a terminal state.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}
