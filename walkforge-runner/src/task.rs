//! Background walk-forward tasks — spawn, poll, cancel, join.
//!
//! A run executes on its own named thread. The worker is the only writer of
//! the task's progress counters; pollers read them lock-free via
//! [`TaskHandle::snapshot`]. Progress events are also pushed over an `mpsc`
//! channel for callers that prefer to block on updates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use walkforge_core::CandleSeries;

use crate::config::WalkForwardConfig;
use crate::walk_forward::{run_walk_forward, RunControl, WalkForwardError, WalkForwardResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            4 => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    /// `completed_windows / total_windows`, in `[0, 1]`.
    pub progress_fraction: f64,
    pub total_windows: usize,
    pub completed_windows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        total_windows: usize,
    },
    WindowCompleted {
        index: usize,
        completed: usize,
        total: usize,
        disqualified: bool,
    },
    Finished {
        status: TaskStatus,
    },
}

// ─── Shared progress ─────────────────────────────────────────────────

/// Progress counters shared between the worker and its handle.
#[derive(Debug, Default)]
pub(crate) struct TaskState {
    status: AtomicU8,
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl TaskState {
    fn set_status(&self, status: TaskStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub(crate) fn apply(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { total_windows } => {
                self.total.store(*total_windows, Ordering::Release);
                self.set_status(TaskStatus::Running);
            }
            ProgressEvent::WindowCompleted { completed, .. } => {
                self.completed.store(*completed, Ordering::Release);
            }
            ProgressEvent::Finished { status } => self.set_status(*status),
        }
    }

    fn snapshot(&self, task_id: &str) -> Task {
        let status = TaskStatus::from_u8(self.status.load(Ordering::Acquire));
        let total = self.total.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);
        let progress_fraction = if total > 0 {
            completed as f64 / total as f64
        } else if status == TaskStatus::Completed {
            1.0
        } else {
            0.0
        };
        Task {
            task_id: task_id.to_string(),
            status,
            progress_fraction,
            total_windows: total,
            completed_windows: completed,
        }
    }
}

// ─── Handle ──────────────────────────────────────────────────────────

/// Owner-side handle to a running walk-forward.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: String,
    state: Arc<TaskState>,
    cancel: Arc<AtomicBool>,
    events: Receiver<ProgressEvent>,
    thread: JoinHandle<Result<WalkForwardResult, WalkForwardError>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn snapshot(&self) -> Task {
        self.state.snapshot(&self.task_id)
    }

    /// Request cooperative cancellation; completed windows are kept.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the run ends.
    pub fn join(self) -> Result<WalkForwardResult, WalkForwardError> {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                self.state.set_status(TaskStatus::Failed);
                Err(WalkForwardError::WorkerPanicked)
            }
        }
    }
}

/// Start a walk-forward on a background thread and return immediately.
pub fn spawn_walk_forward(
    config: WalkForwardConfig,
    series: CandleSeries,
) -> std::io::Result<TaskHandle> {
    let task_id = next_task_id(&config);
    let state = Arc::new(TaskState::default());
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let control = RunControl::new()
        .with_cancel(Arc::clone(&cancel))
        .with_events(tx)
        .with_state(Arc::clone(&state));

    let thread = thread::Builder::new()
        .name(format!("walkforge-task-{}", &task_id[..8]))
        .spawn(move || run_walk_forward(&config, &series, &control))?;

    Ok(TaskHandle {
        task_id,
        state,
        cancel,
        events: rx,
        thread,
    })
}

/// Unique per process: config fingerprint, a counter and the wall clock.
fn next_task_id(config: &WalkForwardConfig) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(config.fingerprint().as_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(&now.to_le_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}
