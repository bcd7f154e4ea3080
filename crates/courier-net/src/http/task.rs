//! Transfer state for the single in-flight task.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_core::CancellationToken;

use crate::error::NetworkError;

/// Unique identifier for a task created by a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a fresh, process-unique task ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A session's handle to one of its tasks.
///
/// Handles are owned by the session that created them. The transfer manager
/// only clones and compares them; it never releases the underlying task.
pub trait TaskHandle: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identifier of the task this handle refers to.
    fn id(&self) -> TaskId;

    /// The URL the task was created for.
    fn url(&self) -> &str;
}

/// Lifecycle of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TaskState {
    /// No transfer has been started.
    #[default]
    Idle,
    /// Task created but not yet resumed.
    Created,
    /// Task is executing.
    Running,
    /// A redirect was just reported; the next response moves back to `Running`.
    Redirected,
    /// Task finished without a transport error.
    Completed,
    /// Task finished with a transport or protocol error, or was cancelled.
    Failed,
}

impl TaskState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` while a task exists and has not reached a terminal state.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Running | Self::Redirected)
    }
}

/// Progress information for a transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Number of bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total number of bytes, if known.
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Get the progress as a fraction (0.0 to 1.0), if total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                self.bytes_transferred as f64 / total as f64
            }
        })
    }

    /// Get the progress as a percentage (0 to 100), if total is known.
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0).min(100.0) as u8)
    }
}

/// The manager's record of its one active task.
///
/// Only ever touched under the manager's mutex.
#[derive(Debug)]
pub(crate) struct ActiveTask<T> {
    pub(crate) task: Option<T>,
    pub(crate) state: TaskState,
    pub(crate) redirects: u32,
    pub(crate) status: Option<u16>,
    pub(crate) final_url: Option<String>,
    pub(crate) progress: TransferProgress,
    pub(crate) error: Option<NetworkError>,
    /// Error to report on completion in place of the one the session delivers.
    pub(crate) abort_reason: Option<NetworkError>,
    pub(crate) cancel: CancellationToken,
}

impl<T> Default for ActiveTask<T> {
    fn default() -> Self {
        Self {
            task: None,
            state: TaskState::Idle,
            redirects: 0,
            status: None,
            final_url: None,
            progress: TransferProgress::default(),
            error: None,
            abort_reason: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl<T: TaskHandle> ActiveTask<T> {
    /// Fresh state for a newly created task.
    pub(crate) fn created(task: T) -> Self {
        Self {
            task: Some(task),
            state: TaskState::Created,
            ..Default::default()
        }
    }

    /// Whether `id` names the task this record currently tracks.
    pub(crate) fn tracks(&self, id: TaskId) -> bool {
        self.task.as_ref().is_some_and(|task| task.id() == id)
    }

    pub(crate) fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            task_id: self.task.as_ref().map(|task| task.id()),
            url: self.task.as_ref().map(|task| task.url().to_string()),
            final_url: self.final_url.clone(),
            state: self.state,
            redirects: self.redirects,
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
        }
    }
}

/// A consistent copy of the transfer state, taken under the manager's lock.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferSnapshot {
    /// ID of the tracked task, if one has been started.
    pub task_id: Option<TaskId>,
    /// URL the transfer was started with.
    pub url: Option<String>,
    /// URL of the most recent response, after any redirects.
    pub final_url: Option<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Number of redirects reported so far.
    pub redirects: u32,
    /// Status code of the most recent response headers.
    pub status: Option<u16>,
    /// Body bytes received against the expected length.
    pub progress: TransferProgress,
    /// Error the transfer failed with.
    pub error: Option<NetworkError>,
}

impl TransferSnapshot {
    /// Returns `true` once the transfer reached `Completed` or `Failed`.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns `true` if the transfer completed without error.
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct FakeTask(TaskId);

    impl TaskHandle for FakeTask {
        fn id(&self) -> TaskId {
            self.0
        }

        fn url(&self) -> &str {
            "https://example.com/"
        }
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(a.to_string(), format!("task-{}", a.as_u64()));
    }

    #[test]
    fn test_state_classification() {
        assert!(!TaskState::Idle.is_live());
        assert!(TaskState::Created.is_live());
        assert!(TaskState::Redirected.is_live());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_progress_fraction() {
        let progress = TransferProgress {
            bytes_transferred: 50,
            total_bytes: Some(200),
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(progress.percent(), Some(25));

        let unknown = TransferProgress {
            bytes_transferred: 50,
            total_bytes: None,
        };
        assert_eq!(unknown.percent(), None);

        let empty = TransferProgress {
            bytes_transferred: 0,
            total_bytes: Some(0),
        };
        assert_eq!(empty.percent(), Some(100));
    }

    #[test]
    fn test_created_record_is_zeroed() {
        let id = TaskId::next();
        let record = ActiveTask::created(FakeTask(id));
        assert!(record.tracks(id));
        assert!(!record.tracks(TaskId::next()));

        let snapshot = record.snapshot();
        assert_eq!(snapshot.task_id, Some(id));
        assert_eq!(snapshot.state, TaskState::Created);
        assert_eq!(snapshot.redirects, 0);
        assert_eq!(snapshot.status, None);
        assert!(!snapshot.is_finished());
    }
}
