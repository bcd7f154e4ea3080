//! The networking capability a transfer manager drives.

use std::sync::Arc;

use super::delegate::TransferDelegate;
use super::task::TaskHandle;
use crate::error::Result;

/// A networking session that executes tasks and reports on them asynchronously.
///
/// The session owns its tasks and whatever threads deliver their events. The
/// transfer manager asks it to create, resume and cancel tasks, and hosts its
/// event loop on a dedicated thread via [`run_event_loop`](Self::run_event_loop).
pub trait Session: Send + Sync + 'static {
    /// Handle to a task created by this session.
    type Task: TaskHandle;

    /// Create a task for `url` that reports to `delegate`.
    ///
    /// The task does nothing until [`resume`](Self::resume) is called.
    fn create_task(
        &self,
        url: &str,
        delegate: Arc<dyn TransferDelegate<Self::Task>>,
    ) -> Result<Self::Task>;

    /// Start executing a created task.
    ///
    /// Delegate hooks may fire before this returns.
    fn resume(&self, task: &Self::Task);

    /// Abort a task. It completes with `NetworkError::Cancelled` unless it
    /// already finished.
    ///
    /// A task that was created but not yet resumed is completed right here,
    /// and a later [`resume`](Self::resume) of it does nothing.
    fn cancel(&self, task: &Self::Task);

    /// Process events until no resumed task is outstanding or [`stop`](Self::stop)
    /// is called.
    fn run_event_loop(&self);

    /// Cancel outstanding tasks and make [`run_event_loop`](Self::run_event_loop) return.
    fn stop(&self);
}
