//! The transfer manager.
//!
//! [`TransferManager`] owns one [`Session`], a dedicated thread that hosts the
//! session's event loop, and the record of its single active transfer. The
//! session reports task events through a [`TransferSink`] on its own threads;
//! callers observe the outcome through [`snapshot`](TransferManager::snapshot)
//! and the blocking `wait_*`/`join` methods.

use std::sync::Arc;
use std::time::Duration;

use courier_core::logging::{span_names, targets};
use courier_core::worker::{LoopThread, LoopThreadConfig};
use parking_lot::Mutex;

use super::session::Session;
use super::sink::{TransferShared, TransferSink};
use super::task::{ActiveTask, TaskHandle, TaskState, TransferSnapshot};
use crate::error::{NetworkError, Result};

/// Configuration for a transfer manager.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// Redirects allowed before the transfer is aborted.
    ///
    /// `None` leaves redirect limits entirely to the session.
    pub max_redirects: Option<u32>,
    /// Settings for the thread hosting the session's event loop.
    pub thread: LoopThreadConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_redirects: None,
            thread: LoopThreadConfig::with_name("courier-transfer"),
        }
    }
}

/// Builder for creating a transfer manager with custom configuration.
#[derive(Debug, Default)]
pub struct TransferManagerBuilder {
    config: TransferConfig,
}

impl TransferManagerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort transfers after more than `max` redirects.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = Some(max);
        self
    }

    /// Leave redirect limits to the session.
    pub fn no_redirect_limit(mut self) -> Self {
        self.config.max_redirects = None;
        self
    }

    /// Set the event loop thread's name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread.name = name.into();
        self
    }

    /// Set the event loop thread's stack size.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.thread.stack_size = Some(size);
        self
    }

    /// Build a manager around `session`.
    pub fn build<S: Session>(self, session: S) -> TransferManager<S> {
        TransferManager::with_config(session, self.config)
    }
}

/// Runs one HTTP transfer at a time on a session and lets callers block on it.
///
/// # Contract
///
/// - [`start_transfer`](Self::start_transfer) creates and resumes a task. It is
///   rejected with [`NetworkError::TransferInProgress`] while another transfer
///   is live, leaving that transfer untouched.
/// - [`run`](Self::run) starts the event loop thread. Calling it again is a
///   no-op that logs a warning and returns `Ok(())`.
/// - [`join`](Self::join) blocks until the event loop thread exits. It may be
///   called from any thread, any number of times, and returns immediately if
///   `run` was never called.
///
/// The two misuse cases are treated differently on purpose. A repeated `run`
/// asks for a state that already holds, so there is nothing to report. A
/// rejected `start_transfer` means the caller's URL will not be fetched, so
/// it is an error the caller has to handle.
///
/// Transport failures never surface as errors from these methods; they are
/// recorded in the transfer state and visible through [`snapshot`](Self::snapshot).
///
/// Dropping the manager stops the session and joins the event loop thread.
pub struct TransferManager<S: Session> {
    session: Arc<S>,
    shared: Arc<TransferShared<S::Task>>,
    worker: Mutex<Option<Arc<LoopThread>>>,
    config: TransferConfig,
}

impl<S: Session> TransferManager<S> {
    /// Create a manager with default configuration.
    pub fn new(session: S) -> Self {
        Self::with_config(session, TransferConfig::default())
    }

    /// Create a manager with custom configuration.
    pub fn with_config(session: S, config: TransferConfig) -> Self {
        Self {
            session: Arc::new(session),
            shared: Arc::new(TransferShared::new()),
            worker: Mutex::new(None),
            config,
        }
    }

    /// Get the manager's configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Get a reference to the session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Start a transfer of `url`.
    ///
    /// The task starts executing before this returns, so hooks may already
    /// have fired by the time the caller regains control.
    pub fn start_transfer(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(NetworkError::InvalidArgument(
                "URL must not be empty".to_string(),
            ));
        }
        if self.shared.record.lock().state.is_live() {
            tracing::warn!(target: targets::TRANSFER, url, "transfer already in progress");
            return Err(NetworkError::TransferInProgress);
        }

        let span = tracing::debug_span!(target: targets::TRANSFER, span_names::TRANSFER, url);
        let _enter = span.enter();

        let sink = Arc::new(TransferSink::new(&self.shared, self.config.max_redirects));
        let task = self.session.create_task(url, sink)?;

        {
            let mut record = self.shared.record.lock();
            if record.state.is_live() {
                drop(record);
                // Lost a race with another start_transfer
                self.session.cancel(&task);
                return Err(NetworkError::TransferInProgress);
            }
            *record = ActiveTask::created(task.clone());
            record.state = TaskState::Running;
        }
        self.shared.changed.notify_all();

        tracing::debug!(target: targets::TRANSFER, task = %task.id(), url, "transfer started");
        self.session.resume(&task);
        Ok(())
    }

    /// Start the thread that drives the session's event loop.
    ///
    /// The thread exits once the session has no outstanding tasks.
    pub fn run(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!(target: targets::TRANSFER, "run() called more than once, ignoring");
            return Ok(());
        }

        let session = self.session.clone();
        let thread = LoopThread::spawn(self.config.thread.clone(), move || {
            let span = tracing::debug_span!(target: targets::TRANSFER, span_names::EVENT_LOOP);
            let _enter = span.enter();
            session.run_event_loop();
            tracing::debug!(target: targets::TRANSFER, "event loop drained");
        })?;

        *worker = Some(Arc::new(thread));
        Ok(())
    }

    /// Check whether the event loop thread is currently running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Block until the event loop thread has exited.
    pub fn join(&self) {
        let Some(thread) = self.worker.lock().clone() else {
            return;
        };
        if !thread.join() {
            tracing::error!(
                target: targets::TRANSFER,
                thread = thread.name(),
                "event loop thread panicked"
            );
        }
    }

    /// Wait for the event loop thread to exit, giving up after `timeout`.
    ///
    /// Returns `true` if the thread has exited or was never started.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let Some(thread) = self.worker.lock().clone() else {
            return true;
        };
        thread.wait_timeout(timeout)
    }

    /// A consistent copy of the transfer state.
    pub fn snapshot(&self) -> TransferSnapshot {
        self.shared.record.lock().snapshot()
    }

    /// Current lifecycle state of the transfer.
    pub fn state(&self) -> TaskState {
        self.shared.record.lock().state
    }

    /// Block until the transfer has a status code or has ended.
    ///
    /// Returns the most recent status code, or `None` if none arrived before
    /// the transfer ended, no transfer was started, or `timeout` elapsed.
    pub fn wait_for_status(&self, timeout: Option<Duration>) -> Option<u16> {
        self.wait_while(
            timeout,
            |record| record.status.is_none() && record.state.is_live(),
            |record| record.status,
        )
    }

    /// Block until the transfer reaches `Completed` or `Failed`.
    ///
    /// Returns `None` if no transfer was started or `timeout` elapsed.
    pub fn wait_for_completion(&self, timeout: Option<Duration>) -> Option<TransferSnapshot> {
        self.wait_while(
            timeout,
            |record| record.state.is_live(),
            |record| record.state.is_terminal().then(|| record.snapshot()),
        )
    }

    /// Cancel the live transfer.
    ///
    /// Every later hook answers `Cancel`, and the session is asked to abort the
    /// task. Returns `false` if no transfer is live.
    pub fn cancel(&self) -> bool {
        let task = {
            let record = self.shared.record.lock();
            if !record.state.is_live() {
                return false;
            }
            record.cancel.cancel();
            record.task.clone()
        };

        if let Some(task) = task {
            tracing::debug!(target: targets::TRANSFER, task = %task.id(), "cancelling transfer");
            self.session.cancel(&task);
        }
        true
    }

    fn wait_while<R>(
        &self,
        timeout: Option<Duration>,
        mut pending: impl FnMut(&ActiveTask<S::Task>) -> bool,
        read: impl FnOnce(&ActiveTask<S::Task>) -> R,
    ) -> R {
        let mut record = self.shared.record.lock();
        match timeout {
            Some(timeout) => {
                self.shared
                    .changed
                    .wait_while_for(&mut record, |record| pending(record), timeout);
            }
            None => self
                .shared
                .changed
                .wait_while(&mut record, |record| pending(record)),
        }
        read(&record)
    }
}

impl<S: Session> Drop for TransferManager<S> {
    fn drop(&mut self) {
        if let Some(thread) = self.worker.get_mut().take() {
            if !thread.is_finished() {
                self.session.stop();
            }
            thread.join();
        }
    }
}

impl<S: Session> std::fmt::Debug for TransferManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}
