//! Dedicated background thread with join semantics.
//!
//! A [`LoopThread`] runs one long-lived body, typically an event loop that
//! blocks until it has no more work, on its own named OS thread. Any number
//! of threads may wait for it to finish, either indefinitely with
//! [`LoopThread::join`] or with a deadline via [`LoopThread::wait_timeout`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use courier_core::worker::LoopThreadBuilder;
//!
//! let thread = LoopThreadBuilder::new()
//!     .name("event-loop")
//!     .spawn(|| std::thread::sleep(Duration::from_millis(10)))?;
//!
//! assert!(thread.wait_timeout(Duration::from_secs(5)));
//! assert!(thread.join());
//! # Ok::<(), courier_core::CoreError>(())
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{CoreError, Result};
use crate::logging::targets;

/// Configuration for spawning a [`LoopThread`].
#[derive(Debug, Clone)]
pub struct LoopThreadConfig {
    /// Name for the thread.
    pub name: String,
    /// Stack size for the thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for LoopThreadConfig {
    fn default() -> Self {
        Self {
            name: "courier-loop".to_string(),
            stack_size: None,
        }
    }
}

impl LoopThreadConfig {
    /// Create a new configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builder for spawning loop threads with custom configuration.
#[derive(Debug, Default)]
pub struct LoopThreadBuilder {
    config: LoopThreadConfig,
}

impl LoopThreadBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Spawn the thread running `body`.
    pub fn spawn<F>(self, body: F) -> Result<LoopThread>
    where
        F: FnOnce() + Send + 'static,
    {
        LoopThread::spawn(self.config, body)
    }
}

/// State shared between the handle and the running thread.
struct LoopState {
    /// Set once the body has returned or unwound.
    finished: Mutex<bool>,
    /// Notified when `finished` flips.
    finished_condvar: Condvar,
}

impl LoopState {
    fn mark_finished(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        self.finished_condvar.notify_all();
    }
}

/// Flags completion when the thread body exits, including by panic.
struct FinishGuard(Arc<LoopState>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

/// Outcome of reaping the OS thread.
enum Reaped {
    Pending(JoinHandle<()>),
    Clean,
    Panicked,
}

/// A dedicated background thread running a single body to completion.
///
/// `LoopThread` is `Send + Sync`; share it behind an `Arc` to join from
/// several threads at once. Every joiner returns once the body has exited.
pub struct LoopThread {
    name: String,
    reaped: Mutex<Reaped>,
    state: Arc<LoopState>,
}

impl LoopThread {
    /// Spawn a new thread running `body`.
    pub fn spawn<F>(config: LoopThreadConfig, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(LoopState {
            finished: Mutex::new(false),
            finished_condvar: Condvar::new(),
        });

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let guard = FinishGuard(state.clone());
        let handle = builder
            .spawn(move || {
                let _guard = guard;
                body();
            })
            .map_err(|err| CoreError::ThreadSpawn {
                name: config.name.clone(),
                message: err.to_string(),
            })?;

        tracing::debug!(target: targets::WORKER, name = %config.name, "loop thread started");

        Ok(Self {
            name: config.name,
            reaped: Mutex::new(Reaped::Pending(handle)),
            state,
        })
    }

    /// The thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the body has exited.
    pub fn is_finished(&self) -> bool {
        *self.state.finished.lock()
    }

    /// Block until the thread has exited.
    ///
    /// Returns `true` if the body returned normally, `false` if it panicked.
    pub fn join(&self) -> bool {
        {
            let mut finished = self.state.finished.lock();
            self.state
                .finished_condvar
                .wait_while(&mut finished, |finished| !*finished);
        }
        self.reap()
    }

    /// Like [`join`](Self::join) but reports a panic as an error.
    pub fn try_join(&self) -> Result<()> {
        if self.join() {
            Ok(())
        } else {
            Err(CoreError::ThreadPanicked(self.name.clone()))
        }
    }

    /// Wait for the thread to exit, giving up after `timeout`.
    ///
    /// Returns `true` if the thread exited within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut finished = self.state.finished.lock();
        let result = self
            .state
            .finished_condvar
            .wait_while_for(&mut finished, |finished| !*finished, timeout);
        !result.timed_out() || *finished
    }

    /// Join the OS thread once. Later callers read the recorded outcome.
    fn reap(&self) -> bool {
        let mut reaped = self.reaped.lock();
        *reaped = match std::mem::replace(&mut *reaped, Reaped::Clean) {
            Reaped::Pending(handle) => match handle.join() {
                Ok(()) => Reaped::Clean,
                Err(_) => {
                    tracing::error!(
                        target: targets::WORKER,
                        name = %self.name,
                        "loop thread panicked"
                    );
                    Reaped::Panicked
                }
            },
            done => done,
        };
        matches!(*reaped, Reaped::Clean)
    }
}

impl std::fmt::Debug for LoopThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopThread")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
