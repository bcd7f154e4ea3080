//! The manager's callback sink.
//!
//! A [`TransferSink`] is handed to the session with each task it creates. It
//! turns delegate hooks into mutations of the manager's [`ActiveTask`] under
//! the manager's mutex and wakes every waiter after each mutation.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use courier_core::logging::targets;
use parking_lot::{Condvar, Mutex};

use super::delegate::{
    RedirectDisposition, RedirectInfo, ResponseDisposition, ResponseHead, TransferDelegate,
};
use super::task::{ActiveTask, TaskHandle, TaskId, TaskState, TransferProgress};
use crate::error::NetworkError;

/// State shared between a manager and the sinks of its tasks.
pub(crate) struct TransferShared<T> {
    pub(crate) record: Mutex<ActiveTask<T>>,
    pub(crate) changed: Condvar,
}

impl<T: TaskHandle> TransferShared<T> {
    pub(crate) fn new() -> Self {
        Self {
            record: Mutex::new(ActiveTask::default()),
            changed: Condvar::new(),
        }
    }

    /// Apply `update` if the record still tracks a live task `id`, then wake waiters.
    ///
    /// Returns `None` when the event is stale.
    fn update<R>(&self, id: TaskId, update: impl FnOnce(&mut ActiveTask<T>) -> R) -> Option<R> {
        let result = {
            let mut record = self.record.lock();
            if !record.tracks(id) || !record.state.is_live() {
                return None;
            }
            update(&mut record)
        };
        self.changed.notify_all();
        Some(result)
    }
}

/// Delegate that records task events into a transfer manager.
///
/// Holds only a weak reference to the manager's state: once the manager is
/// gone, responses and redirects are answered with `Cancel` and everything
/// else is dropped.
pub struct TransferSink<T> {
    shared: Weak<TransferShared<T>>,
    max_redirects: Option<u32>,
}

impl<T: TaskHandle> TransferSink<T> {
    pub(crate) fn new(shared: &Arc<TransferShared<T>>, max_redirects: Option<u32>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            max_redirects,
        }
    }

    fn record<R>(
        &self,
        task: &T,
        hook: &'static str,
        update: impl FnOnce(&mut ActiveTask<T>) -> R,
    ) -> Option<R> {
        let Some(shared) = self.shared.upgrade() else {
            tracing::debug!(
                target: targets::TRANSFER,
                task = %task.id(),
                hook,
                "manager dropped, ignoring event"
            );
            return None;
        };
        let result = shared.update(task.id(), update);
        if result.is_none() {
            tracing::warn!(
                target: targets::TRANSFER,
                task = %task.id(),
                hook,
                "ignoring event for inactive task"
            );
        }
        result
    }
}

impl<T: TaskHandle> TransferDelegate<T> for TransferSink<T> {
    fn did_receive_response(&self, task: &T, response: &ResponseHead) -> ResponseDisposition {
        let disposition = self
            .record(task, "response", |record| {
                record.status = Some(response.status);
                record.final_url = Some(response.url.clone());
                record.progress = TransferProgress {
                    bytes_transferred: 0,
                    total_bytes: response.content_length,
                };
                record.state = TaskState::Running;
                if record.cancel.is_cancelled() {
                    ResponseDisposition::Cancel
                } else {
                    ResponseDisposition::Allow
                }
            })
            .unwrap_or(ResponseDisposition::Cancel);

        tracing::debug!(
            target: targets::TRANSFER,
            task = %task.id(),
            status = response.status,
            ?disposition,
            "response headers received"
        );
        disposition
    }

    fn will_redirect(&self, task: &T, redirect: &RedirectInfo) -> RedirectDisposition {
        let max_redirects = self.max_redirects;
        let disposition = self
            .record(task, "redirect", |record| {
                record.redirects += 1;
                record.state = TaskState::Redirected;
                record.final_url = Some(redirect.to.clone());
                if record.cancel.is_cancelled() {
                    return RedirectDisposition::Cancel;
                }
                match max_redirects {
                    Some(max) if record.redirects > max => {
                        record.abort_reason = Some(NetworkError::TooManyRedirects);
                        RedirectDisposition::Cancel
                    }
                    _ => RedirectDisposition::Follow,
                }
            })
            .unwrap_or(RedirectDisposition::Cancel);

        tracing::debug!(
            target: targets::TRANSFER,
            task = %task.id(),
            from = %redirect.from,
            to = %redirect.to,
            ?disposition,
            "redirect"
        );
        disposition
    }

    fn did_receive_data(&self, task: &T, chunk: &Bytes) -> ResponseDisposition {
        let len = chunk.len() as u64;
        self.record(task, "data", |record| {
            record.progress.bytes_transferred += len;
            if record.cancel.is_cancelled() {
                ResponseDisposition::Cancel
            } else {
                ResponseDisposition::Allow
            }
        })
        .unwrap_or(ResponseDisposition::Cancel)
    }

    fn did_complete(&self, task: &T, error: Option<NetworkError>) {
        let outcome = self.record(task, "complete", |record| {
            let error = record.abort_reason.take().or(error);
            record.state = if error.is_some() {
                TaskState::Failed
            } else {
                TaskState::Completed
            };
            record.error = error.clone();
            (record.redirects, record.status, error)
        });

        if let Some((redirects, status, error)) = outcome {
            match error {
                None => tracing::info!(
                    target: targets::TRANSFER,
                    task = %task.id(),
                    redirects,
                    ?status,
                    "transfer completed"
                ),
                Some(error) => tracing::info!(
                    target: targets::TRANSFER,
                    task = %task.id(),
                    redirects,
                    ?status,
                    %error,
                    "transfer failed"
                ),
            }
        }
    }
}

impl<T> std::fmt::Debug for TransferSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSink")
            .field("attached", &(self.shared.strong_count() > 0))
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}
