//! A session that replays scripted events.
//!
//! [`ScriptedSession`] stands in for a real network: each URL is mapped to a
//! list of [`ScriptedEvent`]s, and resumed tasks have their events delivered
//! in order from a dedicated delivery thread, honoring whatever dispositions
//! the delegate returns. It is deterministic, needs no sockets, and exercises
//! the same cross-thread paths a real session does.
//!
//! # Example
//!
//! ```
//! use courier_net::http::{ScriptedEvent, ScriptedSession, TaskState, TransferManager};
//!
//! let session = ScriptedSession::new().with_script(
//!     "https://example.com/a",
//!     [
//!         ScriptedEvent::redirect("https://example.com/b"),
//!         ScriptedEvent::response(200),
//!         ScriptedEvent::success(),
//!     ],
//! );
//!
//! let manager = TransferManager::new(session);
//! manager.start_transfer("https://example.com/a")?;
//! manager.run()?;
//! manager.join();
//!
//! let snapshot = manager.snapshot();
//! assert_eq!(snapshot.state, TaskState::Completed);
//! assert_eq!(snapshot.redirects, 1);
//! assert_eq!(snapshot.status, Some(200));
//! # Ok::<(), courier_net::NetworkError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use courier_core::CancellationToken;
use courier_core::logging::targets;
use courier_core::worker::{LoopThread, LoopThreadConfig};
use crossbeam_channel::{Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use super::delegate::{
    RedirectDisposition, RedirectInfo, ResponseDisposition, ResponseHead, TransferDelegate,
};
use super::session::Session;
use super::task::{TaskHandle, TaskId};
use crate::error::{NetworkError, Result};

/// One step of a scripted transfer.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptedEvent {
    /// The server redirects to `to`.
    Redirect {
        /// Redirect status code.
        status: u16,
        /// Absolute target URL.
        to: String,
    },
    /// Response headers arrive.
    Response {
        /// HTTP status code.
        status: u16,
        /// Announced content length.
        content_length: Option<u64>,
    },
    /// A body chunk arrives.
    Data(Bytes),
    /// The task ends, with a transport error if it failed.
    Complete(Option<NetworkError>),
}

impl ScriptedEvent {
    /// A `302 Found` redirect to `to`.
    pub fn redirect(to: impl Into<String>) -> Self {
        Self::Redirect {
            status: 302,
            to: to.into(),
        }
    }

    /// Response headers with `status` and no announced length.
    pub fn response(status: u16) -> Self {
        Self::Response {
            status,
            content_length: None,
        }
    }

    /// A body chunk.
    pub fn data(chunk: impl Into<Bytes>) -> Self {
        Self::Data(chunk.into())
    }

    /// Successful completion.
    pub fn success() -> Self {
        Self::Complete(None)
    }

    /// Completion with a transport error.
    pub fn failure(error: NetworkError) -> Self {
        Self::Complete(Some(error))
    }
}

/// Handle to a task created by a [`ScriptedSession`].
#[derive(Clone, Debug)]
pub struct ScriptedTask {
    id: TaskId,
    url: Arc<str>,
}

impl TaskHandle for ScriptedTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn url(&self) -> &str {
        &self.url
    }
}

type Delegate = Arc<dyn TransferDelegate<ScriptedTask>>;

/// A resumed task queued for the delivery thread.
struct Job {
    task: ScriptedTask,
    delegate: Delegate,
    events: Vec<ScriptedEvent>,
    cancel: CancellationToken,
    delay: Duration,
}

#[derive(Default)]
struct ScriptState {
    scripts: HashMap<String, Vec<ScriptedEvent>>,
    created: HashMap<TaskId, (Delegate, Vec<ScriptedEvent>)>,
    in_flight: HashMap<TaskId, CancellationToken>,
    tasks_created: usize,
    stopped: bool,
}

struct ScriptShared {
    state: Mutex<ScriptState>,
    idle: Condvar,
}

impl ScriptShared {
    fn finish(&self, id: TaskId) {
        let mut state = self.state.lock();
        state.in_flight.remove(&id);
        self.idle.notify_all();
    }
}

struct Delivery {
    jobs: Sender<Job>,
    thread: LoopThread,
}

/// A [`Session`] that delivers scripted events from its own thread.
///
/// URLs without a script fail with [`NetworkError::Connection`].
pub struct ScriptedSession {
    shared: Arc<ScriptShared>,
    delivery: Mutex<Option<Delivery>>,
    event_delay: Duration,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    /// Create a session with no scripts.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ScriptShared {
                state: Mutex::new(ScriptState::default()),
                idle: Condvar::new(),
            }),
            delivery: Mutex::new(None),
            event_delay: Duration::ZERO,
        }
    }

    /// Add a script for `url`, replacing any previous one.
    pub fn with_script(
        self,
        url: impl Into<String>,
        events: impl IntoIterator<Item = ScriptedEvent>,
    ) -> Self {
        self.script(url, events);
        self
    }

    /// Sleep for `delay` before delivering each event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Set the script for `url`. Applies to tasks created afterwards.
    pub fn script(&self, url: impl Into<String>, events: impl IntoIterator<Item = ScriptedEvent>) {
        self.shared
            .state
            .lock()
            .scripts
            .insert(url.into(), events.into_iter().collect());
    }

    /// Number of tasks created so far.
    pub fn tasks_created(&self) -> usize {
        self.shared.state.lock().tasks_created
    }

    /// Number of resumed tasks whose completion has not been delivered.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Queue a job, starting the delivery thread on first use.
    fn dispatch(&self, job: Job) -> std::result::Result<(), Job> {
        let mut delivery = self.delivery.lock();
        if delivery.is_none() {
            let (jobs, receiver) = unbounded::<Job>();
            let shared = self.shared.clone();
            let config = LoopThreadConfig::with_name("courier-delivery");
            let spawned = LoopThread::spawn(config, move || {
                for job in receiver.iter() {
                    let error = play(&job);
                    job.delegate.did_complete(&job.task, error);
                    shared.finish(job.task.id);
                }
            });
            match spawned {
                Ok(thread) => *delivery = Some(Delivery { jobs, thread }),
                Err(err) => {
                    tracing::error!(
                        target: targets::SESSION,
                        %err,
                        "failed to start delivery thread"
                    );
                    return Err(job);
                }
            }
        }

        match delivery.as_ref() {
            Some(delivery) => delivery.jobs.send(job).map_err(|err| err.into_inner()),
            None => Err(job),
        }
    }
}

/// Deliver a job's events. Returns the error to complete the task with.
fn play(job: &Job) -> Option<NetworkError> {
    let mut url = job.task.url().to_string();
    let mut events = job.events.iter();

    while let Some(event) = events.next() {
        if !job.delay.is_zero() {
            thread::sleep(job.delay);
        }
        if job.cancel.is_cancelled() {
            return Some(NetworkError::Cancelled);
        }

        match event {
            ScriptedEvent::Redirect { status, to } => {
                let redirect = RedirectInfo {
                    status: *status,
                    from: url.clone(),
                    to: to.clone(),
                };
                match job.delegate.will_redirect(&job.task, &redirect) {
                    RedirectDisposition::Follow => url = to.clone(),
                    RedirectDisposition::Refuse => {
                        let head = ResponseHead {
                            status: *status,
                            url,
                            content_length: Some(0),
                        };
                        if job.delegate.did_receive_response(&job.task, &head)
                            == ResponseDisposition::Cancel
                        {
                            return Some(NetworkError::Cancelled);
                        }
                        // The rest of the chain never happens
                        return events
                            .find_map(|event| match event {
                                ScriptedEvent::Complete(error) => Some(error.clone()),
                                _ => None,
                            })
                            .flatten();
                    }
                    RedirectDisposition::Cancel => return Some(NetworkError::Cancelled),
                }
            }
            ScriptedEvent::Response {
                status,
                content_length,
            } => {
                let head = ResponseHead {
                    status: *status,
                    url: url.clone(),
                    content_length: *content_length,
                };
                let disposition = job.delegate.did_receive_response(&job.task, &head);
                if disposition == ResponseDisposition::Cancel {
                    return Some(NetworkError::Cancelled);
                }
            }
            ScriptedEvent::Data(chunk) => {
                if job.delegate.did_receive_data(&job.task, chunk) == ResponseDisposition::Cancel {
                    return Some(NetworkError::Cancelled);
                }
            }
            ScriptedEvent::Complete(error) => return error.clone(),
        }
    }
    None
}

impl Session for ScriptedSession {
    type Task = ScriptedTask;

    fn create_task(&self, url: &str, delegate: Delegate) -> Result<ScriptedTask> {
        let task = ScriptedTask {
            id: TaskId::next(),
            url: Arc::from(url),
        };

        let mut state = self.shared.state.lock();
        let events = state.scripts.get(url).cloned().unwrap_or_else(|| {
            vec![ScriptedEvent::failure(NetworkError::Connection(format!(
                "no script for {url}"
            )))]
        });
        state.created.insert(task.id, (delegate, events));
        state.tasks_created += 1;

        tracing::debug!(target: targets::SESSION, task = %task.id, url, "task created");
        Ok(task)
    }

    fn resume(&self, task: &ScriptedTask) {
        let cancel = CancellationToken::new();
        let (delegate, events) = {
            let mut state = self.shared.state.lock();
            let Some(entry) = state.created.remove(&task.id) else {
                tracing::debug!(
                    target: targets::SESSION,
                    task = %task.id,
                    "resume of unknown or cancelled task"
                );
                return;
            };
            if state.stopped {
                cancel.cancel();
            }
            state.in_flight.insert(task.id, cancel.clone());
            entry
        };

        let job = Job {
            task: task.clone(),
            delegate,
            events,
            cancel,
            delay: self.event_delay,
        };
        if let Err(job) = self.dispatch(job) {
            job.delegate.did_complete(
                &job.task,
                Some(NetworkError::Worker("delivery thread unavailable".to_string())),
            );
            self.shared.finish(job.task.id);
        }
    }

    fn cancel(&self, task: &ScriptedTask) {
        let mut state = self.shared.state.lock();
        if let Some((delegate, _)) = state.created.remove(&task.id) {
            drop(state);
            // Never resumed, so no delivery thread will complete it
            delegate.did_complete(task, Some(NetworkError::Cancelled));
            return;
        }
        if let Some(token) = state.in_flight.get(&task.id) {
            token.cancel();
        }
    }

    fn run_event_loop(&self) {
        let mut state = self.shared.state.lock();
        self.shared
            .idle
            .wait_while(&mut state, |state| !state.in_flight.is_empty() && !state.stopped);
    }

    fn stop(&self) {
        let mut state = self.shared.state.lock();
        state.stopped = true;
        for token in state.in_flight.values() {
            token.cancel();
        }
        self.shared.idle.notify_all();
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.stop();
        if let Some(Delivery { jobs, thread }) = self.delivery.get_mut().take() {
            drop(jobs);
            thread.join();
        }
    }
}

impl std::fmt::Debug for ScriptedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ScriptedSession")
            .field("scripts", &state.scripts.len())
            .field("in_flight", &state.in_flight.len())
            .field("event_delay", &self.event_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every hook invocation as a line of text.
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        redirect_answer: Mutex<RedirectDisposition>,
    }

    impl TransferDelegate<ScriptedTask> for Recorder {
        fn did_receive_response(
            &self,
            _task: &ScriptedTask,
            response: &ResponseHead,
        ) -> ResponseDisposition {
            self.log
                .lock()
                .push(format!("response {} {}", response.status, response.url));
            ResponseDisposition::Allow
        }

        fn will_redirect(
            &self,
            _task: &ScriptedTask,
            redirect: &RedirectInfo,
        ) -> RedirectDisposition {
            self.log.lock().push(format!("redirect {}", redirect.to));
            *self.redirect_answer.lock()
        }

        fn did_receive_data(&self, _task: &ScriptedTask, chunk: &Bytes) -> ResponseDisposition {
            self.log.lock().push(format!("data {}", chunk.len()));
            ResponseDisposition::Allow
        }

        fn did_complete(&self, _task: &ScriptedTask, error: Option<NetworkError>) {
            self.log.lock().push(format!("complete {error:?}"));
        }
    }

    fn run_script(session: &ScriptedSession, url: &str, recorder: &Arc<Recorder>) -> Vec<String> {
        let task = session.create_task(url, recorder.clone()).unwrap();
        session.resume(&task);
        session.run_event_loop();
        recorder.log.lock().clone()
    }

    #[test]
    fn test_events_delivered_in_order() {
        let session = ScriptedSession::new().with_script(
            "https://example.com/a",
            [
                ScriptedEvent::redirect("https://example.com/b"),
                ScriptedEvent::response(200),
                ScriptedEvent::data(&b"hello"[..]),
                ScriptedEvent::success(),
            ],
        );
        let recorder = Arc::new(Recorder::default());

        let log = run_script(&session, "https://example.com/a", &recorder);
        assert_eq!(
            log,
            vec![
                "redirect https://example.com/b",
                "response 200 https://example.com/b",
                "data 5",
                "complete None",
            ]
        );
        assert_eq!(session.in_flight(), 0);
    }

    #[test]
    fn test_refused_redirect_becomes_final_response() {
        let session = ScriptedSession::new().with_script(
            "https://example.com/a",
            [
                ScriptedEvent::redirect("https://example.com/b"),
                ScriptedEvent::response(200),
                ScriptedEvent::success(),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        *recorder.redirect_answer.lock() = RedirectDisposition::Refuse;

        let log = run_script(&session, "https://example.com/a", &recorder);
        assert_eq!(
            log,
            vec![
                "redirect https://example.com/b",
                "response 302 https://example.com/a",
                "complete None",
            ]
        );
    }

    #[test]
    fn test_cancelled_redirect_completes_with_error() {
        let session = ScriptedSession::new().with_script(
            "https://example.com/a",
            [
                ScriptedEvent::redirect("https://example.com/b"),
                ScriptedEvent::response(200),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        *recorder.redirect_answer.lock() = RedirectDisposition::Cancel;

        let log = run_script(&session, "https://example.com/a", &recorder);
        assert_eq!(log.last().map(String::as_str), Some("complete Some(Cancelled)"));
    }

    #[test]
    fn test_unscripted_url_fails() {
        let session = ScriptedSession::new();
        let recorder = Arc::new(Recorder::default());

        let log = run_script(&session, "https://example.com/missing", &recorder);
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("complete Some(Connection("));
        assert_eq!(session.tasks_created(), 1);
    }

    #[test]
    fn test_cancel_before_resume_completes_task() {
        let session = ScriptedSession::new();
        let recorder = Arc::new(Recorder::default());
        let task = session.create_task("https://example.com/a", recorder.clone()).unwrap();

        session.cancel(&task);
        session.resume(&task);
        session.run_event_loop();

        assert_eq!(*recorder.log.lock(), vec!["complete Some(Cancelled)"]);
        assert_eq!(session.in_flight(), 0);
    }

    #[test]
    fn test_stop_releases_event_loop() {
        let session = Arc::new(
            ScriptedSession::new()
                .with_event_delay(Duration::from_millis(100))
                .with_script(
                    "https://example.com/slow",
                    [
                        ScriptedEvent::response(200),
                        ScriptedEvent::data(vec![0u8; 8]),
                        ScriptedEvent::success(),
                    ],
                ),
        );
        let recorder = Arc::new(Recorder::default());
        let task = session
            .create_task("https://example.com/slow", recorder.clone())
            .unwrap();
        session.resume(&task);

        let looper = {
            let session = session.clone();
            thread::spawn(move || session.run_event_loop())
        };
        session.stop();
        looper.join().unwrap();
    }
}
