//! A session backed by reqwest.
//!
//! Tasks execute on a tokio runtime owned by the session, so delegate hooks
//! fire on the runtime's worker threads. Redirects are followed by the session
//! itself rather than by reqwest, which lets the delegate see and veto every
//! hop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use courier_core::logging::targets;
use futures_util::StreamExt;
use parking_lot::{Condvar, Mutex};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use url::Url;

use super::delegate::{
    RedirectDisposition, RedirectInfo, ResponseDisposition, ResponseHead, TransferDelegate,
};
use super::session::Session;
use super::task::{TaskHandle, TaskId};
use crate::error::{NetworkError, Result};

/// Configuration for a [`ReqwestSession`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Maximum number of redirects to follow per task.
    pub max_redirects: usize,
    /// Default user agent.
    pub user_agent: Option<String>,
    /// Number of runtime worker threads delivering events.
    pub worker_threads: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            max_redirects: 10,
            user_agent: Some(format!("Courier/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            worker_threads: 2,
        }
    }
}

/// Builder for creating a [`ReqwestSession`] with custom configuration.
#[derive(Debug, Default)]
pub struct ReqwestSessionBuilder {
    config: SessionConfig,
}

impl ReqwestSessionBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set the number of runtime worker threads.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads.max(1);
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<ReqwestSession> {
        let mut builder = reqwest::Client::builder().redirect(Policy::none());

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name("courier-session")
            .enable_all()
            .build()?;

        Ok(ReqwestSession {
            client,
            runtime: Some(runtime),
            config: self.config,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::default()),
                idle: Condvar::new(),
            }),
        })
    }
}

/// Handle to a task created by a [`ReqwestSession`].
#[derive(Clone, Debug)]
pub struct ReqwestTask {
    id: TaskId,
    url: Url,
}

impl TaskHandle for ReqwestTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn url(&self) -> &str {
        self.url.as_str()
    }
}

type Delegate = Arc<dyn TransferDelegate<ReqwestTask>>;

#[derive(Default)]
struct SessionState {
    created: HashMap<TaskId, Delegate>,
    /// Resumed tasks, with the sender that aborts them until it is used.
    in_flight: HashMap<TaskId, Option<oneshot::Sender<()>>>,
    stopped: bool,
}

struct SessionShared {
    state: Mutex<SessionState>,
    idle: Condvar,
}

impl SessionShared {
    fn finish(&self, id: TaskId) {
        let mut state = self.state.lock();
        state.in_flight.remove(&id);
        self.idle.notify_all();
    }
}

/// A [`Session`] that performs real HTTP GET requests.
///
/// The client never follows redirects on its own; each one is offered to the
/// delegate and counted against [`SessionConfig::max_redirects`].
pub struct ReqwestSession {
    client: reqwest::Client,
    runtime: Option<Runtime>,
    config: SessionConfig,
    shared: Arc<SessionShared>,
}

impl ReqwestSession {
    /// Create a session with default configuration.
    pub fn new() -> Result<Self> {
        ReqwestSessionBuilder::new().build()
    }

    /// Create a builder for configuring a new session.
    pub fn builder() -> ReqwestSessionBuilder {
        ReqwestSessionBuilder::new()
    }

    /// Get the session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of resumed tasks that have not completed.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }
}

/// Execute one task, offering each redirect and response to the delegate.
async fn execute(
    client: &reqwest::Client,
    task: &ReqwestTask,
    delegate: &dyn TransferDelegate<ReqwestTask>,
    max_redirects: usize,
) -> Result<()> {
    let mut url = task.url.clone();
    let mut redirects = 0;

    loop {
        tracing::debug!(target: targets::SESSION, task = %task.id, %url, "sending request");
        let response = client.get(url.clone()).send().await?;
        let status = response.status();

        if status.is_redirection()
            && let Some(location) = response.headers().get(LOCATION)
        {
            let target = url.join(location.to_str()?)?;
            if redirects >= max_redirects {
                return Err(NetworkError::TooManyRedirects);
            }
            let redirect = RedirectInfo {
                status: status.as_u16(),
                from: url.to_string(),
                to: target.to_string(),
            };
            match delegate.will_redirect(task, &redirect) {
                RedirectDisposition::Follow => {
                    redirects += 1;
                    url = target;
                    continue;
                }
                RedirectDisposition::Refuse => {}
                RedirectDisposition::Cancel => return Err(NetworkError::Cancelled),
            }
        }

        let head = ResponseHead {
            status: status.as_u16(),
            url: url.to_string(),
            content_length: response.content_length(),
        };
        if delegate.did_receive_response(task, &head) == ResponseDisposition::Cancel {
            return Err(NetworkError::Cancelled);
        }

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            if delegate.did_receive_data(task, &chunk?) == ResponseDisposition::Cancel {
                return Err(NetworkError::Cancelled);
            }
        }
        return Ok(());
    }
}

impl Session for ReqwestSession {
    type Task = ReqwestTask;

    fn create_task(&self, url: &str, delegate: Delegate) -> Result<ReqwestTask> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NetworkError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let task = ReqwestTask {
            id: TaskId::next(),
            url,
        };
        self.shared.state.lock().created.insert(task.id, delegate);

        tracing::debug!(target: targets::SESSION, task = %task.id, url = %task.url, "task created");
        Ok(task)
    }

    fn resume(&self, task: &ReqwestTask) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let delegate = {
            let mut state = self.shared.state.lock();
            let Some(delegate) = state.created.remove(&task.id) else {
                tracing::debug!(
                    target: targets::SESSION,
                    task = %task.id,
                    "resume of unknown or cancelled task"
                );
                return;
            };
            if state.stopped {
                drop(state);
                delegate.did_complete(task, Some(NetworkError::Cancelled));
                return;
            }
            state.in_flight.insert(task.id, Some(cancel_tx));
            delegate
        };

        let client = self.client.clone();
        let shared = self.shared.clone();
        let task = task.clone();
        let max_redirects = self.config.max_redirects;

        runtime.spawn(async move {
            let result = tokio::select! {
                result = execute(&client, &task, delegate.as_ref(), max_redirects) => result,
                Ok(()) = cancel_rx => Err(NetworkError::Cancelled),
            };
            if let Err(err) = &result {
                tracing::debug!(target: targets::SESSION, task = %task.id, %err, "task failed");
            }
            delegate.did_complete(&task, result.err());
            shared.finish(task.id);
        });
    }

    fn cancel(&self, task: &ReqwestTask) {
        let mut state = self.shared.state.lock();
        if let Some(delegate) = state.created.remove(&task.id) {
            drop(state);
            // Never resumed, so no runtime task will complete it
            delegate.did_complete(task, Some(NetworkError::Cancelled));
            return;
        }
        if let Some(tx) = state.in_flight.get_mut(&task.id).and_then(Option::take) {
            let _ = tx.send(());
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
        for tx in state.in_flight.values_mut().filter_map(Option::take) {
            let _ = tx.send(());
        }
        self.shared.idle.notify_all();
    }
}

impl Drop for ReqwestSession {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for ReqwestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestSession")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
