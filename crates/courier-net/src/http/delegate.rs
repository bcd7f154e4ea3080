//! Callback contract between a session and the code observing its tasks.
//!
//! A [`Session`](super::Session) reports everything that happens to a task
//! through a [`TransferDelegate`]. Hooks are invoked on threads owned by the
//! session, never on the thread that created the task, so implementations must
//! synchronize any state they touch and must not block for long.

use bytes::Bytes;

use crate::error::NetworkError;

/// Response line and framing information for one response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// URL that produced this response.
    pub url: String,
    /// Content length if the server announced one.
    pub content_length: Option<u64>,
}

/// A redirect the session is about to follow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectInfo {
    /// Status code of the redirect response (3xx).
    pub status: u16,
    /// URL that answered with the redirect.
    pub from: String,
    /// Resolved target of the `Location` header.
    pub to: String,
}

/// What the session should do after delivering response headers or data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResponseDisposition {
    /// Keep receiving the body.
    #[default]
    Allow,
    /// Abort the task; it completes with [`NetworkError::Cancelled`].
    Cancel,
}

/// What the session should do with a redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RedirectDisposition {
    /// Reissue the request against the redirect target.
    #[default]
    Follow,
    /// Do not follow; the redirect response is delivered as the final response.
    Refuse,
    /// Abort the task; it completes with [`NetworkError::Cancelled`].
    Cancel,
}

/// Receiver of asynchronous task events.
///
/// Per task, a session delivers zero or more `will_redirect` calls and
/// `did_receive_response` calls, each response followed by its
/// `did_receive_data` chunks, and finally exactly one `did_complete`.
pub trait TransferDelegate<T>: Send + Sync {
    /// Response headers are available.
    fn did_receive_response(&self, task: &T, response: &ResponseHead) -> ResponseDisposition;

    /// The server redirected the request.
    fn will_redirect(&self, task: &T, redirect: &RedirectInfo) -> RedirectDisposition;

    /// A chunk of the response body arrived.
    fn did_receive_data(&self, _task: &T, _chunk: &Bytes) -> ResponseDisposition {
        ResponseDisposition::Allow
    }

    /// The task finished, with the transport error if it failed.
    fn did_complete(&self, task: &T, error: Option<NetworkError>);
}
