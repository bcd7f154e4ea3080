//! Networking for Courier.
//!
//! This crate manages a single asynchronous HTTP transfer:
//!
//! - **Transfer manager**: starts one task, hosts the session's event loop on
//!   a background thread and lets any thread block until it drains
//! - **Callback sink**: records redirects, the last status code and the final
//!   outcome as events arrive from session threads
//! - **Sessions**: a reqwest-backed session for real traffic and a scripted
//!   session for tests
//!
//! # Quick Start
//!
//! ```
//! use courier_net::http::{ScriptedEvent, ScriptedSession, TaskState, TransferManager};
//! use courier_net::NetworkError;
//!
//! let session = ScriptedSession::new().with_script(
//!     "https://example.com/broken",
//!     [
//!         ScriptedEvent::response(500),
//!         ScriptedEvent::failure(NetworkError::Connection("reset".into())),
//!     ],
//! );
//!
//! let manager = TransferManager::new(session);
//! manager.start_transfer("https://example.com/broken")?;
//! manager.run()?;
//! manager.join();
//!
//! let snapshot = manager.snapshot();
//! assert_eq!(snapshot.state, TaskState::Failed);
//! assert_eq!(snapshot.redirects, 0);
//! assert_eq!(snapshot.status, Some(500));
//! # Ok::<(), NetworkError>(())
//! ```
//!
//! # Logging
//!
//! All diagnostics go through `tracing` under the targets listed in
//! [`courier_core::logging::targets`]. Install any subscriber to see them.

mod error;
pub mod http;

pub use error::{NetworkError, Result};
