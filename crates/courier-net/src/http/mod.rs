//! Single-transfer HTTP management.
//!
//! A [`TransferManager`] drives one task at a time through a [`Session`]. The
//! session's event loop runs on a dedicated thread started by
//! [`TransferManager::run`], while callbacks land in a [`TransferSink`] that
//! records redirects, status and completion under the manager's lock.
//!
//! Two sessions are provided:
//!
//! - [`ReqwestSession`] performs real requests on its own tokio runtime
//! - [`ScriptedSession`] replays canned events for deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use courier_net::http::{ReqwestSession, TransferManagerBuilder};
//!
//! let manager = TransferManagerBuilder::new()
//!     .max_redirects(5)
//!     .build(ReqwestSession::new()?);
//!
//! manager.start_transfer("https://example.com/")?;
//! manager.run()?;
//! manager.join();
//!
//! let snapshot = manager.snapshot();
//! println!(
//!     "{:?} after {} redirects, status {:?}",
//!     snapshot.state, snapshot.redirects, snapshot.status
//! );
//! # Ok::<(), courier_net::NetworkError>(())
//! ```

mod delegate;
mod manager;
mod reqwest_session;
pub mod scripted;
mod session;
mod sink;
mod task;

pub use delegate::{
    RedirectDisposition, RedirectInfo, ResponseDisposition, ResponseHead, TransferDelegate,
};
pub use manager::{TransferConfig, TransferManager, TransferManagerBuilder};
pub use reqwest_session::{ReqwestSession, ReqwestSessionBuilder, ReqwestTask, SessionConfig};
pub use scripted::{ScriptedEvent, ScriptedSession, ScriptedTask};
pub use session::Session;
pub use sink::TransferSink;
pub use task::{TaskHandle, TaskId, TaskState, TransferProgress, TransferSnapshot};
