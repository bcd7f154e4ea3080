//! Core primitives for Courier.
//!
//! This crate provides the building blocks the transfer manager is assembled from:
//!
//! - **Loop threads**: a dedicated, named background thread with blocking and
//!   timed join semantics that are safe to use from any number of threads
//! - **Cancellation**: a clonable token for cooperative cancellation
//! - **Logging**: `tracing` target and span names used across the workspace
//!
//! # Loop Thread Example
//!
//! ```
//! use courier_core::worker::{LoopThread, LoopThreadConfig};
//!
//! let thread = LoopThread::spawn(LoopThreadConfig::with_name("example-loop"), || {
//!     // Drive an event loop until it drains.
//! })?;
//!
//! thread.join();
//! assert!(thread.is_finished());
//! # Ok::<(), courier_core::CoreError>(())
//! ```

pub mod cancellation;
mod error;
pub mod logging;
pub mod worker;

pub use cancellation::CancellationToken;
pub use error::{CoreError, Result};
pub use worker::{LoopThread, LoopThreadBuilder, LoopThreadConfig};
