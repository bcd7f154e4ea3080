//! Logging facilities for Courier.
//!
//! Courier uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. Applications opt in:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("courier_net::transfer=debug")
//!         .init();
//! }
//! ```

/// Span names used throughout Courier for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Background event loop span, entered on the manager's worker thread.
    pub const EVENT_LOOP: &str = "courier::event_loop";
    /// Creating and resuming a transfer's task.
    pub const TRANSFER: &str = "courier::transfer";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Loop thread lifecycle.
    pub const WORKER: &str = "courier_core::worker";
    /// Transfer manager and callback sink.
    pub const TRANSFER: &str = "courier_net::transfer";
    /// Networking session implementations.
    pub const SESSION: &str = "courier_net::session";
}
