//! Error types for Courier core primitives.

use thiserror::Error;

/// Errors raised by the core threading primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The operating system refused to spawn the thread.
    #[error("Failed to spawn thread '{name}': {message}")]
    ThreadSpawn {
        /// Name the thread would have carried.
        name: String,
        /// Underlying OS error message.
        message: String,
    },
    /// The thread body panicked before returning.
    #[error("Thread '{0}' panicked")]
    ThreadPanicked(String),
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
