//! Error types for the queue simulator
//!
//! This module defines the error types used throughout the crate.
//! All errors implement the `std::error::Error` trait via `thiserror::Error`.
//!
//! # Error Handling
//!
//! The [`SimError`] enum covers all possible error conditions:
//! - Configuration errors (capacity or worker counts out of range)
//! - Queue end-of-life (`Shutdown` is a signal to workers, not a failure)
//! - Internal primitive faults (never silently corrupt queue invariants)
//! - File I/O errors from the CSV export
//!
//! # Example
//!
//! ```rust,ignore
//! use prioq::{MessageQueue, SimError};
//!
//! match queue.enqueue(msg).await {
//!     Ok(receipt) => { /* handle success */ },
//!     Err(SimError::Shutdown) => {
//!         // normal end of life: exit the worker loop cleanly
//!     },
//!     Err(e) => {
//!         eprintln!("Unexpected error: {}", e);
//!     }
//! }
//! ```

use thiserror::Error;

/// Simulator error type
///
/// Represents all possible errors that can occur in the queue simulator.
///
/// # Variants
///
/// * `InvalidCapacity` - Queue capacity outside the supported range
/// * `InvalidInput` - CLI or configuration argument out of range
/// * `Shutdown` - Queue is shutting down; workers exit their loop cleanly
/// * `Internal` - Synchronization primitive fault with context
/// * `Io` - File I/O failure (CSV export)
#[derive(Error, Debug)]
pub enum SimError {
    /// Queue capacity out of range
    #[error("Invalid capacity: {0} (expected 1 to 20)")]
    InvalidCapacity(usize),

    /// Configuration argument out of range
    #[error("Invalid argument: {0}")]
    InvalidInput(String),

    /// Queue end-of-life signal
    #[error("Queue is shutting down")]
    Shutdown,

    /// Internal primitive fault
    #[error("Internal fault: {0}")]
    Internal(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// True for the normal end-of-life signal, which workers treat as a
    /// clean exit rather than a failure.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, SimError::Shutdown)
    }
}

/// Result type alias using SimError
///
/// Convenience type alias for `std::result::Result<T, SimError>`.
/// Used throughout the crate for consistent error handling.
pub type Result<T> = std::result::Result<T, SimError>;
