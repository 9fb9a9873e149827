//! Error types for the `seeobj` runtime.
//!
//! Every fallible runtime operation returns [`Result`]. Allocation and
//! argument failures are reported by the operation that detects them, with
//! no partial side effects left behind.

use thiserror::Error;

/// Errors that can occur in the `seeobj` runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The allocator could not provide memory for an instance or class.
    #[error("Allocation of {size} bytes failed")]
    AllocationFailure {
        /// The requested allocation size.
        size: usize,
    },

    /// A caller-supplied argument was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The process-wide runtime has not been initialized, or was torn down.
    #[error("Runtime is not initialized")]
    NotInitialized,

    /// A construction step or class init callback reported failure.
    #[error("Construction of {class} failed: {reason}")]
    ConstructionFailure {
        /// Name of the class being constructed or derived.
        class: &'static str,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// The class does not implement an optional operation.
    #[error("{class} does not support {operation}")]
    Unsupported {
        /// The refused operation (`compare`, `copy`, ...).
        operation: &'static str,
        /// Name of the receiving object's class.
        class: &'static str,
    },
}

impl Error {
    /// Shorthand for [`Error::ConstructionFailure`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use seeobj::Error;
    ///
    /// let err = Error::construction("Circle", "negative radius");
    /// assert_eq!(err.to_string(), "Construction of Circle failed: negative radius");
    /// ```
    pub fn construction(class: &'static str, reason: impl Into<String>) -> Self {
        Error::ConstructionFailure {
            class,
            reason: reason.into(),
        }
    }
}

/// Result type for `seeobj` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
