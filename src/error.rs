//! Error types for `cereggii-rs`.
//!
//! Mirrors the unified, documented-variant `Error` enum style used
//! throughout this crate's lineage: one `thiserror` enum, one `Result<T>`
//! alias, variants that map 1:1 onto the taxonomy in the specification's
//! error-handling design (precondition, lookup miss, expectation failure,
//! concurrent-use detection, allocation failure, migration failure).

use thiserror::Error;

/// Result type alias for `cereggii-rs` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `cereggii-rs` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested key is not present in the map (a structured absence,
    /// not a fault).
    #[error("key not found")]
    NotFound,

    /// A `compare_and_set` (or the unified insert/update primitive) was
    /// called with an `expected` value that did not match the key's current
    /// value.
    #[error("expectation failed: current value did not match `expected`")]
    ExpectationFailed,

    /// `fast_iter` observed an entry whose reference count reached zero
    /// while it was being read (concurrent delete mid-iteration). The
    /// iterator aborts; the map itself is unaffected.
    #[error("concurrent usage detected: entry was freed during iteration")]
    ConcurrentUsageDetected,

    /// A constructor argument violated a precondition (unsupported
    /// `buffer_size`, `initial_size` out of range, etc). Surfaced before any
    /// map state is touched.
    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Human-readable explanation.
        message: String,
    },

    /// The migration leader failed mid-migration (index/page allocation
    /// failure, or a size bound was exceeded). All three migration events
    /// were signalled to release waiters before this was returned; callers
    /// should retry their top-level operation.
    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Convenience constructor for [`Error::InvalidParameter`].
    #[must_use]
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}
