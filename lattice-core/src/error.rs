//! Error types for Lattice
//!
//! Covers schema resolution, loader construction, and storage read errors.

use thiserror::Error;

/// Primary error type for all Lattice operations
#[derive(Debug, Error)]
pub enum LatticeError {
    // ========== Resolution Errors ==========

    /// A requested field is neither an attribute nor a dimension
    #[error("Unknown attribute or dimension '{field}'")]
    InvalidField { field: String },

    /// A requested feature is not available for this array/kind combination
    #[error("Not supported: {reason}")]
    NotSupported { reason: String },

    // ========== Construction Errors ==========

    /// X and Y arrays disagree on the key-dimension extent
    #[error("X and Y arrays must have the same number of rows: X has {x_rows}, Y has {y_rows}")]
    RowCountMismatch { x_rows: u64, y_rows: u64 },

    /// Loader configuration is invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ========== Read Errors ==========

    /// Storage collaborator failed a read
    #[error("Storage read failed: {message}")]
    Storage { message: String },

    /// Requested key range falls outside the non-empty domain
    #[error("Key range [{start}, {end}] outside the non-empty domain")]
    OutOfDomain { start: i64, end: i64 },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LatticeError {
    /// Returns true if this error is raised before any iteration starts
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            LatticeError::InvalidField { .. }
                | LatticeError::NotSupported { .. }
                | LatticeError::RowCountMismatch { .. }
                | LatticeError::InvalidConfig { .. }
        )
    }

    pub(crate) fn not_supported(reason: impl Into<String>) -> Self {
        LatticeError::NotSupported {
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        LatticeError::Internal {
            message: message.into(),
        }
    }
}

/// Result type alias for Lattice operations
pub type Result<T> = std::result::Result<T, LatticeError>;
