//! Error types for the copy engine.

use thiserror::Error;

/// Main error type for copy/move operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Invalid or contradictory flags, or a malformed task. Always terminal;
    /// never absorbed by continue-on-error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Naming conflict: self-overwrite, container/plain-item mismatch, or a
    /// destination that must name a container but does not.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A transfer failed for a specific item.
    #[error("Transfer failed for {item}: {message}")]
    Transfer { item: String, message: String },

    /// Source deletion failed after a successful copy during a move. Always
    /// fatal: silently ignoring it risks undetected duplication.
    #[error("Failed to remove {item} after successful copy: {message}")]
    PostCopyDeletion { item: String, message: String },

    /// One or more tasks failed permanently in continue-on-error mode.
    #[error("{count} file(s)/object(s) could not be transferred")]
    BatchFailure { count: u64 },

    /// Manifest ledger read or write error.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    /// Create a Transfer error.
    pub fn transfer(item: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Transfer {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) => 1,
            CopyError::Conflict(_) => 2,
            CopyError::BatchFailure { .. } => 3,
            CopyError::PostCopyDeletion { .. } => 4,
            CopyError::Transfer { .. } => 5,
            CopyError::Manifest(_) | CopyError::Json(_) => 6,
            CopyError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
