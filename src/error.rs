//! Error types for the render bridge

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering through the external adapter
#[derive(Error, Debug)]
pub enum Error {
    /// The template context could not be encoded as JSON
    #[error("Failed to serialize template context: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The adapter executable could not be started
    #[error("Failed to launch adapter {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The adapter exited unsuccessfully or produced no output
    #[error("Render failed (exit status: {}): {}", format_status(*status), format_stderr(stderr))]
    RenderFailure {
        /// Exit code of the adapter, `None` when terminated by a signal
        status: Option<i32>,
        /// Captured standard error of the adapter (possibly truncated)
        stderr: String,
    },

    /// The adapter did not finish before the configured deadline
    #[error("Render timed out after {0}ms")]
    Timeout(u64),

    /// The supplied context is not a JSON object
    #[error("Invalid template context: {0}")]
    InvalidContext(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// No renderer registered under the requested name
    #[error("No renderer registered under '{0}'")]
    RendererNotFound(String),

    /// Filesystem or process I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn format_status(status: Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

fn format_stderr(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "no output was produced"
    } else {
        trimmed
    }
}
