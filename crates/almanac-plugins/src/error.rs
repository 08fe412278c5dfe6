//! Error types for plugin repositories.

use thiserror::Error;

/// Errors that can occur while syncing or downloading plugins.
#[derive(Error, Debug)]
pub enum RepoError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A listing or index document could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A network request failed or returned a non-success status.
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Download requested for a plugin this repository does not list.
    #[error("Plugin {0} is not hosted on this repository")]
    NotHosted(String),

    /// A plugin index document is well-formed JSON but unusable.
    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),
}

impl RepoError {
    /// Whether this error came from I/O (filesystem or network), as opposed
    /// to bad input.
    pub fn is_io(&self) -> bool {
        matches!(self, RepoError::Io(_) | RepoError::Fetch { .. })
    }
}

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;
