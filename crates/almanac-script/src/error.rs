//! Error types for the scripting bridge.

use thiserror::Error;

/// Errors that can occur while binding or running scripts.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A capability set has no function group with this name.
    #[error("No function '{function}' in capability set '{set}'")]
    NoSuchFunction { set: String, function: String },

    /// No binding of the named function accepted the call arguments.
    #[error("No suitable function found for '{function}' with {arg_count} argument(s)")]
    NoSuitableFunction { function: String, arg_count: usize },

    /// A capability set declaration is malformed.
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// `start()` was called on a process that already left the created state.
    #[error("Script process '{0}' was already started")]
    AlreadyStarted(String),

    /// The embedded interpreter raised an error.
    #[error("Script error: {0}")]
    Script(String),

    /// A native capability function failed.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<mlua::Error> for RuntimeError {
    fn from(err: mlua::Error) -> Self {
        RuntimeError::Script(err.to_string())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
