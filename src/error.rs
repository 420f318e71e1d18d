use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidLifecycleTransition { from: String, to: String },

    #[error("Lifecycle transition from {from} to {to} rejected: {reason}")]
    TransitionRejected {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Scheduled group not found: {0}")]
    GroupNotFound(usize),

    #[error("Group {id} is {actual}, expected {expected}")]
    InvalidGroupState {
        id: usize,
        expected: String,
        actual: String,
    },

    #[error("No executor registered for {0}")]
    ExecutorNotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
