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

    #[error("Worker binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Agent `{agent}` failed: {message}")]
    AgentFailed { agent: String, message: String },

    #[error("Memory store error: {0}")]
    Memory(String),
}

pub type Result<T> = std::result::Result<T, Error>;
