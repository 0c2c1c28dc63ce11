use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("model call failed: {0}")]
    ModelCall(String),

    #[error("No code changes found to review")]
    NoChangesFound,

    #[error("review already in progress")]
    ReviewInProgress,

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("state error: {0}")]
    State(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
