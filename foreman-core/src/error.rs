use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] foreman_config::ConfigError),

    #[error("Repo not found: {0}")]
    RepoNotFound(String),

    #[error("Work effort not found: {0}")]
    WorkEffortNotFound(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Counter error: {0}")]
    Counter(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
