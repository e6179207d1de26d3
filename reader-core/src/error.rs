use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache entry `{key}` is corrupted and has no usable fallback")]
    Corrupted { key: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A feed item could not issue its refresh at all.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("refresh for `{item}` is unavailable: {reason}")]
    Unavailable { item: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("fan-out stopped at item {index}: {source}")]
    Trigger {
        index: usize,
        #[source]
        source: TriggerError,
    },
    #[error("command body panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
