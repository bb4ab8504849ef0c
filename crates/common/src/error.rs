use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure talking to the broker. Retryable.
    #[error("Broker transport error: {0}")]
    Transport(String),

    /// The broker rejected the access token. Triggers one re-auth + retry.
    #[error("Broker access token expired")]
    TokenExpired,

    /// Provider-reported API error (rejected order, invalid code). Not retried.
    #[error("Broker API error: {0}")]
    Api(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Notifier error: {0}")]
    Notify(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport errors are the only retryable kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
