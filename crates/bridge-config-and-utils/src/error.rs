use thiserror::Error;

/// Failures while loading configuration or preparing the runtime directory.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    /// No usable home directory.
    #[error("cannot resolve path: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
