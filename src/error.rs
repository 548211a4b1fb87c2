use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
