use thiserror::Error;

use crate::services::storage::{BodyLimitExceeded, StorageError};

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => RelayError::NotFound(name),
            StorageError::Source(e) => {
                let over_limit = e
                    .get_ref()
                    .is_some_and(|inner| inner.is::<BodyLimitExceeded>());
                if over_limit {
                    RelayError::PayloadTooLarge(
                        "Request body exceeds the maximum allowed limit".to_string(),
                    )
                } else {
                    RelayError::InvalidRequest(format!("Upload stream interrupted: {}", e))
                }
            }
            StorageError::Io(e) => RelayError::StorageFailure(e.to_string()),
        }
    }
}
