use thiserror::Error;

pub type RewardsResult<T> = Result<T, RewardsError>;

#[derive(Error, Debug)]
pub enum RewardsError {
    #[error("Program configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Datastore error: {0}")]
    DataStore(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("An engine run is already in progress")]
    EngineBusy,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
