use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("A user id is required to scope insight caching")]
    UserIdRequired,

    #[error("Invalid user id '{0}': ':' is reserved as the cache key separator")]
    InvalidUserId(String),

    #[error("Invalid cadence configuration: {0}")]
    InvalidCadence(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Insight store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BudgetError>;
