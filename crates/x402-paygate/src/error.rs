use thiserror::Error;

/// Failures of the gate/session backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("gate not found: {0}")]
    GateNotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors returned by [`crate::Resolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The gate id does not exist.
    #[error("gate not found: {0}")]
    NotFound(String),

    /// The store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The paid-for upstream could not be fetched.
    #[error("failed to fetch API URL: {0}")]
    Upstream(String),
}

/// Rejected gate registration input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid validity window: {0}")]
    InvalidValidity(String),

    #[error("invalid fee: {0}")]
    InvalidFee(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}
