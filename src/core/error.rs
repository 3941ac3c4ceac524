use crate::core::RecordId;
use thiserror::Error;

/// A record persisted during a failed clone, reported so callers can clean up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub kind: String,
    pub id: RecordId,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record {id} of kind '{kind}' not found")]
    NotFound { kind: String, id: RecordId },

    #[error("Kind '{0}' is not enrolled")]
    NotEnrolled(String),

    #[error("Kind '{0}' is already enrolled")]
    AlreadyEnrolled(String),

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Partial clone left {} orphaned record(s): {source}", created.len())]
    PartialClone {
        created: Vec<CreatedRecord>,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Concurrent activation conflict: {0}")]
    ConcurrentActivation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
