//! Error types for the corpus store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Duplicate primary key.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Parent row referenced by a write does not exist.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Descendant rows survived a cascading delete.
    #[error("Cascade failure: {0}")]
    CascadeFailure(String),

    /// A sibling under the same parent already holds this `order_idx`.
    #[error("Duplicate order_idx {order_idx} under parent {parent}")]
    DuplicateOrder { parent: String, order_idx: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors caused by the data written rather than the environment.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::ConstraintViolation(_)
                | Error::ForeignKeyViolation(_)
                | Error::DuplicateOrder { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
