//! Store error type.
//!
//! Every store operation returns `Result<T, StoreError>`. Nothing is retried
//! or logged-and-dropped inside the store; the caller decides.

use nerfline_types::{DomainError, Entity, StageStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A create operation named an owner, upstream record, or catalog entry
    /// that does not exist.
    #[error("referenced {entity} {id} does not exist")]
    Referential { entity: Entity, id: String },

    /// The record an operation targets does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    /// A required field is missing or malformed, or a uniqueness rule failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain rule with no record context, e.g. an out-of-range rating.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A domain rule broken by an operation on a specific record.
    #[error("{entity} {id}: {source}")]
    Rule {
        entity: Entity,
        id: String,
        source: DomainError,
    },

    /// The upstream record belongs to another user.
    #[error("{entity} {id} is owned by {actual}, not {expected}")]
    OwnerMismatch {
        entity: Entity,
        id: String,
        expected: String,
        actual: String,
    },

    /// `UpstreamPolicy::RequireComplete` refused an unfinished upstream.
    #[error("{entity} {id} is {status}; a complete upstream is required")]
    UpstreamNotComplete {
        entity: Entity,
        id: String,
        status: StageStatus,
    },

    /// A cascading delete could not finish; nothing was removed.
    #[error("cascading delete of {entity} {id} failed: {source}")]
    CascadeDelete {
        entity: Entity,
        id: String,
        source: sqlx::Error,
    },

    /// A persisted value could not be decoded.
    #[error("corrupt stored value: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("blob storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error categories callers usually branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Referential,
    Validation,
    CascadeDelete,
    Storage,
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Referential { .. } | StoreError::NotFound { .. } => ErrorClass::Referential,
            StoreError::Validation(_)
            | StoreError::Domain(_)
            | StoreError::Rule { .. }
            | StoreError::OwnerMismatch { .. }
            | StoreError::UpstreamNotComplete { .. } => ErrorClass::Validation,
            StoreError::CascadeDelete { .. } => ErrorClass::CascadeDelete,
            StoreError::Decode(_) | StoreError::Database(_) | StoreError::Io(_) => ErrorClass::Storage,
        }
    }

    pub(crate) fn referential(entity: Entity, id: impl Into<String>) -> Self {
        StoreError::Referential { entity, id: id.into() }
    }

    pub(crate) fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        StoreError::NotFound { entity, id: id.into() }
    }

    pub(crate) fn rule(entity: Entity, id: impl Into<String>, source: DomainError) -> Self {
        StoreError::Rule { entity, id: id.into(), source }
    }

    /// Map a unique-constraint violation on `field` to a validation error,
    /// passing every other database error through.
    pub(crate) fn from_unique(err: sqlx::Error, entity: Entity, field: &str, value: &str) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Validation(format!(
                    "{entity} with {field} '{value}' already exists"
                ));
            }
        }
        StoreError::Database(err)
    }
}
