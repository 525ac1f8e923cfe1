use soundhub_core::{StorageError, ValidationError};
use thiserror::Error;

use crate::DatabaseError;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// An uploaded file was rejected
    #[error(transparent)]
    Upload(#[from] ValidationError),
    /// The request makes no sense, like following yourself
    #[error("{0}")]
    Invalid(String),
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// The requester may see the resource but not change it
    #[error("{0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Db(DatabaseError),
    #[error(transparent)]
    Storage(StorageError),
}

impl CatalogError {
    pub fn not_found(resource: &'static str, identifier: &'static str) -> Self {
        Self::NotFound {
            resource,
            identifier,
        }
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            e => Self::Db(e),
        }
    }
}

impl From<StorageError> for CatalogError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(_) => Self::not_found("file", "path"),
            e => Self::Storage(e),
        }
    }
}
