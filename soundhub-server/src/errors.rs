use axum::{
    extract::multipart::MultipartError,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use log::error;
use soundhub_catalog::{AuthError, CatalogError, DatabaseError, IdentityError};
use soundhub_core::{StorageError, ValidationError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("A superuser already exists")]
    SuperuserExists,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("Range is not satisfiable")]
    RangeNotSatisfiable { length: u64 },
    #[error("Identity provider is unavailable")]
    BadGateway,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } | Self::SuperuserExists => StatusCode::CONFLICT,
            Self::BadRequest(_) | Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        match self {
            Self::Unknown(ref message) => error!("Request failed: {}", message),
            Self::RangeNotSatisfiable { length } => {
                let content_range = format!("bytes */{}", length);
                return (
                    status,
                    [(header::CONTENT_RANGE, content_range)],
                    self.to_string(),
                )
                    .into_response();
            }
            _ => {}
        }

        (status, self.to_string()).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::SuperuserExists => Self::SuperuserExists,
            AuthError::InvalidSession => Self::Unauthorized("Invalid or expired session"),
            AuthError::InactiveUser => Self::Forbidden("This account is disabled".to_string()),
            AuthError::GoogleLoginDisabled => Self::NotFound {
                resource: "login",
                identifier: "google",
            },
            AuthError::Identity(IdentityError::InvalidToken) => {
                Self::Forbidden("Invalid Google token".to_string())
            }
            AuthError::Identity(IdentityError::Unavailable(message)) => {
                error!("Could not verify a Google token: {}", message);
                Self::BadGateway
            }
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<CatalogError> for ServerError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::Upload(e @ ValidationError::PayloadTooLarge { .. }) => {
                Self::PayloadTooLarge(e.to_string())
            }
            CatalogError::Upload(e @ ValidationError::UnsupportedMediaType { .. }) => {
                Self::UnsupportedMediaType(e.to_string())
            }
            CatalogError::Invalid(message) => Self::BadRequest(message),
            CatalogError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            CatalogError::Forbidden(message) => Self::Forbidden(message.to_string()),
            CatalogError::Db(e) => e.into(),
            CatalogError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(_) | StorageError::InvalidPath(_) => Self::NotFound {
                resource: "file",
                identifier: "path",
            },
            StorageError::RangeNotSatisfiable { length } => Self::RangeNotSatisfiable { length },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<MultipartError> for ServerError {
    fn from(value: MultipartError) -> Self {
        match value.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge(value.body_text()),
            _ => Self::BadRequest(value.body_text()),
        }
    }
}

#[cfg(test)]
mod test {
    use soundhub_core::UploadKind;

    use super::*;

    #[test]
    fn upload_errors_keep_their_status() {
        let too_large: ServerError = CatalogError::Upload(ValidationError::PayloadTooLarge {
            limit_in_megabytes: 4,
        })
        .into();
        assert_eq!(too_large.as_status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_type: ServerError =
            CatalogError::Upload(ValidationError::UnsupportedMediaType {
                expected: UploadKind::Audio,
                filename: "notes.txt".to_string(),
            })
            .into();
        assert_eq!(
            wrong_type.as_status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn unsatisfiable_ranges_report_the_length() {
        let error: ServerError = StorageError::RangeNotSatisfiable { length: 42 }.into();
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */42"
        );
    }

    #[test]
    fn duplicates_are_conflicts() {
        let error: ServerError = CatalogError::Db(DatabaseError::Conflict {
            resource: "track like",
            field: "track:user",
            value: "1:2".to_string(),
        })
        .into();

        assert_eq!(error.as_status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn session_failures_keep_their_cause() {
        let expired: ServerError = AuthError::InvalidSession.into();
        assert_eq!(expired.as_status_code(), StatusCode::UNAUTHORIZED);

        let inactive: ServerError = AuthError::InactiveUser.into();
        assert_eq!(inactive.as_status_code(), StatusCode::FORBIDDEN);

        let outage: ServerError =
            AuthError::Db(DatabaseError::Internal("connection reset".into())).into();
        assert_eq!(outage.as_status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
