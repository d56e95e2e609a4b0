use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication failed")]
    Auth,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid filter value: {0}")]
    InvalidFilterValue(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Only connectivity failures are worth retrying; everything else fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::StorageUnavailable(_))
    }

    fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Auth
                | ServiceError::InvalidIdentifier(_)
                | ServiceError::InvalidFilterValue(_)
        )
    }
}

/// Server messages that mean the session or the server went away, or the
/// operator stepped in. Matched lowercase.
const TRANSIENT_MESSAGES: &[&str] = &[
    "terminating connection",
    "administrator command",
    "canceling statement",
    "statement timeout",
    "too many connections",
    "too many clients",
    "remaining connection slots",
    "deadlock detected",
    "could not serialize",
    "server closed the connection",
    "connection reset",
    "the database system is",
];

/// Data exceptions a caller value can still trigger after validation,
/// e.g. a timestamp outside the server's range.
const INPUT_MESSAGES: &[&str] = &["invalid input syntax", "out of range"];

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match err {
            DieselError::DatabaseError(
                DatabaseErrorKind::ClosedConnection
                | DatabaseErrorKind::UnableToSendCommand
                | DatabaseErrorKind::SerializationFailure,
                info,
            ) => ServiceError::StorageUnavailable(info.message().to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::Unknown, info) => {
                classify_unknown(info.message())
            }
            DieselError::DatabaseError(kind, info) => ServiceError::Internal(anyhow::anyhow!(
                "unexpected storage error ({kind:?}): {}",
                info.message()
            )),
            DieselError::BrokenTransactionManager => {
                ServiceError::StorageUnavailable("broken transaction manager".into())
            }
            other => ServiceError::Internal(other.into()),
        }
    }
}

fn classify_unknown(message: &str) -> ServiceError {
    let lowered = message.to_lowercase();
    if TRANSIENT_MESSAGES.iter().any(|marker| lowered.contains(marker)) {
        ServiceError::StorageUnavailable(message.to_string())
    } else if INPUT_MESSAGES.iter().any(|marker| lowered.contains(marker)) {
        ServiceError::InvalidFilterValue(format!("rejected by storage: {message}"))
    } else {
        ServiceError::Internal(anyhow::anyhow!("storage error: {message}"))
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::InvalidFilterValue(format!(
            "malformed request body: {}",
            rejection.body_text()
        ))
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::InvalidFilterValue(format!(
            "malformed query string: {}",
            rejection.body_text()
        ))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidIdentifier(_) | ServiceError::InvalidFilterValue(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::MalformedGeometry(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if !self.is_caller_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
