use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::ledger::{PackId, PackStatus};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} must be unique")]
    Conflict(&'static str),

    #[error("{0}")]
    Unauthorized(UnauthorizedType),

    #[error("You have no permission to access this resource")]
    Forbidden,

    #[error("{0} {1} not found")]
    NotFound(&'static str, i64),

    #[error("pack {pack_id} is {status}, cannot {action}")]
    InvalidState {
        pack_id: PackId,
        status: PackStatus,
        action: &'static str,
    },

    #[error("{0}")]
    PasswordHashError(#[from] password_hash::Error),

    #[error("{0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),

    #[error("{0}")]
    TaskError(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum UnauthorizedType {
    #[error("Wrong student id or password")]
    WrongStudentIdOrPassword,

    #[error("Missing access token")]
    MissingAccessToken,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Access token expired")]
    ExpiredAccessToken,

    #[error("Session is no longer valid")]
    RevokedSession,
}

impl Error {
    /// Machine-readable kind reported as `type` in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationError(..) | Self::InvalidInput(..) => "InvalidInput",
            Self::Conflict(..) => "Conflict",
            Self::Unauthorized(..) => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound(..) => "NotFound",
            Self::InvalidState { .. } => "InvalidState",
            Self::PasswordHashError(..) | Self::JWTError(..) | Self::TaskError(..) => "Internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(..) | Self::InvalidInput(..) => StatusCode::BAD_REQUEST,
            Self::Conflict(..) | Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(..) => StatusCode::NOT_FOUND,
            Self::PasswordHashError(..) | Self::JWTError(..) | Self::TaskError(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
    pub r#type: String,
    pub message: String,
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let r#type = err.kind().to_string();

        let errors = match err {
            Error::ValidationError(err) => serde_json::to_value(err).ok(),
            _ => None,
        };

        Self {
            errors,
            message,
            r#type,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("error: {:?}", self);
        } else {
            tracing::debug!(kind = self.kind(), "rejected: {}", self);
        }

        let error = ErrorJson::from(self);

        (status, Json(error)).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(value: JsonRejection) -> Self {
        Self::InvalidInput(value.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(value: PathRejection) -> Self {
        Self::InvalidInput(value.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(value: QueryRejection) -> Self {
        Self::InvalidInput(value.body_text())
    }
}
