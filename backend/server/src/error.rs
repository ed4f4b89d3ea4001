use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use draw::DrawError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated. Please log in again.")]
    NotAuthenticated,

    #[error("Incorrect credential. Please try again.")]
    InvalidCredential { attempts: u32 },

    #[error(
        "Incorrect credential. Please try again or contact an administrator to retrieve your credential."
    )]
    CredentialLockout { attempts: u32 },

    #[error("No gift assignment found for {0}")]
    MissingAssignment(String),

    #[error(transparent)]
    Generation(#[from] DrawError),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated
            | AppError::InvalidCredential { .. }
            | AppError::CredentialLockout { .. } => StatusCode::UNAUTHORIZED,
            AppError::MissingAssignment(_) | AppError::Generation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            AppError::InvalidCredential { attempts } | AppError::CredentialLockout { attempts } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{self}");
        }

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            attempts: self.attempts(),
        };

        (status, Json(body)).into_response()
    }
}
