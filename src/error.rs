use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to HTTP clients as `{ "message": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or empty required input.
    #[error("{0}")]
    Validation(String),

    /// The email is already used by another user.
    #[error("{0}")]
    Conflict(String),

    #[error("Usuário não encontrado!")]
    NotFound,

    /// Unexpected storage (or hashing) failure, already rolled back.
    #[error("{0}")]
    Persistence(String),
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(MessageBody::new(self.to_string()))).into_response()
    }
}
