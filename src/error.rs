//! Error taxonomy shared by the stores, the service layer and the HTTP handlers.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;
use validator::ValidationErrors;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: Uuid },

    #[error("slot is not enabled for registrations")]
    Disabled,

    #[error("slot has no capacity left")]
    CapacityExceeded,

    #[error("id number is already registered for this slot")]
    DuplicateRegistration,

    #[error("slot still owns registrations and can't be deleted")]
    HasRegistrations,

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl BookingError {
    pub fn slot_not_found(id: Uuid) -> Self {
        Self::NotFound { resource: "slot", id }
    }

    pub fn registration_not_found(id: Uuid) -> Self {
        Self::NotFound {
            resource: "registration",
            id,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(message: impl ToString) -> Self {
        Self::Store(message.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Disabled => "SLOT_DISABLED",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::DuplicateRegistration => "DUPLICATE_REGISTRATION",
            Self::HasRegistrations => "SLOT_HAS_REGISTRATIONS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Stream(_) => "STREAM_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Disabled
            | Self::CapacityExceeded
            | Self::DuplicateRegistration
            | Self::HasRegistrations
            | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationErrors> for BookingError {
    fn from(err: ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for BookingError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for BookingError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for BookingError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for BookingError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Store(format!("store task failed: {err}"))
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, code = self.code(), err = %self, "Request failed");
        }

        let body = ErrorResponse {
            code: self.code().into(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
