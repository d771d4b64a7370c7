use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use workshop_core::errors::{ApplicationError, InterfaceError};
use workshop_db::RepositoryError;

/// Error returned by every handler. Carries the client-facing mapping and a
/// fresh correlation id that is also written to the log.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    pub correlation_id: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from(ApplicationError::BadRequest(message.into()))
    }

    pub fn interface(&self) -> &InterfaceError {
        &self.0
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        match &value {
            ApplicationError::Persistence(cause) | ApplicationError::Configuration(cause) => {
                error!(
                    event_name = "api.request.failed",
                    correlation_id = %correlation_id,
                    error = %cause,
                    "request failed on the server side"
                );
            }
            other => {
                debug!(
                    event_name = "api.request.rejected",
                    correlation_id = %correlation_id,
                    reason = %other,
                    "request rejected"
                );
            }
        }
        Self(value.into_interface(correlation_id))
    }
}

impl From<RepositoryError> for ApiError {
    fn from(value: RepositoryError) -> Self {
        Self::from(ApplicationError::from(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = match &self.0 {
            InterfaceError::Conflict { retryable, .. } => Some(*retryable),
            _ => None,
        };
        let errors = match &self.0 {
            InterfaceError::BadRequest { errors, .. } => errors.clone(),
            _ => BTreeMap::new(),
        };
        let body = ErrorBody {
            detail: self.0.detail(),
            errors,
            retryable,
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}
