use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::quotation::QuotationStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quotation transition from {from} to {to}")]
    InvalidQuotationTransition { from: QuotationStatus, to: QuotationStatus },
    #[error("invalid value for `{field}`: {message}")]
    Validation { field: String, message: String },
    #[error("unknown status `{0}`")]
    UnknownStatus(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("authentication required: {0}")]
    Unauthorized(String),
    #[error("permission denied: {0}")]
    Forbidden(String),
    #[error("conflict: {message}")]
    Conflict { message: String, retryable: bool },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, errors: BTreeMap<String, String>, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, retryable: bool, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Authentication credentials were not provided or are invalid.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::Conflict { .. } => "The request conflicts with the current state of the resource.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Message safe to echo back to the client. Server-side failures never expose
    /// their underlying cause.
    pub fn detail(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } | Self::Internal { .. } => {
                self.user_message().to_owned()
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

const UNASSIGNED: &str = "unassigned";

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation { field, message }) => {
                let mut errors = BTreeMap::new();
                errors.insert(field, message);
                Self::BadRequest {
                    message: "validation failed".to_owned(),
                    errors,
                    correlation_id,
                }
            }
            ApplicationError::Domain(domain) => {
                Self::BadRequest { message: domain.to_string(), errors: BTreeMap::new(), correlation_id }
            }
            ApplicationError::BadRequest(message) => {
                Self::BadRequest { message, errors: BTreeMap::new(), correlation_id }
            }
            ApplicationError::NotFound { entity, id } => Self::NotFound {
                message: format!("{entity} `{id}` was not found"),
                correlation_id,
            },
            ApplicationError::Unauthorized(message) => Self::Unauthorized { message, correlation_id },
            ApplicationError::Forbidden(message) => Self::Forbidden { message, correlation_id },
            ApplicationError::Conflict { message, retryable } => {
                Self::Conflict { message, retryable, correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
