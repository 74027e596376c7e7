use fiscal_api::ApiError;
use nfe_core::ValidationError;
use serde::Serialize;
use store::StoreError;

use crate::identity::Unauthenticated;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{path}: {message}")]
    Validation { path: String, message: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("fiscal API returned {status}: {message}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "validation",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::Upstream { .. } => "upstream",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unauthenticated(_) => "unauthenticated",
            ServiceError::Internal(_) => "internal",
        }
    }

    pub fn report(&self) -> ErrorReport {
        let (path, status, code) = match self {
            ServiceError::Validation { path, .. } => (Some(path.clone()), None, None),
            ServiceError::Upstream { status, code, .. } => (None, Some(*status), code.clone()),
            _ => (None, None, None),
        };
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            path,
            status,
            code,
        }
    }
}

/// Serializable form printed by the CLI.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Validation {
            path: e.path,
            message: e.message,
        }
    }
}

impl From<ApiError> for ServiceError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Upstream {
                status,
                code,
                message,
            } => ServiceError::Upstream {
                status,
                code,
                message,
            },
            ApiError::NotFound(id) => ServiceError::NotFound(format!("fiscal document {id}")),
            ApiError::Transport(err) => ServiceError::Internal(format!("{err:#}")),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::NotFound(format!("invoice {id}")),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<Unauthenticated> for ServiceError {
    fn from(e: Unauthenticated) -> Self {
        ServiceError::Unauthenticated(e.0)
    }
}
