use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by the list/task API, on both sides of the wire.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("todo list {0} not found")]
    ListNotFound(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ListNotFound,
    TaskNotFound,
    Validation,
    StoreUnavailable,
}

/// JSON body carried by every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ListNotFound(_) => ErrorKind::ListNotFound,
            ApiError::TaskNotFound(_) => ErrorKind::TaskNotFound,
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::ListNotFound(_) | ApiError::TaskNotFound(_) => 404,
            ApiError::Validation(_) => 422,
            ApiError::StoreUnavailable(_) => 503,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::ListNotFound(_) | ApiError::TaskNotFound(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            ApiError::ListNotFound(m)
            | ApiError::TaskNotFound(m)
            | ApiError::Validation(m)
            | ApiError::StoreUnavailable(m) => m.clone(),
        };
        ErrorBody {
            error: self.kind(),
            message,
        }
    }

    /// Rebuilds the error a server reported, falling back to the status
    /// code when the body could not be decoded.
    pub fn from_response(status: u16, body: Option<ErrorBody>) -> ApiError {
        match body {
            Some(ErrorBody { error, message }) => match error {
                ErrorKind::ListNotFound => ApiError::ListNotFound(message),
                ErrorKind::TaskNotFound => ApiError::TaskNotFound(message),
                ErrorKind::Validation => ApiError::Validation(message),
                ErrorKind::StoreUnavailable => ApiError::StoreUnavailable(message),
            },
            None => match status {
                400 | 422 => ApiError::Validation(format!("server rejected request ({})", status)),
                _ => ApiError::StoreUnavailable(format!("unexpected status {}", status)),
            },
        }
    }
}
