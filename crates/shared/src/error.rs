use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Why a mobile action was not turned into work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown action type '{0}'")]
    UnknownType(String),
    #[error("malformed payload for '{kind}': {reason}")]
    MalformedPayload { kind: String, reason: String },
}

impl From<&ActionError> for ApiError {
    fn from(value: &ActionError) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}
