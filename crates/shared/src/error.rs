use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

impl From<FeatureInputError> for ApiError {
    fn from(value: FeatureInputError) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureInputError {
    #[error("unknown feature '{name}'")]
    UnknownFeature { name: String },
    #[error("value '{value}' for {feature} is not a number")]
    InvalidNumber { feature: String, value: String },
    #[error("expected {expected} feature values, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}
