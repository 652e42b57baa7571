use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to the host. Each one is also published on the event
/// bus as an `error` event before it is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("range error: {0}")]
    Range(String),
    #[error("state error: {0}")]
    State(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Range,
    State,
}

impl SchedulerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Range(_) => ErrorKind::Range,
            Self::State(_) => ErrorKind::State,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message) | Self::Range(message) | Self::State(message) => message,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
