use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external service explicitly reported a failure.
    Service,
    /// No success or failure signal arrived before the phase deadline.
    Timeout,
}

/// The single current failure of a startup attempt. A newer failure replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub kind: FailureKind,
    pub message: String,
}

impl PhaseFailure {
    pub fn new(phase: Phase, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionNameError {
    #[error("session name must not be empty")]
    Empty,
    #[error("session name is {0} bytes long; at most 64 are allowed")]
    TooLong(usize),
}
