//! Startup failures as the presentation layer shows them.

use serde::Serialize;
use shared::{
    domain::Phase,
    error::{FailureKind, PhaseFailure},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Spatial,
    RoomScan,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationError {
    category: ErrorCategory,
    phase: Option<Phase>,
    message: String,
}

impl PresentationError {
    pub fn from_failure(failure: &PhaseFailure) -> Self {
        let category = match failure.kind {
            FailureKind::Timeout => ErrorCategory::Timeout,
            FailureKind::Service => category_for_phase(failure.phase)
                .unwrap_or_else(|| category_for_message(&failure.message)),
        };
        Self {
            category,
            phase: Some(failure.phase),
            message: failure.message.clone(),
        }
    }

    /// Classifies a bare message, e.g. one read back from a snapshot after a reconnect.
    pub fn from_message(phase: Option<Phase>, message: impl Into<String>) -> Self {
        let message = message.into();
        let category = phase
            .and_then(category_for_phase)
            .filter(|_| !mentions_timeout(&message))
            .unwrap_or_else(|| category_for_message(&message));
        Self {
            category,
            phase,
            message,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headline(&self) -> &'static str {
        match self.category {
            ErrorCategory::Network => "Could not reach the session",
            ErrorCategory::Spatial => "Could not align to the shared space",
            ErrorCategory::RoomScan => "Room scan problem",
            ErrorCategory::Timeout => "This is taking too long",
            ErrorCategory::Unknown => "Startup failed",
        }
    }

    pub fn retry_hint(&self) -> &'static str {
        match self.category {
            ErrorCategory::Network => "Check that the host is still running and retry.",
            ErrorCategory::Spatial => "Move closer to the host and look around the room, then retry.",
            ErrorCategory::RoomScan => "Scan your room again, then retry.",
            ErrorCategory::Timeout => "Retry to run this step again.",
            ErrorCategory::Unknown => "Retry, or cancel and choose again.",
        }
    }
}

fn category_for_phase(phase: Phase) -> Option<ErrorCategory> {
    match phase {
        Phase::CreatingSession | Phase::JoiningSession => Some(ErrorCategory::Network),
        Phase::WaitingForColocation | Phase::WaitingForAnchor | Phase::LocalizingAnchor => {
            Some(ErrorCategory::Spatial)
        }
        Phase::CheckingRoomScan | Phase::PromptingRoomScan => Some(ErrorCategory::RoomScan),
        _ => None,
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timed out") || lower.contains("timeout")
}

fn category_for_message(message: &str) -> ErrorCategory {
    let lower = message.to_ascii_lowercase();
    if mentions_timeout(&lower) {
        ErrorCategory::Timeout
    } else if lower.contains("session")
        || lower.contains("transport")
        || lower.contains("network")
        || lower.contains("connection")
        || lower.contains("unavailable")
    {
        ErrorCategory::Network
    } else if lower.contains("anchor")
        || lower.contains("colocation")
        || lower.contains("align")
        || lower.contains("origin")
    {
        ErrorCategory::Spatial
    } else if lower.contains("scan") || lower.contains("room") {
        ErrorCategory::RoomScan
    } else {
        ErrorCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_win_over_phase() {
        let failure = PhaseFailure::new(
            Phase::WaitingForAnchor,
            FailureKind::Timeout,
            "Anchor discovery timed out after 60s",
        );
        let error = PresentationError::from_failure(&failure);
        assert_eq!(error.category(), ErrorCategory::Timeout);
        assert_eq!(error.phase(), Some(Phase::WaitingForAnchor));
    }

    #[test]
    fn service_failures_follow_phase() {
        let join = PhaseFailure::new(
            Phase::JoiningSession,
            FailureKind::Service,
            "Failed to join session Game_AB12: session Game_AB12 was not found",
        );
        assert_eq!(
            PresentationError::from_failure(&join).category(),
            ErrorCategory::Network
        );

        let scan = PhaseFailure::new(
            Phase::PromptingRoomScan,
            FailureKind::Service,
            "Room scan failed: cancelled by user",
        );
        assert_eq!(
            PresentationError::from_failure(&scan).category(),
            ErrorCategory::RoomScan
        );
    }

    #[test]
    fn bare_messages_are_classified_by_keywords() {
        assert_eq!(
            PresentationError::from_message(None, "Anchor alignment failed: not visible")
                .category(),
            ErrorCategory::Spatial
        );
        assert_eq!(
            PresentationError::from_message(Some(Phase::JoiningSession), "Join timed out after 30s")
                .category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            PresentationError::from_message(None, "something odd").category(),
            ErrorCategory::Unknown
        );
    }
}
