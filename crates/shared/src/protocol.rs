use serde::{Deserialize, Serialize};

use crate::{
    domain::{Phase, Role, SessionName},
    error::PhaseFailure,
};

/// Intents flowing from the presentation layer into the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StartupIntent {
    ChooseHost,
    ChooseJoin {
        session_name: SessionName,
    },
    Retry,
    /// Host-only, honoured while prompting for a room scan.
    RequestManualScan,
    /// Abandon the current attempt and return to role selection.
    Cancel,
    /// The transport started a session on its own (auto-matchmaking).
    TransportSessionStarted {
        session_name: SessionName,
        is_master: bool,
    },
}

impl StartupIntent {
    pub fn name(&self) -> &'static str {
        match self {
            StartupIntent::ChooseHost => "choose_host",
            StartupIntent::ChooseJoin { .. } => "choose_join",
            StartupIntent::Retry => "retry",
            StartupIntent::RequestManualScan => "request_manual_scan",
            StartupIntent::Cancel => "cancel",
            StartupIntent::TransportSessionStarted { .. } => "transport_session_started",
        }
    }
}

/// Events pushed from the orchestrator to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StartupEvent {
    StateChanged {
        phase: Phase,
        status_message: String,
        progress: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        /// The host is prompted to start a room scan and `RequestManualScan` will be honoured.
        #[serde(default)]
        awaiting_manual_scan: bool,
    },
    Error(PhaseFailure),
    /// A mesh step gave up and startup continued on local fallback geometry.
    Degraded {
        phase: Phase,
        message: String,
    },
    Ready,
}

/// Read-only copy of the orchestrator's process state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupSnapshot {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub is_role_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_session_name: Option<SessionName>,
    pub progress: f32,
    pub status_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,
    #[serde(default)]
    pub awaiting_manual_scan: bool,
    pub is_startup_complete: bool,
    pub attempt: u32,
}

impl StartupSnapshot {
    pub fn is_host(&self) -> bool {
        self.role == Some(Role::Host)
    }

    pub fn can_retry(&self) -> bool {
        self.phase == Phase::Error
    }

    /// The text a presentation layer should show right now.
    pub fn display_message(&self) -> &str {
        match (&self.phase, &self.error_message) {
            (Phase::Error, Some(message)) => message.as_str(),
            _ => self.status_message.as_str(),
        }
    }
}

impl Default for StartupSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Initializing,
            role: None,
            is_role_resolved: false,
            selected_session_name: None,
            progress: 0.0,
            status_message: "Initializing...".to_string(),
            error_message: None,
            failed_phase: None,
            awaiting_manual_scan: false,
            is_startup_complete: false,
            attempt: 0,
        }
    }
}
