use std::time::Duration;

use shared::domain::Phase;

use crate::config::StartupFlowConfig;

/// Maps a phase to how long it may wait on its collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    step: Duration,
    anchor_wait: Duration,
    room_load: Duration,
    network: Duration,
}

impl TimeoutPolicy {
    pub fn from_config(config: &StartupFlowConfig) -> Self {
        Self {
            step: config.step_timeout(),
            anchor_wait: config.anchor_wait_timeout(),
            room_load: config.room_load_timeout(),
            network: config.network_timeout(),
        }
    }

    /// `None` means no deadline applies: a human decision, a terminal state, or `Initializing`,
    /// which always ends after the configured platform delay.
    pub fn deadline_for(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Initializing | Phase::RoleSelection | Phase::Ready | Phase::Error => None,
            Phase::CheckingRoomScan | Phase::PromptingRoomScan => Some(self.step),
            Phase::CreatingSession | Phase::WaitingForColocation | Phase::JoiningSession => {
                Some(self.network)
            }
            Phase::WaitingForAnchor | Phase::LocalizingAnchor => Some(self.anchor_wait),
            Phase::SharingRoomMesh | Phase::LoadingRoomMesh => Some(self.room_load),
        }
    }

    pub fn timeout_message(&self, phase: Phase) -> String {
        let what = match phase {
            Phase::CheckingRoomScan => "Room scan check",
            Phase::PromptingRoomScan => "Room scan",
            Phase::CreatingSession => "Session creation",
            Phase::WaitingForColocation => "Colocation setup",
            Phase::SharingRoomMesh => "Room mesh sharing",
            Phase::JoiningSession => "Joining the session",
            Phase::WaitingForAnchor => "Anchor discovery",
            Phase::LocalizingAnchor => "Anchor localization",
            Phase::LoadingRoomMesh => "Room mesh loading",
            Phase::Initializing | Phase::RoleSelection | Phase::Ready | Phase::Error => {
                return format!("{phase} has no deadline");
            }
        };
        match self.deadline_for(phase) {
            Some(deadline) => format!("{what} timed out after {}s", deadline.as_secs()),
            None => format!("{what} timed out"),
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&StartupFlowConfig::default())
    }
}
