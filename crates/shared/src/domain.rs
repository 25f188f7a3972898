use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionNameError;

/// Shared spatial alignment group advertised by the colocation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique key of a network session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    pub fn new(raw: impl Into<String>) -> Result<Self, SessionNameError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SessionNameError::Empty);
        }
        if trimmed.len() > 64 {
            return Err(SessionNameError::TooLong(trimmed.len()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionName {
    type Error = SessionNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionName> for String {
    fn from(value: SessionName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Joiner,
}

impl Role {
    /// Ordered phases this role walks through after role selection.
    pub fn sequence(self) -> &'static [Phase] {
        match self {
            Role::Host => HOST_SEQUENCE,
            Role::Joiner => JOINER_SEQUENCE,
        }
    }

    pub fn next_phase(self, phase: Phase) -> Option<Phase> {
        let sequence = self.sequence();
        let index = sequence.iter().position(|candidate| *candidate == phase)?;
        sequence.get(index + 1).copied()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Joiner => f.write_str("joiner"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    RoleSelection,
    CheckingRoomScan,
    PromptingRoomScan,
    CreatingSession,
    WaitingForColocation,
    SharingRoomMesh,
    JoiningSession,
    WaitingForAnchor,
    LocalizingAnchor,
    LoadingRoomMesh,
    Ready,
    Error,
}

pub const HOST_SEQUENCE: &[Phase] = &[
    Phase::Initializing,
    Phase::RoleSelection,
    Phase::CheckingRoomScan,
    Phase::PromptingRoomScan,
    Phase::CreatingSession,
    Phase::WaitingForColocation,
    Phase::SharingRoomMesh,
    Phase::Ready,
];

pub const JOINER_SEQUENCE: &[Phase] = &[
    Phase::Initializing,
    Phase::RoleSelection,
    Phase::JoiningSession,
    Phase::WaitingForAnchor,
    Phase::LocalizingAnchor,
    Phase::LoadingRoomMesh,
    Phase::Ready,
];

impl Phase {
    /// Mesh phases degrade to a local fallback instead of failing the attempt.
    pub fn degrades_on_failure(self) -> bool {
        matches!(self, Phase::SharingRoomMesh | Phase::LoadingRoomMesh)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::RoleSelection => "role_selection",
            Phase::CheckingRoomScan => "checking_room_scan",
            Phase::PromptingRoomScan => "prompting_room_scan",
            Phase::CreatingSession => "creating_session",
            Phase::WaitingForColocation => "waiting_for_colocation",
            Phase::SharingRoomMesh => "sharing_room_mesh",
            Phase::JoiningSession => "joining_session",
            Phase::WaitingForAnchor => "waiting_for_anchor",
            Phase::LocalizingAnchor => "localizing_anchor",
            Phase::LoadingRoomMesh => "loading_room_mesh",
            Phase::Ready => "ready",
            Phase::Error => "error",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        ALL_PHASES
            .iter()
            .copied()
            .find(|phase| phase.label() == label)
    }
}

const ALL_PHASES: &[Phase] = &[
    Phase::Initializing,
    Phase::RoleSelection,
    Phase::CheckingRoomScan,
    Phase::PromptingRoomScan,
    Phase::CreatingSession,
    Phase::WaitingForColocation,
    Phase::SharingRoomMesh,
    Phase::JoiningSession,
    Phase::WaitingForAnchor,
    Phase::LocalizingAnchor,
    Phase::LoadingRoomMesh,
    Phase::Ready,
    Phase::Error,
];

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position and orientation in the device's tracking space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Pose {
    /// The host defines the shared frame's origin at its own position.
    pub const fn origin() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::origin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSession {
    pub name: SessionName,
    pub host_label: String,
    pub current_player_count: u32,
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colocation_group_id: Option<GroupId>,
    pub last_seen_at: DateTime<Utc>,
}

impl DiscoveredSession {
    pub fn is_full(&self) -> bool {
        self.current_player_count >= self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_rejects_blank_input() {
        assert!(matches!(SessionName::new("   "), Err(SessionNameError::Empty)));
        assert_eq!(
            SessionName::new("  Game_AB12 ").expect("name").as_str(),
            "Game_AB12"
        );
    }

    #[test]
    fn sequences_advance_in_declared_order() {
        assert_eq!(
            Role::Host.next_phase(Phase::CreatingSession),
            Some(Phase::WaitingForColocation)
        );
        assert_eq!(
            Role::Joiner.next_phase(Phase::LocalizingAnchor),
            Some(Phase::LoadingRoomMesh)
        );
        assert_eq!(Role::Joiner.next_phase(Phase::Ready), None);
        assert_eq!(Role::Host.next_phase(Phase::JoiningSession), None);
    }

    #[test]
    fn phase_labels_round_trip() {
        for phase in ALL_PHASES {
            assert_eq!(Phase::from_label(phase.label()), Some(*phase));
        }
        assert_eq!(Phase::from_label("bogus"), None);
    }

    #[test]
    fn session_name_deserialization_validates() {
        let parsed: Result<SessionName, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
        let parsed: SessionName = serde_json::from_str("\"ShootingGame_1F2E\"").expect("parse");
        assert!(parsed.has_prefix("ShootingGame_"));
    }
}
