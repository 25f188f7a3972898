use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{GroupId, SessionName};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

mod memory;
pub use memory::InMemorySessionRegistry;

/// Session topologies the transport can start. Only the authority-less shared mode is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTopology {
    #[default]
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionRequest {
    pub name: SessionName,
    pub max_players: u32,
    pub topology: SessionTopology,
    pub host_label: String,
}

impl CreateSessionRequest {
    pub fn new(name: SessionName, max_players: u32) -> Self {
        Self {
            name,
            max_players,
            topology: SessionTopology::Shared,
            host_label: "Host".to_string(),
        }
    }

    #[must_use]
    pub fn with_host_label(mut self, host_label: impl Into<String>) -> Self {
        self.host_label = host_label.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSessionRequest {
    pub name: SessionName,
    pub topology: SessionTopology,
}

impl JoinSessionRequest {
    pub fn new(name: SessionName) -> Self {
        Self {
            name,
            topology: SessionTopology::Shared,
        }
    }
}

/// A live membership in a transport session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub name: SessionName,
    pub is_master: bool,
    pub topology: SessionTopology,
}

/// One row of the transport's raw session list. Names are unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListing {
    pub name: String,
    pub host_label: String,
    pub player_count: u32,
    pub max_players: u32,
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colocation_group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {0} was not found")]
    NotFound(SessionName),
    #[error("session {name} is full ({max_players} players)")]
    Full { name: SessionName, max_players: u32 },
    #[error("session name {0} is already in use")]
    NameInUse(SessionName),
    #[error("session request rejected: {0}")]
    Rejected(String),
    #[error("session transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NetworkSessionService: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, SessionError>;
    async fn join_session(&self, request: JoinSessionRequest)
        -> Result<SessionHandle, SessionError>;
    async fn shutdown(&self, handle: &SessionHandle) -> Result<(), SessionError>;
    /// Asynchronous session list updates; each message is the full current list.
    fn subscribe_session_list(&self) -> broadcast::Receiver<Vec<SessionListing>>;
}

pub struct MissingNetworkSessionService {
    listings: broadcast::Sender<Vec<SessionListing>>,
}

impl Default for MissingNetworkSessionService {
    fn default() -> Self {
        let (listings, _) = broadcast::channel(1);
        Self { listings }
    }
}

#[async_trait]
impl NetworkSessionService for MissingNetworkSessionService {
    async fn create_session(
        &self,
        _request: CreateSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        Err(SessionError::Transport(
            "network session service is unavailable".to_string(),
        ))
    }

    async fn join_session(
        &self,
        _request: JoinSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        Err(SessionError::Transport(
            "network session service is unavailable".to_string(),
        ))
    }

    async fn shutdown(&self, _handle: &SessionHandle) -> Result<(), SessionError> {
        Ok(())
    }

    fn subscribe_session_list(&self) -> broadcast::Receiver<Vec<SessionListing>> {
        self.listings.subscribe()
    }
}
