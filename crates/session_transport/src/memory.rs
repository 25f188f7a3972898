//! Process-local session registry. Every caller sharing one registry sees the same sessions,
//! which lets a host and its joiners run against each other inside a single process.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use shared::domain::{GroupId, SessionName};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    CreateSessionRequest, JoinSessionRequest, NetworkSessionService, SessionError, SessionHandle,
    SessionListing, SessionTopology,
};

struct RegisteredSession {
    host_label: String,
    max_players: u32,
    topology: SessionTopology,
    master: Uuid,
    members: BTreeSet<Uuid>,
    colocation_group_id: Option<GroupId>,
}

pub struct InMemorySessionRegistry {
    sessions: Mutex<BTreeMap<SessionName, RegisteredSession>>,
    listings: broadcast::Sender<Vec<SessionListing>>,
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        let (listings, _) = broadcast::channel(64);
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            listings,
        }
    }

    /// Advertise the colocation group of a session in subsequent list updates.
    pub async fn set_colocation_group(&self, name: &SessionName, group_id: GroupId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(name) else {
            return false;
        };
        session.colocation_group_id = Some(group_id);
        Self::publish(&self.listings, &sessions);
        true
    }

    pub async fn listings(&self) -> Vec<SessionListing> {
        let sessions = self.sessions.lock().await;
        Self::snapshot(&sessions)
    }

    /// Re-broadcast the current list, as a transport lobby does on its refresh cadence.
    pub async fn publish_session_list(&self) {
        let sessions = self.sessions.lock().await;
        Self::publish(&self.listings, &sessions);
    }

    pub async fn member_count(&self, name: &SessionName) -> Option<usize> {
        let sessions = self.sessions.lock().await;
        sessions.get(name).map(|session| session.members.len())
    }

    fn snapshot(sessions: &BTreeMap<SessionName, RegisteredSession>) -> Vec<SessionListing> {
        sessions
            .iter()
            .map(|(name, session)| SessionListing {
                name: name.to_string(),
                host_label: session.host_label.clone(),
                player_count: session.members.len() as u32,
                max_players: session.max_players,
                is_open: (session.members.len() as u32) < session.max_players,
                colocation_group_id: session.colocation_group_id,
            })
            .collect()
    }

    fn publish(
        listings: &broadcast::Sender<Vec<SessionListing>>,
        sessions: &BTreeMap<SessionName, RegisteredSession>,
    ) {
        let _ = listings.send(Self::snapshot(sessions));
    }
}

#[async_trait]
impl NetworkSessionService for InMemorySessionRegistry {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        if request.max_players == 0 {
            return Err(SessionError::Rejected(
                "max players must be at least 1".to_string(),
            ));
        }

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&request.name) {
            return Err(SessionError::NameInUse(request.name));
        }

        let member_id = Uuid::new_v4();
        sessions.insert(
            request.name.clone(),
            RegisteredSession {
                host_label: request.host_label,
                max_players: request.max_players,
                topology: request.topology,
                master: member_id,
                members: BTreeSet::from([member_id]),
                colocation_group_id: None,
            },
        );
        Self::publish(&self.listings, &sessions);
        info!(session = %request.name, "in-memory session created");

        Ok(SessionHandle {
            session_id: member_id,
            name: request.name,
            is_master: true,
            topology: request.topology,
        })
    }

    async fn join_session(
        &self,
        request: JoinSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&request.name) else {
            return Err(SessionError::NotFound(request.name));
        };
        if session.topology != request.topology {
            return Err(SessionError::Rejected(format!(
                "session {} uses a different topology",
                request.name
            )));
        }
        if session.members.len() as u32 >= session.max_players {
            return Err(SessionError::Full {
                name: request.name,
                max_players: session.max_players,
            });
        }

        let member_id = Uuid::new_v4();
        session.members.insert(member_id);
        Self::publish(&self.listings, &sessions);
        info!(session = %request.name, "joined in-memory session");

        Ok(SessionHandle {
            session_id: member_id,
            name: request.name,
            is_master: false,
            topology: request.topology,
        })
    }

    async fn shutdown(&self, handle: &SessionHandle) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&handle.name) else {
            debug!(session = %handle.name, "shutdown for unknown session ignored");
            return Ok(());
        };

        session.members.remove(&handle.session_id);
        if session.members.is_empty() {
            sessions.remove(&handle.name);
            info!(session = %handle.name, "in-memory session closed");
        } else if session.master == handle.session_id {
            if let Some(next_master) = session.members.iter().next().copied() {
                session.master = next_master;
                info!(session = %handle.name, "session master migrated to remaining member");
            }
        }
        Self::publish(&self.listings, &sessions);
        Ok(())
    }

    fn subscribe_session_list(&self) -> broadcast::Receiver<Vec<SessionListing>> {
        self.listings.subscribe()
    }
}
