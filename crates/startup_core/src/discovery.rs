use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt};
use session_transport::{
    CreateSessionRequest, JoinSessionRequest, NetworkSessionService, SessionError, SessionHandle,
    SessionListing,
};
use shared::domain::{DiscoveredSession, SessionName};
use tokio::sync::Mutex;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DiscoverySettings;

const MAX_GENERATED_NAME_RETRIES: usize = 3;
const GENERATED_SUFFIX_LEN: usize = 4;

/// Creates, joins and lists network sessions on top of the transport, keeping at most one active
/// session handle per process. Starting a session while one is active replaces it.
pub struct SessionDiscovery {
    transport: Arc<dyn NetworkSessionService>,
    settings: DiscoverySettings,
    active: Mutex<Option<SessionHandle>>,
}

impl SessionDiscovery {
    pub fn new(transport: Arc<dyn NetworkSessionService>, settings: DiscoverySettings) -> Self {
        Self {
            transport,
            settings,
            active: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// `<prefix><4 uppercase hex chars>`, e.g. `ShootingGame_1F2E`.
    pub fn generate_session_name(&self) -> Result<SessionName, SessionError> {
        let suffix = Uuid::new_v4().simple().to_string()[..GENERATED_SUFFIX_LEN].to_uppercase();
        SessionName::new(format!("{}{suffix}", self.settings.session_prefix))
            .map_err(|err| SessionError::Rejected(format!("cannot generate session name: {err}")))
    }

    pub async fn create_session(
        &self,
        name: Option<SessionName>,
    ) -> Result<SessionHandle, SessionError> {
        let mut active = self.active.lock().await;
        self.replace_active(&mut active, "create").await;

        let generated = name.is_none();
        let mut name = match name {
            Some(name) => name,
            None => self.generate_session_name()?,
        };
        let mut retries = 0;

        loop {
            let request = CreateSessionRequest::new(name.clone(), self.settings.max_players)
                .with_host_label(self.settings.host_label.clone());
            match self.transport.create_session(request).await {
                Ok(handle) => {
                    info!(
                        session = %handle.name,
                        max_players = self.settings.max_players,
                        "network session created"
                    );
                    *active = Some(handle.clone());
                    return Ok(handle);
                }
                Err(SessionError::NameInUse(taken))
                    if generated && retries < MAX_GENERATED_NAME_RETRIES =>
                {
                    retries += 1;
                    warn!(session = %taken, retries, "generated session name taken; regenerating");
                    name = self.generate_session_name()?;
                }
                Err(err) => {
                    warn!(session = %name, error = %err, "network session creation failed");
                    return Err(err);
                }
            }
        }
    }

    pub async fn join_session(&self, name: SessionName) -> Result<SessionHandle, SessionError> {
        let mut active = self.active.lock().await;
        self.replace_active(&mut active, "join").await;

        match self
            .transport
            .join_session(JoinSessionRequest::new(name.clone()))
            .await
        {
            Ok(handle) => {
                info!(session = %handle.name, is_master = handle.is_master, "joined network session");
                *active = Some(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                warn!(session = %name, error = %err, "joining network session failed");
                Err(err)
            }
        }
    }

    /// Tears down the active session. A no-op when none is active.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut active = self.active.lock().await;
        let Some(handle) = active.take() else {
            debug!("disconnect requested without an active session");
            return Ok(());
        };
        info!(session = %handle.name, "disconnecting network session");
        self.transport.shutdown(&handle).await
    }

    /// Disconnects only if `handle` is still the active session; returns whether it was.
    pub async fn release(&self, handle: &SessionHandle) -> Result<bool, SessionError> {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|current| current.session_id) != Some(handle.session_id) {
            debug!(session = %handle.name, "release skipped; session is no longer active");
            return Ok(false);
        }
        active.take();
        info!(session = %handle.name, "releasing network session");
        self.transport.shutdown(handle).await?;
        Ok(true)
    }

    pub async fn active_session(&self) -> Option<SessionHandle> {
        self.active.lock().await.clone()
    }

    /// Live session list filtered to this application's naming convention. Each item is the full
    /// current list; the stream ends when the transport drops its list channel.
    pub fn discoverable_sessions(&self) -> BoxStream<'static, Vec<DiscoveredSession>> {
        let prefix = self.settings.session_prefix.clone();
        BroadcastStream::new(self.transport.subscribe_session_list())
            .filter_map(move |update| {
                let sessions = match update {
                    Ok(listings) => Some(filter_listings(&prefix, listings, Utc::now())),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "session list subscriber lagged; waiting for next update");
                        None
                    }
                };
                futures::future::ready(sessions)
            })
            .boxed()
    }

    async fn replace_active(&self, active: &mut Option<SessionHandle>, operation: &str) {
        let Some(previous) = active.take() else {
            return;
        };
        warn!(
            session = %previous.name,
            operation,
            "session already active; disconnecting it first"
        );
        if let Err(err) = self.transport.shutdown(&previous).await {
            warn!(session = %previous.name, error = %err, "failed to shut down replaced session");
        }
    }
}

/// Keeps open listings whose name is valid and carries `prefix`.
pub fn filter_listings(
    prefix: &str,
    listings: Vec<SessionListing>,
    seen_at: DateTime<Utc>,
) -> Vec<DiscoveredSession> {
    listings
        .into_iter()
        .filter(|listing| listing.is_open && listing.name.starts_with(prefix))
        .filter_map(|listing| {
            let name = SessionName::new(listing.name).ok()?;
            Some(DiscoveredSession {
                name,
                host_label: listing.host_label,
                current_player_count: listing.player_count,
                max_players: listing.max_players,
                colocation_group_id: listing.colocation_group_id,
                last_seen_at: seen_at,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/discovery_tests.rs"]
mod tests;
