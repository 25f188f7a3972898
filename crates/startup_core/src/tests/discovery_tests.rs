use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use session_transport::InMemorySessionRegistry;
use tokio::sync::broadcast;

use super::*;

fn name(raw: &str) -> SessionName {
    SessionName::new(raw).expect("session name")
}

fn discovery_over(registry: &Arc<InMemorySessionRegistry>) -> SessionDiscovery {
    SessionDiscovery::new(registry.clone(), DiscoverySettings::default())
}

/// Reports every name as taken for the first `collisions` create calls.
struct CollidingTransport {
    collisions: usize,
    create_calls: AtomicUsize,
    requested_names: std::sync::Mutex<Vec<SessionName>>,
    listings: broadcast::Sender<Vec<SessionListing>>,
}

impl CollidingTransport {
    fn new(collisions: usize) -> Self {
        let (listings, _) = broadcast::channel(4);
        Self {
            collisions,
            create_calls: AtomicUsize::new(0),
            requested_names: std::sync::Mutex::new(Vec::new()),
            listings,
        }
    }
}

#[async_trait]
impl NetworkSessionService for CollidingTransport {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_names
            .lock()
            .expect("names")
            .push(request.name.clone());
        if call < self.collisions {
            return Err(SessionError::NameInUse(request.name));
        }
        Ok(SessionHandle {
            session_id: Uuid::new_v4(),
            name: request.name,
            is_master: true,
            topology: request.topology,
        })
    }

    async fn join_session(
        &self,
        request: JoinSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        Err(SessionError::NotFound(request.name))
    }

    async fn shutdown(&self, _handle: &SessionHandle) -> Result<(), SessionError> {
        Ok(())
    }

    fn subscribe_session_list(&self) -> broadcast::Receiver<Vec<SessionListing>> {
        self.listings.subscribe()
    }
}

#[test]
fn generated_names_follow_naming_convention() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);

    let generated = discovery.generate_session_name().expect("generate");
    let suffix = generated
        .as_str()
        .strip_prefix("ShootingGame_")
        .expect("prefix");
    assert_eq!(suffix.len(), 4);
    assert!(suffix
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
}

#[tokio::test]
async fn create_without_name_generates_one() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);

    let handle = discovery.create_session(None).await.expect("create");
    assert!(handle.is_master);
    assert!(handle.name.has_prefix("ShootingGame_"));
    assert_eq!(discovery.active_session().await, Some(handle));
}

#[tokio::test]
async fn generated_name_collisions_are_retried() {
    let transport = Arc::new(CollidingTransport::new(2));
    let discovery = SessionDiscovery::new(transport.clone(), DiscoverySettings::default());

    let handle = discovery.create_session(None).await.expect("create");
    assert_eq!(transport.create_calls.load(Ordering::SeqCst), 3);
    let requested = transport.requested_names.lock().expect("names").clone();
    assert_eq!(requested.last(), Some(&handle.name));
}

#[tokio::test]
async fn generated_name_retries_are_bounded() {
    let transport = Arc::new(CollidingTransport::new(usize::MAX));
    let discovery = SessionDiscovery::new(transport.clone(), DiscoverySettings::default());

    let err = discovery.create_session(None).await.expect_err("exhausted");
    assert!(matches!(err, SessionError::NameInUse(_)));
    assert_eq!(transport.create_calls.load(Ordering::SeqCst), 4);
    assert_eq!(discovery.active_session().await, None);
}

#[tokio::test]
async fn user_supplied_name_is_never_altered() {
    let transport = Arc::new(CollidingTransport::new(1));
    let discovery = SessionDiscovery::new(transport.clone(), DiscoverySettings::default());

    let err = discovery
        .create_session(Some(name("ShootingGame_MINE")))
        .await
        .expect_err("taken");
    assert_eq!(err, SessionError::NameInUse(name("ShootingGame_MINE")));
    assert_eq!(transport.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn new_session_replaces_active_one() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);

    let first = discovery
        .create_session(Some(name("ShootingGame_AAAA")))
        .await
        .expect("first");
    let second = discovery
        .create_session(Some(name("ShootingGame_BBBB")))
        .await
        .expect("second");

    assert_eq!(registry.member_count(&first.name).await, None);
    assert_eq!(registry.member_count(&second.name).await, Some(1));
    assert_eq!(discovery.active_session().await, Some(second));
}

#[tokio::test]
async fn join_after_create_leaves_one_handle() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let other_host = discovery_over(&registry);
    other_host
        .create_session(Some(name("ShootingGame_HOST")))
        .await
        .expect("remote host");

    let discovery = discovery_over(&registry);
    let own = discovery
        .create_session(Some(name("ShootingGame_OWN1")))
        .await
        .expect("own");
    let joined = discovery
        .join_session(name("ShootingGame_HOST"))
        .await
        .expect("join");

    assert!(!joined.is_master);
    assert_eq!(registry.member_count(&own.name).await, None);
    assert_eq!(registry.member_count(&joined.name).await, Some(2));
    assert_eq!(discovery.active_session().await, Some(joined));
}

#[tokio::test]
async fn concurrent_creates_never_leave_two_sessions() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);

    let (a, b) = tokio::join!(
        discovery.create_session(Some(name("ShootingGame_AAAA"))),
        discovery.create_session(Some(name("ShootingGame_BBBB"))),
    );
    a.expect("a");
    b.expect("b");

    assert_eq!(registry.listings().await.len(), 1);
    let active = discovery.active_session().await.expect("active");
    assert_eq!(registry.member_count(&active.name).await, Some(1));
}

#[tokio::test]
async fn disconnect_without_session_is_noop() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);

    discovery.disconnect().await.expect("noop");

    let handle = discovery.create_session(None).await.expect("create");
    discovery.disconnect().await.expect("disconnect");
    assert_eq!(discovery.active_session().await, None);
    assert_eq!(registry.member_count(&handle.name).await, None);
    discovery.disconnect().await.expect("second disconnect");
}

#[tokio::test]
async fn release_ignores_replaced_handle() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);

    let stale = discovery
        .create_session(Some(name("ShootingGame_OLD1")))
        .await
        .expect("stale");
    let current = discovery
        .create_session(Some(name("ShootingGame_NEW1")))
        .await
        .expect("current");

    assert!(!discovery.release(&stale).await.expect("release stale"));
    assert_eq!(discovery.active_session().await, Some(current.clone()));
    assert!(discovery.release(&current).await.expect("release current"));
    assert_eq!(discovery.active_session().await, None);
}

#[tokio::test]
async fn discoverable_sessions_filters_foreign_names() {
    let registry = Arc::new(InMemorySessionRegistry::new());
    let discovery = discovery_over(&registry);
    let mut sessions = discovery.discoverable_sessions();

    registry
        .create_session(CreateSessionRequest::new(name("OtherApp_1234"), 4))
        .await
        .expect("foreign");
    registry
        .create_session(
            CreateSessionRequest::new(name("ShootingGame_AB12"), 4).with_host_label("Alice"),
        )
        .await
        .expect("ours");

    let first = sessions.next().await.expect("first update");
    assert!(first.is_empty());

    let second = sessions.next().await.expect("second update");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name.as_str(), "ShootingGame_AB12");
    assert_eq!(second[0].host_label, "Alice");
    assert_eq!(second[0].current_player_count, 1);
}

#[test]
fn filter_listings_drops_closed_and_invalid_entries() {
    let seen_at = Utc::now();
    let listing = |name: &str, is_open: bool| SessionListing {
        name: name.to_string(),
        host_label: "Host".into(),
        player_count: 1,
        max_players: 8,
        is_open,
        colocation_group_id: None,
    };

    let sessions = filter_listings(
        "ShootingGame_",
        vec![
            listing("ShootingGame_OPEN", true),
            listing("ShootingGame_SHUT", false),
            listing(&format!("ShootingGame_{}", "X".repeat(80)), true),
        ],
        seen_at,
    );

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name.as_str(), "ShootingGame_OPEN");
    assert_eq!(sessions[0].last_seen_at, seen_at);
}
