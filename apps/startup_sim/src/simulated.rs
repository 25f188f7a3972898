//! Simulated spatial services. Host and joiners share one `SimulatedSpace`, standing in for the
//! physical room and the cloud services behind it.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use session_transport::{
    CreateSessionRequest, InMemorySessionRegistry, JoinSessionRequest, NetworkSessionService,
    SessionError, SessionHandle, SessionListing,
};
use shared::domain::{GroupId, Phase, Pose};
use startup_core::{
    ColocationService, MeshSharingService, RoomLoadOutcome, RoomScanService, ServiceStatus,
};
use tokio::{sync::broadcast, time::Instant};
use tracing::info;

const SCAN_DURATION: Duration = Duration::from_secs(2);
const COLOCATION_DURATION: Duration = Duration::from_millis(1500);
const ALIGNMENT_DURATION: Duration = Duration::from_millis(1500);
const MESH_DURATION: Duration = Duration::from_secs(1);

/// Phases whose service misbehaves until disarmed.
#[derive(Debug, Default)]
pub struct FailurePlan {
    armed: Mutex<HashSet<Phase>>,
}

impl FailurePlan {
    pub fn new(phases: impl IntoIterator<Item = Phase>) -> Self {
        Self {
            armed: Mutex::new(phases.into_iter().collect()),
        }
    }

    pub fn is_armed(&self, phase: Phase) -> bool {
        self.lock().contains(&phase)
    }

    pub fn has_armed(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn disarm_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Phase>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completes a fixed time after it was started.
#[derive(Debug, Default)]
struct Timer {
    started: Mutex<Option<Instant>>,
}

impl Timer {
    fn restart(&self) {
        *self.lock() = Some(Instant::now());
    }

    fn start_once(&self) {
        self.lock().get_or_insert_with(Instant::now);
    }

    fn status(&self, duration: Duration) -> ServiceStatus {
        match *self.lock() {
            Some(started) if started.elapsed() >= duration => ServiceStatus::Complete,
            _ => ServiceStatus::Pending,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct SimulatedSpace {
    failures: Arc<FailurePlan>,
    group: Mutex<Option<GroupId>>,
    mesh_published: AtomicBool,
}

impl SimulatedSpace {
    pub fn new(failures: Arc<FailurePlan>) -> Self {
        Self {
            failures,
            group: Mutex::new(None),
            mesh_published: AtomicBool::new(false),
        }
    }

    /// Pretends a host elsewhere already set up the room, for join-only runs.
    pub fn seed_remote_host(&self) -> GroupId {
        let group = GroupId::new_random();
        *self.group_slot() = Some(group);
        self.mesh_published.store(true, Ordering::SeqCst);
        group
    }

    pub fn failures(&self) -> &FailurePlan {
        &self.failures
    }

    fn group(&self) -> Option<GroupId> {
        *self.group_slot()
    }

    fn group_slot(&self) -> std::sync::MutexGuard<'_, Option<GroupId>> {
        self.group.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SimulatedRoomScan {
    space: Arc<SimulatedSpace>,
    existing_room: bool,
    scan: Timer,
}

impl SimulatedRoomScan {
    pub fn new(space: Arc<SimulatedSpace>, existing_room: bool) -> Self {
        Self {
            space,
            existing_room,
            scan: Timer::default(),
        }
    }
}

#[async_trait]
impl RoomScanService for SimulatedRoomScan {
    async fn has_existing_room(&self) -> Result<bool> {
        if self.space.failures().is_armed(Phase::CheckingRoomScan) {
            return Err(anyhow!("scene store is unavailable"));
        }
        Ok(self.existing_room)
    }

    async fn load_from_device(&self) -> Result<RoomLoadOutcome> {
        Ok(RoomLoadOutcome::NoSceneOnDevice)
    }

    async fn request_scan(&self) -> Result<()> {
        info!("simulated room scan started");
        self.scan.restart();
        Ok(())
    }

    fn scan_status(&self) -> ServiceStatus {
        if self.space.failures().is_armed(Phase::PromptingRoomScan) {
            return ServiceStatus::Failed("scan cancelled by user".into());
        }
        self.scan.status(SCAN_DURATION)
    }
}

pub struct SimulatedColocation {
    space: Arc<SimulatedSpace>,
    is_host: bool,
    establish: Timer,
    alignment: Timer,
    origin_registered: AtomicBool,
}

impl SimulatedColocation {
    pub fn new(space: Arc<SimulatedSpace>, is_host: bool) -> Self {
        Self {
            space,
            is_host,
            establish: Timer::default(),
            alignment: Timer::default(),
            origin_registered: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ColocationService for SimulatedColocation {
    async fn establish_group(&self) -> Result<()> {
        self.establish.restart();
        Ok(())
    }

    fn colocation_status(&self) -> ServiceStatus {
        if self.space.failures().is_armed(Phase::WaitingForColocation) {
            return ServiceStatus::Failed("anchor upload rejected".into());
        }
        let status = self.establish.status(COLOCATION_DURATION);
        if status == ServiceStatus::Complete {
            let mut group = self.space.group_slot();
            if group.is_none() {
                let created = GroupId::new_random();
                info!(group_id = %created, "simulated colocation group advertised");
                *group = Some(created);
            }
        }
        status
    }

    fn group_id(&self) -> Option<GroupId> {
        if !self.is_host && self.space.failures().is_armed(Phase::WaitingForAnchor) {
            return None;
        }
        self.space.group()
    }

    async fn register_origin_calibration(&self, origin: Pose) -> Result<()> {
        info!(position = ?origin.position, "host registered shared origin");
        self.origin_registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn alignment_status(&self) -> ServiceStatus {
        if self.is_host {
            return if self.origin_registered.load(Ordering::SeqCst) {
                ServiceStatus::Complete
            } else {
                ServiceStatus::Pending
            };
        }
        if self.space.failures().is_armed(Phase::LocalizingAnchor) {
            return ServiceStatus::Failed("anchor not visible from this position".into());
        }
        if self.space.group().is_none() {
            return ServiceStatus::Pending;
        }
        self.alignment.start_once();
        self.alignment.status(ALIGNMENT_DURATION)
    }
}

pub struct SimulatedMeshSharing {
    space: Arc<SimulatedSpace>,
    publish: Timer,
    load: Timer,
}

impl SimulatedMeshSharing {
    pub fn new(space: Arc<SimulatedSpace>) -> Self {
        Self {
            space,
            publish: Timer::default(),
            load: Timer::default(),
        }
    }
}

#[async_trait]
impl MeshSharingService for SimulatedMeshSharing {
    async fn publish_mesh(&self) -> Result<()> {
        if self.space.failures().is_armed(Phase::SharingRoomMesh) {
            return Err(anyhow!("mesh upload refused"));
        }
        self.publish.restart();
        Ok(())
    }

    fn share_status(&self) -> ServiceStatus {
        let status = self.publish.status(MESH_DURATION);
        if status == ServiceStatus::Complete {
            self.space.mesh_published.store(true, Ordering::SeqCst);
        }
        status
    }

    async fn load_shared_mesh(&self) -> Result<()> {
        self.load.restart();
        Ok(())
    }

    fn load_status(&self) -> ServiceStatus {
        // A stalled download surfaces as a timeout, not as a failure.
        if self.space.failures().is_armed(Phase::LoadingRoomMesh)
            || !self.space.mesh_published.load(Ordering::SeqCst)
        {
            return ServiceStatus::Pending;
        }
        self.load.status(MESH_DURATION)
    }

    fn enable_local_fallback(&self) {
        info!("using locally scanned collision geometry");
    }
}

/// In-memory transport that rejects session calls while their phase is armed to fail.
pub struct SimulatedTransport {
    registry: Arc<InMemorySessionRegistry>,
    failures: Arc<FailurePlan>,
}

impl SimulatedTransport {
    pub fn new(registry: Arc<InMemorySessionRegistry>, failures: Arc<FailurePlan>) -> Self {
        Self { registry, failures }
    }
}

#[async_trait]
impl NetworkSessionService for SimulatedTransport {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        if self.failures.is_armed(Phase::CreatingSession) {
            return Err(SessionError::Transport("relay region unreachable".into()));
        }
        self.registry.create_session(request).await
    }

    async fn join_session(
        &self,
        request: JoinSessionRequest,
    ) -> Result<SessionHandle, SessionError> {
        if self.failures.is_armed(Phase::JoiningSession) {
            return Err(SessionError::Rejected("host refused the connection".into()));
        }
        self.registry.join_session(request).await
    }

    async fn shutdown(&self, handle: &SessionHandle) -> Result<(), SessionError> {
        self.registry.shutdown(handle).await
    }

    fn subscribe_session_list(&self) -> broadcast::Receiver<Vec<SessionListing>> {
        self.registry.subscribe_session_list()
    }
}
