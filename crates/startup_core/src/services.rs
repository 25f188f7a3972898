//! Contracts of the external services the startup flow drives. Every service is injected as an
//! `Arc<dyn ...>`; the `Missing*` implementations stand in when a platform has no such service.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{GroupId, Pose};

use crate::discovery::SessionDiscovery;

/// Completion predicate of a long-running service operation, polled once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Pending,
    Complete,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLoadOutcome {
    Loaded,
    NoSceneOnDevice,
}

#[async_trait]
pub trait RoomScanService: Send + Sync {
    async fn has_existing_room(&self) -> Result<bool>;
    /// Loads a previously saved scene from the device without user interaction.
    async fn load_from_device(&self) -> Result<RoomLoadOutcome>;
    /// Starts the interactive scan. Completion is reported through [`Self::scan_status`].
    async fn request_scan(&self) -> Result<()>;
    fn scan_status(&self) -> ServiceStatus;
}

#[async_trait]
pub trait ColocationService: Send + Sync {
    async fn establish_group(&self) -> Result<()>;
    fn colocation_status(&self) -> ServiceStatus;
    /// The shared group id, once visible to this device.
    fn group_id(&self) -> Option<GroupId>;
    async fn register_origin_calibration(&self, origin: Pose) -> Result<()>;
    fn alignment_status(&self) -> ServiceStatus;

    fn is_aligned(&self) -> bool {
        self.alignment_status() == ServiceStatus::Complete
    }
}

#[async_trait]
pub trait MeshSharingService: Send + Sync {
    async fn publish_mesh(&self) -> Result<()>;
    fn share_status(&self) -> ServiceStatus;
    async fn load_shared_mesh(&self) -> Result<()>;
    fn load_status(&self) -> ServiceStatus;
    /// Enables collision against locally available geometry when the shared mesh is unavailable.
    fn enable_local_fallback(&self);
}

pub struct MissingRoomScanService;

#[async_trait]
impl RoomScanService for MissingRoomScanService {
    async fn has_existing_room(&self) -> Result<bool> {
        Err(anyhow!("room scan service unavailable"))
    }

    async fn load_from_device(&self) -> Result<RoomLoadOutcome> {
        Err(anyhow!("room scan service unavailable"))
    }

    async fn request_scan(&self) -> Result<()> {
        Err(anyhow!("room scan service unavailable"))
    }

    fn scan_status(&self) -> ServiceStatus {
        ServiceStatus::Failed("room scan service unavailable".into())
    }
}

pub struct MissingColocationService;

#[async_trait]
impl ColocationService for MissingColocationService {
    async fn establish_group(&self) -> Result<()> {
        Err(anyhow!("colocation service unavailable"))
    }

    fn colocation_status(&self) -> ServiceStatus {
        ServiceStatus::Failed("colocation service unavailable".into())
    }

    fn group_id(&self) -> Option<GroupId> {
        None
    }

    async fn register_origin_calibration(&self, _origin: Pose) -> Result<()> {
        Err(anyhow!("colocation service unavailable"))
    }

    fn alignment_status(&self) -> ServiceStatus {
        ServiceStatus::Failed("colocation service unavailable".into())
    }
}

pub struct MissingMeshSharingService;

#[async_trait]
impl MeshSharingService for MissingMeshSharingService {
    async fn publish_mesh(&self) -> Result<()> {
        Err(anyhow!("mesh sharing service unavailable"))
    }

    fn share_status(&self) -> ServiceStatus {
        ServiceStatus::Failed("mesh sharing service unavailable".into())
    }

    async fn load_shared_mesh(&self) -> Result<()> {
        Err(anyhow!("mesh sharing service unavailable"))
    }

    fn load_status(&self) -> ServiceStatus {
        ServiceStatus::Failed("mesh sharing service unavailable".into())
    }

    fn enable_local_fallback(&self) {}
}

/// The collaborators one orchestrator drives.
#[derive(Clone)]
pub struct StartupServices {
    pub room_scan: Arc<dyn RoomScanService>,
    pub sessions: Arc<SessionDiscovery>,
    pub colocation: Arc<dyn ColocationService>,
    pub mesh: Arc<dyn MeshSharingService>,
}

impl StartupServices {
    pub fn new(sessions: Arc<SessionDiscovery>) -> Self {
        Self {
            room_scan: Arc::new(MissingRoomScanService),
            sessions,
            colocation: Arc::new(MissingColocationService),
            mesh: Arc::new(MissingMeshSharingService),
        }
    }

    pub fn with_room_scan(mut self, room_scan: Arc<dyn RoomScanService>) -> Self {
        self.room_scan = room_scan;
        self
    }

    pub fn with_colocation(mut self, colocation: Arc<dyn ColocationService>) -> Self {
        self.colocation = colocation;
        self
    }

    pub fn with_mesh_sharing(mut self, mesh: Arc<dyn MeshSharingService>) -> Self {
        self.mesh = mesh;
        self
    }
}
