//! Startup orchestration: brings a participant from launch to a joined, spatially aligned,
//! ready-to-play session through a fixed per-role phase sequence.

use std::mem;

use anyhow::{anyhow, Result};
use session_transport::{SessionError, SessionHandle};
use shared::{
    domain::{Phase, Pose, Role, SessionName},
    error::{FailureKind, PhaseFailure},
    protocol::{StartupEvent, StartupIntent, StartupSnapshot},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

pub mod config;
pub mod discovery;
pub mod gate;
mod pending;
mod process;
pub mod services;
pub mod timeout;

pub use config::{load_settings, DiscoverySettings, Settings, StartupFlowConfig};
pub use discovery::SessionDiscovery;
pub use gate::{GateDecision, IgnoreReason, RoleChoice, RoleIntentGate};
pub use services::{
    ColocationService, MeshSharingService, RoomLoadOutcome, RoomScanService, ServiceStatus,
    StartupServices,
};
pub use timeout::TimeoutPolicy;

use pending::{OpPoll, PendingOp};
use process::SessionProcess;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const INTENT_QUEUE_CAPACITY: usize = 16;
const WAIT_LOG_INTERVAL_SECS: u64 = 5;

const ROLE_RESOLVED_PROGRESS: f32 = 0.1;
const ROOM_READY_PROGRESS: f32 = 0.25;
const JOINED_PROGRESS: f32 = 0.25;
const SESSION_CREATED_PROGRESS: f32 = 0.4;
const ANCHOR_FOUND_PROGRESS: f32 = 0.4;
const ALIGNED_PROGRESS: f32 = 0.6;
const MESH_SETTLED_PROGRESS: f32 = 0.9;

const MANUAL_SCAN_PROMPT: &str = "Room scan required. Please scan your room.";
const SCANNING_STATUS: &str = "Scanning room...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    Ignored(IgnoreReason),
}

/// What the current phase is waiting on.
enum PhaseWork {
    Idle,
    CheckingRoom(PendingOp<Result<bool>>),
    LoadingFromDevice(PendingOp<Result<RoomLoadOutcome>>),
    RequestingScan(PendingOp<Result<()>>),
    AwaitingManualScan,
    PollingScan,
    Connecting(PendingOp<Result<SessionHandle, SessionError>>),
    EstablishingGroup(PendingOp<Result<()>>),
    PollingColocation,
    RegisteringOrigin(PendingOp<Result<()>>),
    PublishingMesh(PendingOp<Result<()>>),
    PollingShare,
    PollingAnchor,
    PollingAlignment,
    LoadingSharedMesh(PendingOp<Result<()>>),
    PollingMeshLoad,
}

/// The outcome of starting or polling a phase's work.
enum Step {
    Stay(PhaseWork),
    Prompt(PhaseWork, String),
    Next(f32),
    SkipTo(Phase, f32),
    Connected(SessionHandle),
    Fail(FailureKind, String),
    Degrade(String),
}

/// Drives one participant's startup. It is the single writer of the process state; observers get
/// events over a broadcast channel and the latest snapshot over a watch channel.
pub struct StartupOrchestrator {
    config: StartupFlowConfig,
    policy: TimeoutPolicy,
    services: StartupServices,
    host_session_name: Option<SessionName>,
    gate: RoleIntentGate,
    process: SessionProcess,
    work: PhaseWork,
    wait_log_bucket: u64,
    events: broadcast::Sender<StartupEvent>,
    snapshot_tx: watch::Sender<StartupSnapshot>,
}

impl StartupOrchestrator {
    pub fn new(config: StartupFlowConfig, services: StartupServices) -> Self {
        let host_session_name = match config.host_session_name() {
            Ok(name) => name,
            Err(err) => {
                warn!(error = %err, "ignoring configured host session name");
                None
            }
        };
        let process = SessionProcess::new(Instant::now());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, _) = watch::channel(process.snapshot());

        Self {
            policy: TimeoutPolicy::from_config(&config),
            gate: RoleIntentGate::new(config.require_role_selection),
            config,
            services,
            host_session_name,
            process,
            work: PhaseWork::Idle,
            wait_log_bucket: 0,
            events,
            snapshot_tx,
        }
    }

    /// Overrides the name the host creates its session under.
    pub fn with_host_session_name(mut self, name: SessionName) -> Self {
        self.host_session_name = Some(name);
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StartupEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<StartupSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> StartupSnapshot {
        self.process.snapshot()
    }

    pub fn current_phase(&self) -> Phase {
        self.process.phase
    }

    pub fn progress(&self) -> f32 {
        self.process.progress
    }

    pub fn is_host(&self) -> bool {
        self.process.role == Some(Role::Host)
    }

    pub fn is_startup_complete(&self) -> bool {
        self.process.is_startup_complete
    }

    pub fn config(&self) -> &StartupFlowConfig {
        &self.config
    }

    /// Enters `Initializing`; role selection opens once the platform delay has passed.
    pub fn start(&mut self, now: Instant) {
        self.process.phase_entered_at = now;
        self.process.status_message = "Initializing...".into();
        info!(
            attempt = self.process.attempt,
            init_delay_ms = self.config.platform_init_delay_ms,
            "startup orchestrator started"
        );
        self.emit_state_changed();
        if self.config.platform_init_delay().is_zero() {
            self.open_role_selection(now);
        }
    }

    /// One cooperative step: pick up finished collaborator calls, poll completion predicates and
    /// enforce the current phase's deadline. Must run inside a tokio runtime.
    pub fn tick(&mut self, now: Instant) {
        if self.process.phase == Phase::Initializing {
            let elapsed = now.saturating_duration_since(self.process.phase_entered_at);
            if elapsed >= self.config.platform_init_delay() {
                self.open_role_selection(now);
            }
            return;
        }

        let work = mem::replace(&mut self.work, PhaseWork::Idle);
        let step = self.poll_step(work);
        self.apply_step(step, now);
        self.check_deadline(now);
    }

    pub fn handle_intent(&mut self, intent: StartupIntent, now: Instant) -> IntentOutcome {
        let intent_name = intent.name();
        let outcome = match intent {
            StartupIntent::ChooseHost => {
                let decision = self.gate.choose_host();
                self.resolve_role(decision, now)
            }
            StartupIntent::ChooseJoin { session_name } => {
                let decision = self.gate.choose_join(session_name);
                self.resolve_role(decision, now)
            }
            StartupIntent::TransportSessionStarted {
                session_name,
                is_master,
            } => {
                let decision = self.gate.transport_session_started(session_name, is_master);
                self.resolve_role(decision, now)
            }
            StartupIntent::Retry => self.retry(now),
            StartupIntent::RequestManualScan => self.request_manual_scan(now),
            StartupIntent::Cancel => self.cancel(now),
        };

        if let IntentOutcome::Ignored(reason) = outcome {
            debug!(
                intent = intent_name,
                ?reason,
                phase = %self.process.phase,
                "startup intent ignored"
            );
        }
        outcome
    }

    /// Runs the orchestrator on the current runtime until the intent channel closes.
    pub async fn run(mut self, mut intents: mpsc::Receiver<StartupIntent>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.start(Instant::now());

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Instant::now()),
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        self.handle_intent(intent, Instant::now());
                    }
                    None => {
                        info!(phase = %self.process.phase, "intent channel closed; startup driver stopping");
                        break;
                    }
                },
            }
        }
    }

    /// Moves the orchestrator onto its own task. Subscribe to events before spawning to observe
    /// the initial transitions.
    pub fn spawn(self) -> StartupHandle {
        let (intents, rx) = mpsc::channel(INTENT_QUEUE_CAPACITY);
        let events = self.events.clone();
        let snapshot = self.snapshot_tx.subscribe();
        let task = tokio::spawn(self.run(rx));
        StartupHandle {
            intents,
            events,
            snapshot,
            task,
        }
    }

    fn open_role_selection(&mut self, now: Instant) {
        if self.process.is_role_resolved {
            return;
        }
        self.gate.open();
        self.enter_phase(Phase::RoleSelection, now);
    }

    fn resolve_role(&mut self, decision: GateDecision, now: Instant) -> IntentOutcome {
        let choice = match decision {
            GateDecision::Resolved(choice) => choice,
            GateDecision::Ignored(reason) => return IntentOutcome::Ignored(reason),
        };

        self.process.role = Some(choice.role);
        self.process.is_role_resolved = true;
        self.process.selected_session_name = choice.session_name;
        self.process.adopted_session = choice.adopted_session;
        info!(
            role = %choice.role,
            session = ?self.process.selected_session_name.as_ref().map(|n| n.as_str()),
            adopted = choice.adopted_session,
            "startup role resolved"
        );

        self.process.advance_progress(ROLE_RESOLVED_PROGRESS);
        match choice.role.next_phase(Phase::RoleSelection) {
            Some(first) => self.enter_phase(first, now),
            None => self.fail(
                FailureKind::Service,
                format!("no phases configured for role {}", choice.role),
                now,
            ),
        }
        IntentOutcome::Applied
    }

    fn retry(&mut self, now: Instant) -> IntentOutcome {
        if self.process.phase != Phase::Error {
            return IntentOutcome::Ignored(IgnoreReason::NotInError);
        }
        let Some(failed_phase) = self.process.failed_phase else {
            return IntentOutcome::Ignored(IgnoreReason::NotInError);
        };

        info!(phase = %failed_phase, attempt = self.process.attempt, "retrying failed startup phase");
        self.process.error_message = None;
        self.process.failed_phase = None;
        self.enter_phase(failed_phase, now);
        IntentOutcome::Applied
    }

    fn request_manual_scan(&mut self, now: Instant) -> IntentOutcome {
        if self.process.role != Some(Role::Host) {
            return IntentOutcome::Ignored(IgnoreReason::HostOnly);
        }
        if self.process.phase != Phase::PromptingRoomScan {
            return IntentOutcome::Ignored(IgnoreReason::NotPromptingForScan);
        }
        if !matches!(self.work, PhaseWork::AwaitingManualScan) {
            return IntentOutcome::Ignored(IgnoreReason::ScanAlreadyRunning);
        }

        info!("manual room scan requested");
        // The scan itself gets a full step timeout.
        self.process.phase_entered_at = now;
        self.wait_log_bucket = 0;
        self.work = PhaseWork::RequestingScan(self.spawn_request_scan());
        self.set_status(SCANNING_STATUS);
        IntentOutcome::Applied
    }

    fn cancel(&mut self, now: Instant) -> IntentOutcome {
        if self.process.phase == Phase::Ready {
            return IntentOutcome::Ignored(IgnoreReason::AlreadyComplete);
        }
        if !self.process.is_role_resolved {
            return IntentOutcome::Ignored(IgnoreReason::NothingToCancel);
        }

        let abandoned_phase = self.process.phase;
        self.work = PhaseWork::Idle;
        if let Some(handle) = self.process.active_session.take() {
            let sessions = self.services.sessions.clone();
            tokio::spawn(async move {
                if let Err(err) = sessions.release(&handle).await {
                    warn!(session = %handle.name, error = %err, "failed to release cancelled session");
                }
            });
        }

        let attempt = self.process.begin_new_attempt();
        self.gate.reset();
        self.gate.open();
        info!(phase = %abandoned_phase, attempt, "startup attempt cancelled; back to role selection");
        self.enter_phase(Phase::RoleSelection, now);
        IntentOutcome::Applied
    }

    fn enter_phase(&mut self, phase: Phase, now: Instant) {
        let from = self.process.phase;
        self.work = PhaseWork::Idle;
        self.process.phase = phase;
        self.process.phase_entered_at = now;
        self.process.status_message = self.entry_status(phase);
        self.wait_log_bucket = 0;
        info!(
            from = %from,
            to = %phase,
            attempt = self.process.attempt,
            progress = self.process.progress,
            "startup phase transition"
        );
        self.emit_state_changed();

        let step = self.begin_step(phase);
        self.apply_step(step, now);
    }

    fn entry_status(&self, phase: Phase) -> String {
        let session = self
            .process
            .selected_session_name
            .as_ref()
            .map(|name| name.to_string());
        match phase {
            Phase::Initializing => "Initializing...".into(),
            Phase::RoleSelection => "Host a new game or join an existing one".into(),
            Phase::CheckingRoomScan => "Checking for a room scan...".into(),
            Phase::PromptingRoomScan => "Loading room scan...".into(),
            Phase::CreatingSession => match (&self.host_session_name, self.process.adopted_session) {
                (_, true) => "Using the started session...".into(),
                (Some(name), false) => format!("Creating session {name}..."),
                (None, false) => "Creating session...".into(),
            },
            Phase::WaitingForColocation => "Setting up shared space...".into(),
            Phase::SharingRoomMesh => "Sharing room with other players...".into(),
            Phase::JoiningSession => match session {
                Some(name) => format!("Joining {name}..."),
                None => "Joining session...".into(),
            },
            Phase::WaitingForAnchor => "Looking for the host's anchor...".into(),
            Phase::LocalizingAnchor => "Aligning to the shared space...".into(),
            Phase::LoadingRoomMesh => "Loading the shared room...".into(),
            Phase::Ready => "Ready!".into(),
            Phase::Error => "Error".into(),
        }
    }

    /// Starts the collaborator work for a freshly entered phase.
    fn begin_step(&self, phase: Phase) -> Step {
        match phase {
            Phase::Initializing | Phase::RoleSelection | Phase::Ready | Phase::Error => {
                Step::Stay(PhaseWork::Idle)
            }
            Phase::CheckingRoomScan => {
                let room_scan = self.services.room_scan.clone();
                Step::Stay(PhaseWork::CheckingRoom(PendingOp::spawn(async move {
                    room_scan.has_existing_room().await
                })))
            }
            Phase::PromptingRoomScan => {
                let room_scan = self.services.room_scan.clone();
                Step::Stay(PhaseWork::LoadingFromDevice(PendingOp::spawn(async move {
                    room_scan.load_from_device().await
                })))
            }
            Phase::CreatingSession => {
                if self.process.adopted_session {
                    return Step::Next(SESSION_CREATED_PROGRESS);
                }
                let sessions = self.services.sessions.clone();
                let name = self.host_session_name.clone();
                Step::Stay(PhaseWork::Connecting(PendingOp::spawn(async move {
                    sessions.create_session(name).await
                })))
            }
            Phase::WaitingForColocation => {
                let colocation = self.services.colocation.clone();
                Step::Stay(PhaseWork::EstablishingGroup(PendingOp::spawn(async move {
                    colocation.establish_group().await
                })))
            }
            Phase::SharingRoomMesh => {
                let mesh = self.services.mesh.clone();
                Step::Stay(PhaseWork::PublishingMesh(PendingOp::spawn(async move {
                    mesh.publish_mesh().await
                })))
            }
            Phase::JoiningSession => {
                if self.process.adopted_session {
                    return Step::Next(JOINED_PROGRESS);
                }
                let Some(name) = self.process.selected_session_name.clone() else {
                    return Step::Fail(FailureKind::Service, "No session selected to join".into());
                };
                let sessions = self.services.sessions.clone();
                Step::Stay(PhaseWork::Connecting(PendingOp::spawn(async move {
                    sessions.join_session(name).await
                })))
            }
            Phase::WaitingForAnchor => Step::Stay(PhaseWork::PollingAnchor),
            Phase::LocalizingAnchor => Step::Stay(PhaseWork::PollingAlignment),
            Phase::LoadingRoomMesh => {
                let mesh = self.services.mesh.clone();
                Step::Stay(PhaseWork::LoadingSharedMesh(PendingOp::spawn(async move {
                    mesh.load_shared_mesh().await
                })))
            }
        }
    }

    fn poll_step(&self, work: PhaseWork) -> Step {
        match work {
            PhaseWork::Idle => Step::Stay(work),
            PhaseWork::CheckingRoom(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::CheckingRoom(op)),
                OpPoll::Done(Ok(true)) => {
                    Step::SkipTo(Phase::CreatingSession, ROOM_READY_PROGRESS)
                }
                OpPoll::Done(Ok(false)) => Step::Next(ROLE_RESOLVED_PROGRESS),
                OpPoll::Done(Err(err)) => {
                    Step::Fail(FailureKind::Service, format!("Room scan check failed: {err:#}"))
                }
                OpPoll::Lost => self.lost_step(),
            },
            PhaseWork::LoadingFromDevice(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::LoadingFromDevice(op)),
                OpPoll::Done(Ok(RoomLoadOutcome::Loaded)) => {
                    info!("room scan loaded from device");
                    Step::Next(ROOM_READY_PROGRESS)
                }
                OpPoll::Done(Ok(RoomLoadOutcome::NoSceneOnDevice)) => self.scan_prompt_step(),
                OpPoll::Done(Err(err)) => {
                    warn!(error = %format!("{err:#}"), "loading room from device failed; asking for a scan");
                    self.scan_prompt_step()
                }
                OpPoll::Lost => self.lost_step(),
            },
            PhaseWork::RequestingScan(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::RequestingScan(op)),
                OpPoll::Done(Ok(())) => Step::Stay(PhaseWork::PollingScan),
                OpPoll::Done(Err(err)) => Step::Fail(
                    FailureKind::Service,
                    format!("Room scan request failed: {err:#}"),
                ),
                OpPoll::Lost => self.lost_step(),
            },
            // The room may also be scanned outside the app while the prompt is up.
            PhaseWork::AwaitingManualScan => match self.services.room_scan.scan_status() {
                ServiceStatus::Pending => Step::Stay(PhaseWork::AwaitingManualScan),
                ServiceStatus::Complete => {
                    info!("room scan completed without a manual request");
                    Step::Next(ROOM_READY_PROGRESS)
                }
                ServiceStatus::Failed(message) => {
                    Step::Fail(FailureKind::Service, format!("Room scan failed: {message}"))
                }
            },
            PhaseWork::PollingScan => match self.services.room_scan.scan_status() {
                ServiceStatus::Pending => Step::Stay(PhaseWork::PollingScan),
                ServiceStatus::Complete => Step::Next(ROOM_READY_PROGRESS),
                ServiceStatus::Failed(message) => {
                    Step::Fail(FailureKind::Service, format!("Room scan failed: {message}"))
                }
            },
            PhaseWork::Connecting(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::Connecting(op)),
                OpPoll::Done(Ok(handle)) => Step::Connected(handle),
                OpPoll::Done(Err(err)) => {
                    Step::Fail(FailureKind::Service, self.session_failure_message(&err))
                }
                OpPoll::Lost => self.lost_step(),
            },
            PhaseWork::EstablishingGroup(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::EstablishingGroup(op)),
                OpPoll::Done(Ok(())) => Step::Stay(PhaseWork::PollingColocation),
                OpPoll::Done(Err(err)) => Step::Fail(
                    FailureKind::Service,
                    format!("Failed to establish colocation group: {err:#}"),
                ),
                OpPoll::Lost => self.lost_step(),
            },
            PhaseWork::PollingColocation => match self.services.colocation.colocation_status() {
                ServiceStatus::Pending => Step::Stay(PhaseWork::PollingColocation),
                ServiceStatus::Complete if self.services.colocation.is_aligned() => {
                    Step::Next(ALIGNED_PROGRESS)
                }
                ServiceStatus::Complete => {
                    // The host defines the shared frame's origin at its own position.
                    let colocation = self.services.colocation.clone();
                    Step::Stay(PhaseWork::RegisteringOrigin(PendingOp::spawn(async move {
                        colocation.register_origin_calibration(Pose::origin()).await
                    })))
                }
                ServiceStatus::Failed(message) => {
                    Step::Fail(FailureKind::Service, format!("Colocation failed: {message}"))
                }
            },
            PhaseWork::RegisteringOrigin(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::RegisteringOrigin(op)),
                OpPoll::Done(Ok(())) => Step::Next(ALIGNED_PROGRESS),
                OpPoll::Done(Err(err)) => Step::Fail(
                    FailureKind::Service,
                    format!("Failed to register shared origin: {err:#}"),
                ),
                OpPoll::Lost => self.lost_step(),
            },
            PhaseWork::PublishingMesh(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::PublishingMesh(op)),
                OpPoll::Done(Ok(())) => Step::Stay(PhaseWork::PollingShare),
                OpPoll::Done(Err(err)) => {
                    Step::Degrade(format!("Room mesh publish failed: {err:#}"))
                }
                OpPoll::Lost => Step::Degrade("Room mesh publish was interrupted".into()),
            },
            PhaseWork::PollingShare => match self.services.mesh.share_status() {
                ServiceStatus::Pending => Step::Stay(PhaseWork::PollingShare),
                ServiceStatus::Complete => Step::Next(MESH_SETTLED_PROGRESS),
                ServiceStatus::Failed(message) => {
                    Step::Degrade(format!("Room mesh sharing failed: {message}"))
                }
            },
            PhaseWork::PollingAnchor => match self.services.colocation.group_id() {
                Some(group_id) => {
                    info!(%group_id, "shared anchor group discovered");
                    Step::Next(ANCHOR_FOUND_PROGRESS)
                }
                None => Step::Stay(PhaseWork::PollingAnchor),
            },
            PhaseWork::PollingAlignment => match self.services.colocation.alignment_status() {
                ServiceStatus::Pending => Step::Stay(PhaseWork::PollingAlignment),
                ServiceStatus::Complete => Step::Next(ALIGNED_PROGRESS),
                ServiceStatus::Failed(message) => Step::Fail(
                    FailureKind::Service,
                    format!("Anchor alignment failed: {message}"),
                ),
            },
            PhaseWork::LoadingSharedMesh(mut op) => match op.poll() {
                OpPoll::Pending => Step::Stay(PhaseWork::LoadingSharedMesh(op)),
                OpPoll::Done(Ok(())) => Step::Stay(PhaseWork::PollingMeshLoad),
                OpPoll::Done(Err(err)) => {
                    Step::Degrade(format!("Room mesh load failed: {err:#}"))
                }
                OpPoll::Lost => Step::Degrade("Room mesh load was interrupted".into()),
            },
            PhaseWork::PollingMeshLoad => match self.services.mesh.load_status() {
                ServiceStatus::Pending => Step::Stay(PhaseWork::PollingMeshLoad),
                ServiceStatus::Complete => Step::Next(MESH_SETTLED_PROGRESS),
                ServiceStatus::Failed(message) => {
                    Step::Degrade(format!("Room mesh loading failed: {message}"))
                }
            },
        }
    }

    fn apply_step(&mut self, step: Step, now: Instant) {
        match step {
            Step::Stay(work) => self.work = work,
            Step::Prompt(work, status) => {
                self.work = work;
                self.set_status(status);
            }
            Step::Next(target) => {
                self.process.advance_progress(target);
                self.advance(now);
            }
            Step::SkipTo(phase, target) => {
                debug!(from = %self.process.phase, to = %phase, "skipping ahead");
                self.process.advance_progress(target);
                self.enter_phase(phase, now);
            }
            Step::Connected(handle) => {
                let target = if self.process.phase == Phase::CreatingSession {
                    SESSION_CREATED_PROGRESS
                } else {
                    JOINED_PROGRESS
                };
                self.process.selected_session_name = Some(handle.name.clone());
                self.process.active_session = Some(handle);
                self.process.advance_progress(target);
                self.advance(now);
            }
            Step::Fail(kind, message) => self.fail(kind, message, now),
            Step::Degrade(message) => self.degrade(message, now),
        }
    }

    fn scan_prompt_step(&self) -> Step {
        if self.config.auto_prompt_room_scan {
            Step::Prompt(
                PhaseWork::RequestingScan(self.spawn_request_scan()),
                SCANNING_STATUS.into(),
            )
        } else {
            Step::Prompt(PhaseWork::AwaitingManualScan, MANUAL_SCAN_PROMPT.into())
        }
    }

    fn spawn_request_scan(&self) -> PendingOp<Result<()>> {
        let room_scan = self.services.room_scan.clone();
        PendingOp::spawn(async move { room_scan.request_scan().await })
    }

    fn lost_step(&self) -> Step {
        Step::Fail(
            FailureKind::Service,
            format!("{} was interrupted", self.process.phase),
        )
    }

    fn session_failure_message(&self, err: &SessionError) -> String {
        match self.process.phase {
            Phase::JoiningSession => match &self.process.selected_session_name {
                Some(name) => format!("Failed to join session {name}: {err}"),
                None => format!("Failed to join session: {err}"),
            },
            _ => format!("Failed to create session: {err}"),
        }
    }

    /// Moves to the next phase of the role's sequence, skipping mesh phases when room sharing is
    /// disabled.
    fn advance(&mut self, now: Instant) {
        let Some(role) = self.process.role else {
            let message = format!("{} finished without a resolved role", self.process.phase);
            self.fail(FailureKind::Service, message, now);
            return;
        };

        let mut next = role.next_phase(self.process.phase);
        while let Some(phase) = next {
            if !(phase.degrades_on_failure() && !self.config.enable_room_sharing) {
                break;
            }
            debug!(phase = %phase, "room sharing disabled; skipping phase");
            self.process.advance_progress(MESH_SETTLED_PROGRESS);
            next = role.next_phase(phase);
        }

        match next {
            Some(Phase::Ready) => self.complete_startup(now),
            Some(phase) => self.enter_phase(phase, now),
            None => warn!(phase = %self.process.phase, role = %role, "no phase follows"),
        }
    }

    fn check_deadline(&mut self, now: Instant) {
        let phase = self.process.phase;
        let Some(deadline) = self.policy.deadline_for(phase) else {
            return;
        };

        let elapsed = now.saturating_duration_since(self.process.phase_entered_at);
        if elapsed < deadline {
            let bucket = elapsed.as_secs() / WAIT_LOG_INTERVAL_SECS;
            if bucket > self.wait_log_bucket {
                self.wait_log_bucket = bucket;
                info!(
                    phase = %phase,
                    elapsed_secs = elapsed.as_secs(),
                    timeout_secs = deadline.as_secs(),
                    "still waiting on startup phase"
                );
            }
            return;
        }

        let message = self.policy.timeout_message(phase);
        if phase.degrades_on_failure() {
            self.degrade(message, now);
        } else {
            self.fail(FailureKind::Timeout, message, now);
        }
    }

    fn fail(&mut self, kind: FailureKind, message: String, now: Instant) {
        let phase = self.process.phase;
        error!(phase = %phase, ?kind, message = %message, "startup phase failed");

        self.work = PhaseWork::Idle;
        self.process.error_message = Some(message.clone());
        self.process.failed_phase = Some(phase);
        self.process.phase = Phase::Error;
        self.process.phase_entered_at = now;
        self.process.status_message = format!("Error: {message}");
        self.emit_state_changed();
        let _ = self
            .events
            .send(StartupEvent::Error(PhaseFailure::new(phase, kind, message)));
    }

    fn degrade(&mut self, message: String, now: Instant) {
        let phase = self.process.phase;
        warn!(phase = %phase, message = %message, "room mesh step degraded; using local collision fallback");

        self.work = PhaseWork::Idle;
        self.services.mesh.enable_local_fallback();
        self.process.degraded = true;
        let _ = self.events.send(StartupEvent::Degraded { phase, message });
        self.process.advance_progress(MESH_SETTLED_PROGRESS);
        self.advance(now);
    }

    fn complete_startup(&mut self, now: Instant) {
        let from = self.process.phase;
        self.work = PhaseWork::Idle;
        self.process.phase = Phase::Ready;
        self.process.phase_entered_at = now;
        self.process.advance_progress(1.0);
        self.process.status_message = self.entry_status(Phase::Ready);
        self.process.is_startup_complete = true;
        info!(
            from = %from,
            role = ?self.process.role,
            session = ?self.process.selected_session_name.as_ref().map(|n| n.as_str()),
            degraded = self.process.degraded,
            "startup complete"
        );
        self.emit_state_changed();
        let _ = self.events.send(StartupEvent::Ready);
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.process.status_message = status.into();
        self.emit_state_changed();
    }

    fn emit_state_changed(&mut self) {
        self.process.awaiting_manual_scan = matches!(self.work, PhaseWork::AwaitingManualScan);
        let _ = self.events.send(StartupEvent::StateChanged {
            phase: self.process.phase,
            status_message: self.process.status_message.clone(),
            progress: self.process.progress,
            role: self.process.role,
            awaiting_manual_scan: self.process.awaiting_manual_scan,
        });
        self.snapshot_tx.send_replace(self.process.snapshot());
    }
}

/// Handle to an orchestrator running on its own task.
pub struct StartupHandle {
    intents: mpsc::Sender<StartupIntent>,
    events: broadcast::Sender<StartupEvent>,
    snapshot: watch::Receiver<StartupSnapshot>,
    task: JoinHandle<()>,
}

impl StartupHandle {
    pub fn intents(&self) -> mpsc::Sender<StartupIntent> {
        self.intents.clone()
    }

    pub async fn send(&self, intent: StartupIntent) -> Result<()> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| anyhow!("startup driver has stopped"))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StartupEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<StartupSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> StartupSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Closes this handle's intent sender and waits for the driver to stop. Other senders obtained
    /// through [`Self::intents`] must be dropped as well.
    pub async fn shutdown(self) -> Result<()> {
        let Self { intents, task, .. } = self;
        drop(intents);
        task.await
            .map_err(|err| anyhow!("startup driver task failed: {err}"))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
