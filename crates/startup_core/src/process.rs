use session_transport::SessionHandle;
use shared::{
    domain::{Phase, Role, SessionName},
    protocol::StartupSnapshot,
};
use tokio::time::Instant;

/// Mutable state of one orchestrator. The orchestrator is its only writer.
#[derive(Debug, Clone)]
pub(crate) struct SessionProcess {
    pub phase: Phase,
    pub role: Option<Role>,
    pub is_role_resolved: bool,
    pub selected_session_name: Option<SessionName>,
    pub active_session: Option<SessionHandle>,
    pub adopted_session: bool,
    pub progress: f32,
    pub status_message: String,
    pub error_message: Option<String>,
    pub failed_phase: Option<Phase>,
    pub awaiting_manual_scan: bool,
    pub phase_entered_at: Instant,
    pub attempt: u32,
    pub degraded: bool,
    pub is_startup_complete: bool,
}

impl SessionProcess {
    pub fn new(now: Instant) -> Self {
        Self {
            phase: Phase::Initializing,
            role: None,
            is_role_resolved: false,
            selected_session_name: None,
            active_session: None,
            adopted_session: false,
            progress: 0.0,
            status_message: "Initializing...".into(),
            error_message: None,
            failed_phase: None,
            awaiting_manual_scan: false,
            phase_entered_at: now,
            attempt: 1,
            degraded: false,
            is_startup_complete: false,
        }
    }

    /// Moves progress toward `target`, never backwards.
    pub fn advance_progress(&mut self, target: f32) {
        self.progress = self.progress.max(target.clamp(0.0, 1.0));
    }

    /// Clears everything tied to the abandoned attempt and returns the new attempt number.
    pub fn begin_new_attempt(&mut self) -> u32 {
        self.role = None;
        self.is_role_resolved = false;
        self.selected_session_name = None;
        self.active_session = None;
        self.adopted_session = false;
        self.progress = 0.0;
        self.error_message = None;
        self.failed_phase = None;
        self.awaiting_manual_scan = false;
        self.degraded = false;
        self.is_startup_complete = false;
        self.attempt += 1;
        self.attempt
    }

    pub fn snapshot(&self) -> StartupSnapshot {
        StartupSnapshot {
            phase: self.phase,
            role: self.role,
            is_role_resolved: self.is_role_resolved,
            selected_session_name: self.selected_session_name.clone(),
            progress: self.progress,
            status_message: self.status_message.clone(),
            error_message: self.error_message.clone(),
            failed_phase: self.failed_phase,
            awaiting_manual_scan: self.awaiting_manual_scan,
            is_startup_complete: self.is_startup_complete,
            attempt: self.attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_moves_backwards() {
        let mut process = SessionProcess::new(Instant::now());
        process.advance_progress(0.4);
        process.advance_progress(0.25);
        assert_eq!(process.progress, 0.4);
        process.advance_progress(7.0);
        assert_eq!(process.progress, 1.0);
    }

    #[test]
    fn new_attempt_clears_role_and_progress() {
        let mut process = SessionProcess::new(Instant::now());
        process.role = Some(Role::Joiner);
        process.is_role_resolved = true;
        process.progress = 0.6;
        process.error_message = Some("Anchor discovery timed out".into());

        assert_eq!(process.begin_new_attempt(), 2);
        let snapshot = process.snapshot();
        assert_eq!(snapshot.role, None);
        assert!(!snapshot.is_role_resolved);
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(snapshot.error_message, None);
        assert_eq!(snapshot.attempt, 2);
    }
}
