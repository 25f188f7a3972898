//! Reducer folding orchestrator events into the startup modal's view model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    domain::{Phase, Role},
    protocol::{StartupEvent, StartupSnapshot},
};

use crate::{events::PresentationError, steps::StepIndicators};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    /// How long the modal stays up after `Ready`.
    pub modal_hide_delay: Duration,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            modal_hide_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartupView {
    options: ViewOptions,
    phase: Phase,
    role: Option<Role>,
    status_message: String,
    progress: f32,
    error: Option<PresentationError>,
    failed_phase: Option<Phase>,
    awaiting_manual_scan: bool,
    degraded_notice: Option<String>,
    steps: StepIndicators,
    ready_at: Option<DateTime<Utc>>,
    modal_visible: bool,
}

impl StartupView {
    pub fn new(options: ViewOptions) -> Self {
        let snapshot = StartupSnapshot::default();
        Self::from_snapshot(options, &snapshot)
    }

    /// Builds a view from a snapshot, e.g. when the UI attaches to a running orchestrator.
    pub fn from_snapshot(options: ViewOptions, snapshot: &StartupSnapshot) -> Self {
        let mut steps = snapshot
            .role
            .map(StepIndicators::for_role)
            .unwrap_or_default();
        steps.update(snapshot.phase, snapshot.failed_phase);

        Self {
            options,
            phase: snapshot.phase,
            role: snapshot.role,
            status_message: snapshot.status_message.clone(),
            progress: snapshot.progress,
            error: snapshot
                .error_message
                .as_ref()
                .filter(|_| snapshot.phase == Phase::Error)
                .map(|message| PresentationError::from_message(snapshot.failed_phase, message)),
            failed_phase: snapshot.failed_phase,
            awaiting_manual_scan: snapshot.awaiting_manual_scan,
            degraded_notice: None,
            steps,
            ready_at: None,
            modal_visible: !snapshot.is_startup_complete,
        }
    }

    pub fn apply(&mut self, event: &StartupEvent, now: DateTime<Utc>) {
        match event {
            StartupEvent::StateChanged {
                phase,
                status_message,
                progress,
                role,
                awaiting_manual_scan,
            } => {
                if *role != self.role {
                    self.steps = role.map(StepIndicators::for_role).unwrap_or_default();
                }
                if *phase != Phase::Error {
                    self.error = None;
                    self.failed_phase = None;
                }
                if *phase == Phase::RoleSelection {
                    self.degraded_notice = None;
                    self.ready_at = None;
                    self.modal_visible = true;
                }
                self.phase = *phase;
                self.role = *role;
                self.status_message = status_message.clone();
                self.progress = *progress;
                self.awaiting_manual_scan = *awaiting_manual_scan;
                self.steps.update(self.phase, self.failed_phase);
                if self.phase == Phase::Ready {
                    self.ready_at.get_or_insert(now);
                }
            }
            StartupEvent::Error(failure) => {
                self.phase = Phase::Error;
                self.awaiting_manual_scan = false;
                self.failed_phase = Some(failure.phase);
                self.error = Some(PresentationError::from_failure(failure));
                self.steps.update(Phase::Error, self.failed_phase);
            }
            StartupEvent::Degraded { phase, message } => {
                tracing::debug!(phase = %phase, "showing degraded room notice");
                self.degraded_notice = Some(format!(
                    "Playing without the shared room: {message}"
                ));
            }
            StartupEvent::Ready => {
                self.progress = 1.0;
                self.ready_at.get_or_insert(now);
            }
        }
    }

    /// Hides the modal once the post-ready delay has passed. Returns true when it changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let Some(ready_at) = self.ready_at else {
            return false;
        };
        if !self.modal_visible {
            return false;
        }
        let shown_for = now.signed_duration_since(ready_at).to_std().unwrap_or_default();
        if shown_for >= self.options.modal_hide_delay {
            self.modal_visible = false;
            return true;
        }
        false
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn error(&self) -> Option<&PresentationError> {
        self.error.as_ref()
    }

    pub fn degraded_notice(&self) -> Option<&str> {
        self.degraded_notice.as_deref()
    }

    pub fn steps(&self) -> &StepIndicators {
        &self.steps
    }

    pub fn is_modal_visible(&self) -> bool {
        self.modal_visible
    }

    pub fn show_role_selection(&self) -> bool {
        self.phase == Phase::RoleSelection
    }

    pub fn show_retry(&self) -> bool {
        self.phase == Phase::Error
    }

    /// Only while the host's prompt is waiting on the user; hidden again once the scan starts.
    pub fn show_manual_scan(&self) -> bool {
        self.role == Some(Role::Host)
            && self.phase == Phase::PromptingRoomScan
            && self.awaiting_manual_scan
    }

    pub fn show_cancel(&self) -> bool {
        self.role.is_some() && self.phase != Phase::Ready
    }

    /// The latest error while in `Error`, otherwise the status message.
    pub fn display_message(&self) -> &str {
        match (&self.phase, &self.error) {
            (Phase::Error, Some(error)) => error.message(),
            _ => &self.status_message,
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "[{:>3.0}%] {}: {}",
            self.progress * 100.0,
            self.phase,
            self.display_message()
        )
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
