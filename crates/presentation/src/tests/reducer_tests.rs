use chrono::TimeDelta;
use shared::error::{FailureKind, PhaseFailure};

use super::*;
use crate::{events::ErrorCategory, steps::StepState};

fn state(phase: Phase, progress: f32, role: Option<Role>, status: &str) -> StartupEvent {
    StartupEvent::StateChanged {
        phase,
        status_message: status.to_string(),
        progress,
        role,
        awaiting_manual_scan: false,
    }
}

fn scan_prompt(role: Role) -> StartupEvent {
    StartupEvent::StateChanged {
        phase: Phase::PromptingRoomScan,
        status_message: "Room scan required. Please scan your room.".to_string(),
        progress: 0.1,
        role: Some(role),
        awaiting_manual_scan: true,
    }
}

#[test]
fn error_shows_message_and_retry() {
    let now = Utc::now();
    let mut view = StartupView::new(ViewOptions::default());
    view.apply(
        &state(Phase::JoiningSession, 0.1, Some(Role::Joiner), "Joining Game_AB12..."),
        now,
    );
    view.apply(
        &state(Phase::WaitingForAnchor, 0.25, Some(Role::Joiner), "Looking..."),
        now,
    );
    assert!(!view.show_retry());

    let message = "Anchor discovery timed out after 60s";
    view.apply(
        &state(
            Phase::Error,
            0.25,
            Some(Role::Joiner),
            &format!("Error: {message}"),
        ),
        now,
    );
    view.apply(
        &StartupEvent::Error(PhaseFailure::new(
            Phase::WaitingForAnchor,
            FailureKind::Timeout,
            message,
        )),
        now,
    );

    assert!(view.show_retry());
    assert_eq!(view.display_message(), message);
    assert_eq!(
        view.error().map(|error| error.category()),
        Some(ErrorCategory::Timeout)
    );
    assert_eq!(view.steps().steps()[1].state, StepState::Error);

    view.apply(
        &state(Phase::WaitingForAnchor, 0.25, Some(Role::Joiner), "Looking..."),
        now,
    );
    assert!(!view.show_retry());
    assert!(view.error().is_none());
    assert_eq!(view.steps().steps()[1].state, StepState::InProgress);
}

#[test]
fn modal_hides_after_ready_delay() {
    let now = Utc::now();
    let mut view = StartupView::new(ViewOptions::default());
    view.apply(&state(Phase::Ready, 1.0, Some(Role::Host), "Ready!"), now);
    view.apply(&StartupEvent::Ready, now);

    assert!(view.is_modal_visible());
    assert!(!view.tick(now + TimeDelta::milliseconds(999)));
    assert!(view.is_modal_visible());
    assert!(view.tick(now + TimeDelta::seconds(1)));
    assert!(!view.is_modal_visible());
    assert!(!view.tick(now + TimeDelta::seconds(2)));
}

#[test]
fn manual_scan_button_only_while_prompt_waits() {
    let now = Utc::now();

    let mut host = StartupView::new(ViewOptions::default());
    host.apply(
        &state(Phase::PromptingRoomScan, 0.1, Some(Role::Host), "Loading room scan..."),
        now,
    );
    assert!(!host.show_manual_scan());

    host.apply(&scan_prompt(Role::Host), now);
    assert!(host.show_manual_scan());

    // The orchestrator reports the scan as started; the button goes away.
    host.apply(
        &state(Phase::PromptingRoomScan, 0.1, Some(Role::Host), "Scanning room..."),
        now,
    );
    assert!(!host.show_manual_scan());

    let mut joiner = StartupView::new(ViewOptions::default());
    joiner.apply(&scan_prompt(Role::Joiner), now);
    assert!(!joiner.show_manual_scan());
}

#[test]
fn prompt_timeout_hides_manual_scan() {
    let now = Utc::now();
    let mut view = StartupView::new(ViewOptions::default());
    view.apply(&scan_prompt(Role::Host), now);
    view.apply(
        &StartupEvent::Error(PhaseFailure::new(
            Phase::PromptingRoomScan,
            FailureKind::Timeout,
            "Room scan timed out after 30s",
        )),
        now,
    );

    assert!(!view.show_manual_scan());
    assert!(view.show_retry());
}

#[test]
fn cancel_back_to_role_selection_resets_view() {
    let now = Utc::now();
    let mut view = StartupView::new(ViewOptions::default());
    view.apply(
        &state(Phase::LoadingRoomMesh, 0.6, Some(Role::Joiner), "Loading..."),
        now,
    );
    view.apply(
        &StartupEvent::Degraded {
            phase: Phase::LoadingRoomMesh,
            message: "Room mesh load timed out".into(),
        },
        now,
    );
    assert!(view.degraded_notice().is_some());
    assert!(view.show_cancel());

    view.apply(&state(Phase::RoleSelection, 0.0, None, "Host or join"), now);
    assert!(view.show_role_selection());
    assert!(view.steps().steps().is_empty());
    assert!(view.degraded_notice().is_none());
    assert!(!view.show_cancel());
}

#[test]
fn attaching_to_failed_snapshot_shows_error() {
    let snapshot = StartupSnapshot {
        phase: Phase::Error,
        role: Some(Role::Host),
        is_role_resolved: true,
        progress: 0.25,
        status_message: "Error: Failed to create session: session transport error: offline".into(),
        error_message: Some("Failed to create session: session transport error: offline".into()),
        failed_phase: Some(Phase::CreatingSession),
        ..StartupSnapshot::default()
    };

    let view = StartupView::from_snapshot(ViewOptions::default(), &snapshot);
    assert!(view.show_retry());
    assert_eq!(
        view.error().map(|error| error.category()),
        Some(ErrorCategory::Network)
    );
    assert_eq!(view.steps().steps()[1].state, StepState::Error);
    assert_eq!(
        view.summary_line(),
        "[ 25%] error: Failed to create session: session transport error: offline"
    );
}
