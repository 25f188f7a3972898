//! Intent dispatch from UI actions to the orchestrator's intent queue.

use shared::{domain::SessionName, protocol::StartupIntent};
use tokio::sync::mpsc::{error::TrySendError, Sender};

use crate::{reducer::StartupView, session_list::SessionListMirror};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Queued,
    QueueFull,
    Disconnected,
    /// The view already knows the intent would be ignored.
    NotOffered,
}

/// Queues `intent` without blocking the UI loop. Failures are written to `status` for display.
pub fn dispatch_intent(
    intent_tx: &Sender<StartupIntent>,
    intent: StartupIntent,
    status: &mut String,
) -> DispatchStatus {
    let intent_name = intent.name();
    match intent_tx.try_send(intent) {
        Ok(()) => {
            tracing::debug!(intent = intent_name, "queued ui->startup intent");
            DispatchStatus::Queued
        }
        Err(TrySendError::Full(_)) => {
            *status = "Startup is busy; please try again".to_string();
            DispatchStatus::QueueFull
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!(intent = intent_name, "startup driver is gone; intent dropped");
            *status = "Startup stopped unexpectedly; restart the app".to_string();
            DispatchStatus::Disconnected
        }
    }
}

/// Joins a session picked from the mirrored list. Entries that are full or already pruned are
/// not offered.
pub fn join_listed_session(
    intent_tx: &Sender<StartupIntent>,
    sessions: &SessionListMirror,
    session_name: &SessionName,
    status: &mut String,
) -> DispatchStatus {
    match sessions.get(session_name) {
        Some(session) if !session.is_full() => dispatch_intent(
            intent_tx,
            StartupIntent::ChooseJoin {
                session_name: session_name.clone(),
            },
            status,
        ),
        Some(_) => {
            *status = format!("{session_name} is full");
            DispatchStatus::NotOffered
        }
        None => {
            *status = format!("{session_name} is no longer available");
            DispatchStatus::NotOffered
        }
    }
}

pub fn retry(
    intent_tx: &Sender<StartupIntent>,
    view: &StartupView,
    status: &mut String,
) -> DispatchStatus {
    if !view.show_retry() {
        return DispatchStatus::NotOffered;
    }
    dispatch_intent(intent_tx, StartupIntent::Retry, status)
}

pub fn request_manual_scan(
    intent_tx: &Sender<StartupIntent>,
    view: &StartupView,
    status: &mut String,
) -> DispatchStatus {
    if !view.show_manual_scan() {
        return DispatchStatus::NotOffered;
    }
    dispatch_intent(intent_tx, StartupIntent::RequestManualScan, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::domain::DiscoveredSession;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn name(raw: &str) -> SessionName {
        SessionName::new(raw).expect("session name")
    }

    #[test]
    fn full_queue_reports_busy() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut status = String::new();

        assert_eq!(
            dispatch_intent(&tx, StartupIntent::ChooseHost, &mut status),
            DispatchStatus::Queued
        );
        assert_eq!(
            dispatch_intent(&tx, StartupIntent::Retry, &mut status),
            DispatchStatus::QueueFull
        );
        assert_eq!(status, "Startup is busy; please try again");
        assert_eq!(rx.try_recv().ok(), Some(StartupIntent::ChooseHost));
    }

    #[test]
    fn closed_queue_reports_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut status = String::new();

        assert_eq!(
            dispatch_intent(&tx, StartupIntent::Cancel, &mut status),
            DispatchStatus::Disconnected
        );
        assert!(status.contains("restart"));
    }

    #[test]
    fn manual_scan_is_offered_only_at_the_prompt() {
        use crate::reducer::ViewOptions;
        use shared::{
            domain::{Phase, Role},
            protocol::StartupEvent,
        };

        let (tx, mut rx) = mpsc::channel(4);
        let mut view = StartupView::new(ViewOptions::default());
        let mut status = String::new();
        assert_eq!(
            request_manual_scan(&tx, &view, &mut status),
            DispatchStatus::NotOffered
        );

        view.apply(
            &StartupEvent::StateChanged {
                phase: Phase::PromptingRoomScan,
                status_message: "Room scan required. Please scan your room.".into(),
                progress: 0.1,
                role: Some(Role::Host),
                awaiting_manual_scan: true,
            },
            Utc::now(),
        );
        assert_eq!(
            request_manual_scan(&tx, &view, &mut status),
            DispatchStatus::Queued
        );
        assert_eq!(rx.try_recv().ok(), Some(StartupIntent::RequestManualScan));
    }

    #[test]
    fn full_sessions_are_not_joined() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sessions = SessionListMirror::new(Duration::from_secs(4));
        let now = Utc::now();
        sessions.apply_update(
            vec![
                DiscoveredSession {
                    name: name("ShootingGame_FULL"),
                    host_label: "Host".into(),
                    current_player_count: 8,
                    max_players: 8,
                    colocation_group_id: None,
                    last_seen_at: now,
                },
                DiscoveredSession {
                    name: name("ShootingGame_OPEN"),
                    host_label: "Host".into(),
                    current_player_count: 1,
                    max_players: 8,
                    colocation_group_id: None,
                    last_seen_at: now,
                },
            ],
            now,
        );
        let mut status = String::new();

        assert_eq!(
            join_listed_session(&tx, &sessions, &name("ShootingGame_FULL"), &mut status),
            DispatchStatus::NotOffered
        );
        assert_eq!(
            join_listed_session(&tx, &sessions, &name("ShootingGame_GONE"), &mut status),
            DispatchStatus::NotOffered
        );
        assert_eq!(
            join_listed_session(&tx, &sessions, &name("ShootingGame_OPEN"), &mut status),
            DispatchStatus::Queued
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(StartupIntent::ChooseJoin {
                session_name: name("ShootingGame_OPEN")
            })
        );
    }
}
