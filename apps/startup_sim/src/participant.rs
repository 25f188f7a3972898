//! Drives one simulated participant the way a UI would: watch events, pick a role, retry on error.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::{stream::BoxStream, StreamExt};
use presentation::{
    dispatch_intent, orchestration, DispatchStatus, SessionListMirror, StartupView, ViewOptions,
};
use serde::Serialize;
use shared::{
    domain::{DiscoveredSession, Phase, SessionName},
    protocol::{StartupEvent, StartupIntent, StartupSnapshot},
};
use startup_core::StartupOrchestrator;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::simulated::FailurePlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

pub enum Choice {
    Host,
    Join(SessionName),
    /// Join the first joinable session the discovery list shows, or `wanted` once it appears.
    Discover {
        updates: BoxStream<'static, Vec<DiscoveredSession>>,
        stale_after: Duration,
        wanted: Option<SessionName>,
    },
}

pub struct Participant {
    pub label: &'static str,
    pub orchestrator: StartupOrchestrator,
    pub choice: Choice,
    pub failures: Arc<FailurePlan>,
    pub retries: u32,
    pub output: Output,
    pub view_options: ViewOptions,
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub participant: &'static str,
    pub snapshot: StartupSnapshot,
    pub degraded: bool,
}

#[derive(Serialize)]
struct EventLine<'a> {
    participant: &'a str,
    event: &'a StartupEvent,
}

pub async fn run(participant: Participant) -> Result<Outcome> {
    let Participant {
        label,
        orchestrator,
        choice,
        failures,
        retries,
        output,
        view_options,
    } = participant;

    let mut events = orchestrator.subscribe_events();
    let handle = orchestrator.spawn();
    let intents = handle.intents();
    let mut view = StartupView::new(view_options);
    let mut choice = Some(choice);
    let mut retries_left = retries;
    let mut status = String::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(participant = label, skipped, "event subscriber lagged");
                continue;
            }
            Err(RecvError::Closed) => bail!("{label}: startup driver stopped before ready"),
        };
        view.apply(&event, Utc::now());
        emit(output, label, &event, &view)?;

        match &event {
            StartupEvent::StateChanged {
                phase: Phase::RoleSelection,
                ..
            } => {
                let Some(choice) = choice.take() else {
                    continue;
                };
                let intent = choose(label, choice).await?;
                if dispatch_intent(&intents, intent, &mut status) != DispatchStatus::Queued {
                    bail!("{label}: {status}");
                }
            }
            StartupEvent::Error(failure) => {
                if retries_left == 0 {
                    drop(intents);
                    handle.shutdown().await?;
                    bail!(
                        "{label}: startup failed in {}: {}",
                        failure.phase,
                        failure.message
                    );
                }
                retries_left -= 1;
                failures.disarm_all();
                info!(participant = label, phase = %failure.phase, retries_left, "retrying failed phase");
                if orchestration::retry(&intents, &view, &mut status) != DispatchStatus::Queued {
                    bail!("{label}: could not retry: {status}");
                }
            }
            StartupEvent::Ready => break,
            StartupEvent::StateChanged { .. } if view.show_manual_scan() => {
                info!(participant = label, "starting the room scan from the prompt");
                let dispatched = orchestration::request_manual_scan(&intents, &view, &mut status);
                if dispatched != DispatchStatus::Queued {
                    bail!("{label}: could not start the room scan: {status}");
                }
            }
            StartupEvent::StateChanged { .. } | StartupEvent::Degraded { .. } => {}
        }
    }

    // Keep the modal up for its hide delay, as the headset UI does.
    tokio::time::sleep(view_options.modal_hide_delay).await;
    view.tick(Utc::now());

    let snapshot = handle.snapshot();
    drop(intents);
    handle.shutdown().await?;
    Ok(Outcome {
        participant: label,
        snapshot,
        degraded: view.degraded_notice().is_some(),
    })
}

async fn choose(label: &str, choice: Choice) -> Result<StartupIntent> {
    let session_name = match choice {
        Choice::Host => return Ok(StartupIntent::ChooseHost),
        Choice::Join(name) => name,
        Choice::Discover {
            updates,
            stale_after,
            wanted,
        } => pick_session(updates, stale_after, wanted.as_ref())
            .await
            .with_context(|| format!("{label}: no session to join"))?,
    };
    info!(participant = label, session = %session_name, "joining session");
    Ok(StartupIntent::ChooseJoin { session_name })
}

async fn pick_session(
    mut updates: BoxStream<'static, Vec<DiscoveredSession>>,
    stale_after: Duration,
    wanted: Option<&SessionName>,
) -> Result<SessionName> {
    let mut mirror = SessionListMirror::new(stale_after);
    while let Some(update) = updates.next().await {
        mirror.apply_update(update, Utc::now());
        let picked = mirror
            .joinable()
            .find(|session| wanted.map_or(true, |wanted| &session.name == wanted))
            .map(|session| session.name.clone());
        if let Some(name) = picked {
            mirror.select(&name);
        }
        if let Some(session) = mirror.selected() {
            info!(
                session = %session.name,
                players = session.current_player_count,
                max_players = session.max_players,
                "picked session from the discovery list"
            );
            return Ok(session.name.clone());
        }
    }
    bail!("session list closed")
}

fn emit(output: Output, label: &str, event: &StartupEvent, view: &StartupView) -> Result<()> {
    match output {
        Output::Json => {
            let line = EventLine {
                participant: label,
                event,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
        Output::Text => match event {
            StartupEvent::StateChanged { .. } => println!("{label:>6} {}", view.summary_line()),
            StartupEvent::Error(_) => {
                if let Some(error) = view.error() {
                    println!(
                        "{label:>6} {}: {} ({})",
                        error.headline(),
                        error.message(),
                        error.retry_hint()
                    );
                }
            }
            StartupEvent::Degraded { .. } => {
                if let Some(notice) = view.degraded_notice() {
                    println!("{label:>6} {notice}");
                }
            }
            StartupEvent::Ready => println!("{label:>6} ready"),
        },
    }
    Ok(())
}
