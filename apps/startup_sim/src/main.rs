mod participant;
mod simulated;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use presentation::ViewOptions;
use session_transport::{CreateSessionRequest, InMemorySessionRegistry, NetworkSessionService};
use shared::domain::{Phase, SessionName};
use startup_core::{load_settings, SessionDiscovery, Settings, StartupOrchestrator, StartupServices};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use participant::{Choice, Outcome, Output, Participant};
use simulated::{
    FailurePlan, SimulatedColocation, SimulatedMeshSharing, SimulatedRoomScan, SimulatedSpace,
    SimulatedTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SimRole {
    Host,
    Join,
    Both,
}

#[derive(Parser, Debug)]
#[command(about = "Runs the multi-party startup flow against simulated spatial services")]
struct Args {
    #[arg(long, value_enum, default_value_t = SimRole::Both)]
    role: SimRole,
    /// Session name the host creates and the joiner looks for. Generated when omitted.
    #[arg(long)]
    session: Option<String>,
    /// TOML settings file; `startup.toml` is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Make the service behind this phase misbehave until the first retry, e.g.
    /// `--fail waiting_for_anchor`. Repeatable.
    #[arg(long = "fail", value_parser = parse_phase)]
    fail: Vec<Phase>,
    #[arg(long, default_value_t = 1)]
    retries: u32,
    /// The host starts without a scanned room.
    #[arg(long)]
    no_room: bool,
    /// Print events as JSON lines instead of text.
    #[arg(long)]
    json: bool,
    #[arg(long, default_value_t = 600)]
    max_secs: u64,
}

fn parse_phase(raw: &str) -> Result<Phase, String> {
    Phase::from_label(raw).ok_or_else(|| format!("unknown phase `{raw}`"))
}

struct World {
    settings: Settings,
    registry: Arc<InMemorySessionRegistry>,
    transport: Arc<dyn NetworkSessionService>,
    space: Arc<SimulatedSpace>,
    failures: Arc<FailurePlan>,
}

impl World {
    fn discovery(&self) -> Arc<SessionDiscovery> {
        Arc::new(SessionDiscovery::new(
            self.transport.clone(),
            self.settings.discovery.clone(),
        ))
    }

    fn orchestrator(&self, is_host: bool, existing_room: bool) -> StartupOrchestrator {
        let services = StartupServices::new(self.discovery())
            .with_room_scan(Arc::new(SimulatedRoomScan::new(
                self.space.clone(),
                existing_room,
            )))
            .with_colocation(Arc::new(SimulatedColocation::new(
                self.space.clone(),
                is_host,
            )))
            .with_mesh_sharing(Arc::new(SimulatedMeshSharing::new(self.space.clone())));
        StartupOrchestrator::new(self.settings.flow.clone(), services)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = load_settings(args.config.as_deref())?;
    let session_name = args
        .session
        .as_deref()
        .map(SessionName::new)
        .transpose()
        .context("invalid --session")?;
    let failures = Arc::new(FailurePlan::new(args.fail.iter().copied()));
    let registry = Arc::new(InMemorySessionRegistry::new());
    let world = World {
        transport: Arc::new(SimulatedTransport::new(registry.clone(), failures.clone())),
        space: Arc::new(SimulatedSpace::new(failures.clone())),
        registry,
        failures,
        settings,
    };
    let output = if args.json {
        Output::Json
    } else {
        Output::Text
    };
    let view_options = ViewOptions::default();
    let make_participant = |label, orchestrator, choice| Participant {
        label,
        orchestrator,
        choice,
        failures: world.failures.clone(),
        retries: args.retries,
        output,
        view_options,
    };

    let refresher = spawn_list_refresher(
        world.registry.clone(),
        world.settings.discovery.refresh_interval(),
    );

    let mut participants = Vec::new();
    if matches!(args.role, SimRole::Join | SimRole::Both) {
        let choice = match args.role {
            SimRole::Join => Choice::Join(seed_remote_host(&world, session_name.clone()).await?),
            _ => Choice::Discover {
                // Subscribe before the host starts so its first listing is not missed.
                updates: world.discovery().discoverable_sessions(),
                stale_after: world.settings.discovery.stale_after(),
                wanted: session_name.clone(),
            },
        };
        participants.push(make_participant("joiner", world.orchestrator(false, false), choice));
    }
    if matches!(args.role, SimRole::Host | SimRole::Both) {
        let mut orchestrator = world.orchestrator(true, !args.no_room);
        if let Some(name) = &session_name {
            orchestrator = orchestrator.with_host_session_name(name.clone());
        }
        participants.push(make_participant("host", orchestrator, Choice::Host));
    }

    let deadline = Duration::from_secs(args.max_secs);
    let runs = participants.into_iter().map(|participant| async move {
        let label = participant.label;
        tokio::time::timeout(deadline, participant::run(participant))
            .await
            .with_context(|| format!("{label}: startup did not finish in {}s", deadline.as_secs()))?
    });
    let results = futures::future::join_all(runs).await;
    refresher.abort();

    let mut failed = 0usize;
    for result in results {
        match result {
            Ok(outcome) => report(&outcome, output)?,
            Err(err) => {
                failed += 1;
                eprintln!("{err:#}");
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} participant(s) did not reach ready");
    }
    Ok(())
}

/// Re-announces the session list every refresh interval, as a matchmaking service would.
fn spawn_list_refresher(registry: Arc<InMemorySessionRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            registry.publish_session_list().await;
        }
    })
}

/// Join-only runs have no local host, so one is faked in the registry and the shared space.
async fn seed_remote_host(world: &World, name: Option<SessionName>) -> Result<SessionName> {
    let name = match name {
        Some(name) => name,
        None => world.discovery().generate_session_name()?,
    };
    world
        .registry
        .create_session(
            CreateSessionRequest::new(name.clone(), world.settings.discovery.max_players)
                .with_host_label("Remote host"),
        )
        .await
        .context("failed to seed remote host session")?;
    let group = world.space.seed_remote_host();
    if !world.registry.set_colocation_group(&name, group).await {
        warn!(session = %name, "seeded session vanished before its group was set");
    }
    info!(session = %name, group_id = %group, "seeded remote host");
    Ok(name)
}

fn report(outcome: &Outcome, output: Output) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string(outcome)?),
        Output::Text => {
            let snapshot = &outcome.snapshot;
            println!(
                "{:>6} finished: role={} session={} attempt={} degraded={}",
                outcome.participant,
                snapshot
                    .role
                    .map(|role| role.to_string())
                    .unwrap_or_else(|| "none".into()),
                snapshot
                    .selected_session_name
                    .as_ref()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "none".into()),
                snapshot.attempt,
                outcome.degraded,
            );
        }
    }
    Ok(())
}
