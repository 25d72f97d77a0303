use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use placed::config::{BackoffConfig, EngineConfig};
use placed::controlplane::{ControlPlane, InMemoryControlPlane};
use placed::dashboard::{run_dashboard, DashboardState};
use placed::engine::{AssignmentEngine, WorkQueue};
use placed::intake::EventIntake;
use placed::mirror::NodeMirror;
use placed::model::Node;
use placed::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "placed")]
#[command(version)]
#[command(about = "An event-driven placement engine with a pluggable selection policy")]
struct Args {
    /// Engine identity; only work units requesting this name are placed
    #[arg(long, default_value = "random-placer")]
    engine_name: String,

    /// Intake queue capacity (producers block when full)
    #[arg(long, default_value = "300")]
    queue_capacity: usize,

    /// Seconds between full node re-lists
    #[arg(long, default_value = "300")]
    resync_interval_secs: u64,

    /// First resubscription backoff delay, in milliseconds
    #[arg(long, default_value = "500")]
    backoff_first_ms: u64,

    /// Resubscription backoff ceiling, in milliseconds
    #[arg(long, default_value = "30000")]
    backoff_max_ms: u64,

    /// Nodes registered at startup (comma-separated names)
    #[arg(long, default_value = "")]
    seed_nodes: String,

    /// Address for the dashboard / admin API (e.g. 127.0.0.1:8080)
    #[arg(long)]
    dashboard_addr: Option<SocketAddr>,
}

fn parse_seed_nodes(nodes_str: &str) -> Vec<Node> {
    nodes_str
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Node::new)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = EngineConfig::new(args.engine_name.clone())
        .with_queue_capacity(args.queue_capacity)
        .with_resync_interval(Duration::from_secs(args.resync_interval_secs))
        .with_backoff(BackoffConfig {
            first: Duration::from_millis(args.backoff_first_ms),
            max: Duration::from_millis(args.backoff_max_ms),
            factor: 2.0,
        });

    let cancel = install_shutdown_handler();
    let startup_failed = Arc::new(AtomicBool::new(false));

    let control_plane = Arc::new(InMemoryControlPlane::new());
    let seed_nodes = parse_seed_nodes(&args.seed_nodes);
    for node in seed_nodes {
        tracing::info!(node = %node.name, "registering seed node");
        control_plane.add_node(node).await;
    }

    let remote: Arc<dyn ControlPlane> = control_plane.clone();
    let mirror = NodeMirror::new();

    // Node mirror subscription
    {
        let mirror = mirror.clone();
        let remote = remote.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        let failed = startup_failed.clone();
        tokio::spawn(async move {
            if let Err(err) = mirror.sync(remote, config, cancel.clone()).await {
                tracing::error!(error = %err, "node mirror terminated");
                failed.store(true, Ordering::SeqCst);
                cancel.cancel();
            }
        });
    }

    // Work unit intake subscription
    let (queue_tx, queue_rx) = WorkQueue::bounded(config.queue_capacity);
    {
        let intake = EventIntake::new(remote.clone(), &config, queue_tx);
        let cancel = cancel.clone();
        let failed = startup_failed.clone();
        tokio::spawn(async move {
            if let Err(err) = intake.run(cancel.clone()).await {
                tracing::error!(error = %err, "event intake terminated");
                failed.store(true, Ordering::SeqCst);
                cancel.cancel();
            }
        });
    }

    let engine = AssignmentEngine::new(remote, mirror.clone(), &config);

    if let Some(addr) = args.dashboard_addr {
        let state = DashboardState {
            control_plane: control_plane.clone(),
            mirror: mirror.clone(),
            stats: engine.stats(),
            engine_name: config.engine_name.clone(),
        };
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_dashboard(addr, state, cancel).await;
        });
    }

    tracing::info!(
        engine = %config.engine_name,
        queue_capacity = config.queue_capacity,
        "placement engine started"
    );

    // The assignment loop blocks the main task until shutdown.
    engine.run(queue_rx, cancel.clone()).await;

    if startup_failed.load(Ordering::SeqCst) {
        return Err("failed to establish control plane subscriptions".into());
    }
    Ok(())
}
