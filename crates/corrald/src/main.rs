//! corrald — the Corral orchestrator daemon.
//!
//! Hosts the scheduler core behind a REST intent API plus the agent
//! heartbeat endpoint, and drives the two timer loops (placement and
//! terminated-group GC).
//!
//! # Usage
//!
//! ```text
//! corrald serve --listen 127.0.0.1:7100 --data-dir /var/lib/corral
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use corral_core::SchedulerConfig;
use corral_scheduler::{Scheduler, TickOutcome};
use corral_state::MetaStore;

use corrald::api::{build_router, ApiState};

#[derive(Parser)]
#[command(name = "corrald", about = "Corral orchestrator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:7100")]
        listen: SocketAddr,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/corral")]
        data_dir: PathBuf,

        /// Placement tick interval in milliseconds (one agent per tick).
        #[arg(long, default_value = "500")]
        sched_interval_ms: u64,

        /// Terminated-group GC sweep interval in seconds.
        #[arg(long, default_value = "5")]
        gc_interval_secs: u64,

        /// Fraction of reported live usage reserved against best-effort
        /// admission.
        #[arg(long, default_value = "0.8")]
        reserved_percent: f64,

        /// Maximum batch-priority containers per agent.
        #[arg(long, default_value = "50")]
        max_batch_pods: i32,

        /// Disable stale-version detection (no rolling updates).
        #[arg(long)]
        no_version_check: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            listen,
            data_dir,
            sched_interval_ms,
            gc_interval_secs,
            reserved_percent,
            max_batch_pods,
            no_version_check,
        } => {
            let config = SchedulerConfig {
                sched_interval: Duration::from_millis(sched_interval_ms),
                gc_check_interval: Duration::from_secs(gc_interval_secs),
                reserved_percent,
                max_batch_pods,
                check_container_version: !no_version_check,
            };
            serve(listen, data_dir, config).await
        }
    }
}

async fn serve(listen: SocketAddr, data_dir: PathBuf, config: SchedulerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let store = MetaStore::open(&data_dir.join("meta.redb"))?;
    let sched = Arc::new(Scheduler::new(config));

    // Replay persisted groups before the loops start placing.
    let metas = store.list_groups()?;
    for meta in &metas {
        sched.reload(meta);
    }
    info!(groups = metas.len(), "state reloaded");
    sched.start();

    tokio::spawn(run_placement_loop(Arc::clone(&sched)));
    tokio::spawn(run_gc_loop(Arc::clone(&sched), store.clone()));

    let router = build_router(ApiState {
        sched,
        store,
    });
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "corrald listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Visit agents one per tick in endpoint order; frozen agents and the
/// wrap back to the first agent advance without the tick delay.
async fn run_placement_loop(sched: Arc<Scheduler>) {
    let interval = sched.config().sched_interval;
    let mut cursor = String::new();
    loop {
        match sched.schedule_next_agent(&cursor) {
            TickOutcome::Visited(endpoint) => {
                cursor = endpoint;
                tokio::time::sleep(interval).await;
            }
            TickOutcome::Skipped(endpoint) => {
                cursor = endpoint;
                tokio::task::yield_now().await;
            }
            TickOutcome::Wrapped => {
                cursor.clear();
                tokio::task::yield_now().await;
            }
            TickOutcome::Idle => {
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Collect fully-terminated groups and drop their persisted metadata.
async fn run_gc_loop(sched: Arc<Scheduler>, store: MetaStore) {
    let interval = sched.config().gc_check_interval;
    loop {
        tokio::time::sleep(interval).await;
        for group_id in sched.gc_sweep() {
            if let Err(e) = store.delete_group(&group_id) {
                warn!(group = %group_id, error = %e, "failed to delete group meta");
            }
        }
    }
}
