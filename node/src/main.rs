mod config;

use std::{io, net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};
use comms::{scenario::Catalog, specs::TrainSpec};
use environment::{Environment, Substrate};
use leader::{Leader, LeaderConfig, LeaderErr};
use log::{error, info};
use policy::{Policy, ReturnsPolicy, ShadowPolicy};
use tokio::{
    net::{TcpListener, TcpStream},
    signal,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;
use worker::{Actor, ActorConfig};

use crate::config::ClusterSpec;

/// Which half of the cluster this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    /// The parameter server.
    Coordinator,
    /// One episode-producing worker.
    Actor,
}

/// Training algorithm behind the policy seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    /// Imitation toward the shadow expert; episodes carry no rewards.
    Shadow,
    /// Trajectory-return driven; episodes must carry rewards.
    Returns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SubstrateArg {
    Emulated,
    Udp,
}

#[derive(Debug, Parser)]
#[command(about = "Distributed congestion-control policy training")]
struct Args {
    /// Comma-separated host:port list of parameter servers.
    #[arg(long)]
    ps_hosts: String,

    /// Comma-separated host:port list of workers.
    #[arg(long)]
    worker_hosts: String,

    /// Which role this process plays.
    #[arg(long, value_enum)]
    role: Role,

    /// Index of this task within its role's host list.
    #[arg(long)]
    task_index: usize,

    /// Path to the JSON scenario catalog shared by every process.
    #[arg(long)]
    catalog: PathBuf,

    /// Optional JSON training spec; defaults apply when omitted.
    #[arg(long)]
    spec: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Algorithm::Shadow)]
    algorithm: Algorithm,

    /// Network substrate under the channel.
    #[arg(long, value_enum, default_value_t = SubstrateArg::Emulated)]
    substrate: SubstrateArg,

    /// Where the coordinator persists final parameters.
    #[arg(long, default_value = "saved_models")]
    save_dir: PathBuf,

    /// Learning rate handed to the policy.
    #[arg(long, default_value_t = 0.01)]
    lr: f32,
}

fn build_policy(algorithm: Algorithm, lr: f32) -> Box<dyn Policy> {
    match algorithm {
        Algorithm::Shadow => Box::new(ShadowPolicy::new(lr)),
        Algorithm::Returns => Box::new(ReturnsPolicy::new(lr)),
    }
}

/// A returns run needs rewards on the wire; fill in the default weights if
/// the spec file left them out.
fn reconcile_reward(spec: &mut TrainSpec, algorithm: Algorithm) {
    if algorithm == Algorithm::Returns && spec.reward.is_none() {
        spec.reward = Some(Default::default());
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Configuration problems surface here, before any socket opens.
    let cluster = ClusterSpec::parse(&args.ps_hosts, &args.worker_hosts)?;
    let catalog = config::load_catalog(&args.catalog)?;
    let mut spec = config::load_spec(args.spec.as_deref())?;
    reconcile_reward(&mut spec, args.algorithm);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    match args.role {
        Role::Coordinator => run_coordinator(args, cluster, catalog, spec, cancel).await,
        Role::Actor => run_actor(args, cluster, catalog, spec, cancel).await,
    }
}

async fn run_coordinator(
    args: Args,
    cluster: ClusterSpec,
    catalog: Catalog,
    spec: TrainSpec,
    cancel: CancellationToken,
) -> io::Result<()> {
    config::check_task_index(args.task_index, 1)?;

    let cfg = LeaderConfig {
        workers: cluster.worker_count(),
        catalog,
        spec,
        save_dir: args.save_dir,
    };
    let mut leader = Leader::new(cfg, build_policy(args.algorithm, args.lr));

    let listener = TcpListener::bind(cluster.leader).await?;
    info!("coordinator listening on {}", cluster.leader);
    info!("expecting workers at {:?}", cluster.workers);

    for _ in 0..cluster.worker_count().get() {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("cancelled before every worker connected");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let (stream, peer) = accepted;
        info!("worker connected from {peer}");

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        leader.spawn(rx, tx);
    }

    // Registration is closed; no further connections are taken.
    drop(listener);

    match leader.run(&cancel).await {
        Ok(params) => {
            info!(version = params.version; "run complete");
            Ok(())
        }
        Err(LeaderErr::Cancelled) => {
            info!("run cancelled; mid-batch state was not persisted");
            Ok(())
        }
        Err(err) => {
            error!("coordinator failed: {err}");
            Err(err.into())
        }
    }
}

async fn run_actor(
    args: Args,
    cluster: ClusterSpec,
    catalog: Catalog,
    spec: TrainSpec,
    cancel: CancellationToken,
) -> io::Result<()> {
    config::check_task_index(args.task_index, cluster.worker_count().get())?;

    let substrate = match args.substrate {
        SubstrateArg::Emulated => Substrate::Emulated,
        SubstrateArg::Udp => Substrate::Udp,
    };
    let env = Environment::new(substrate, spec.channel.clone(), spec.reward);
    let cfg = ActorConfig {
        worker: args.task_index,
        workers: cluster.worker_count(),
        catalog,
        spec,
    };
    let actor = Actor::new(cfg, build_policy(args.algorithm, args.lr), env);

    let stream = connect_with_backoff(cluster.leader, &cancel).await?;
    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);

    match actor.run(rx, tx, &cancel).await {
        Ok(metrics) => {
            info!(
                episodes = metrics.episodes_run,
                discarded = metrics.episodes_discarded,
                last_version = metrics.last_version;
                "worker done"
            );
            Ok(())
        }
        Err(err) => {
            error!("worker failed: {err}");
            Err(err.into())
        }
    }
}

/// The leader may come up after us; retry for a while before giving up.
async fn connect_with_backoff(
    addr: SocketAddr,
    cancel: &CancellationToken,
) -> io::Result<TcpStream> {
    const ATTEMPTS: u32 = 30;

    let mut wait = Duration::from_millis(200);
    for attempt in 1..=ATTEMPTS {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(io::Error::other("cancelled before connecting"));
            }
            connected = TcpStream::connect(addr) => connected,
        };

        match connected {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < ATTEMPTS => {
                info!(attempt = attempt; "leader not reachable yet: {err}");
                sleep(wait).await;
                wait = (wait * 2).min(Duration::from_secs(3));
            }
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::other("leader unreachable"))
}
