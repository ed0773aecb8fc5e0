use std::{fs, io, num::NonZeroUsize, path::PathBuf, time::Duration};

use tokio::io as tokio_io;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use comms::msg::{Command, Msg};
use comms::scenario::{Catalog, Scenario};
use comms::specs::{RunSpec, StallSpec, TrainSpec};
use comms::trajectory::{Action, Episode, StateVector, Step};
use comms::{FrameReceiver, FrameSender};
use leader::{Leader, LeaderConfig, LeaderErr, load_params};
use policy::ShadowPolicy;

fn catalog(len: usize) -> Catalog {
    Catalog::new(
        (0..len)
            .map(|i| Scenario {
                topology: i as u32,
                traffic: 0,
            })
            .collect(),
    )
}

fn spec(max_batches: u64, stall: StallSpec, ack_timeout_ms: u64) -> TrainSpec {
    TrainSpec {
        run: RunSpec {
            max_batches,
            episodes_per_scenario: NonZeroUsize::new(1).unwrap(),
            ack_timeout_ms,
            stall,
        },
        ..TrainSpec::default()
    }
}

fn episode() -> Episode {
    Episode {
        scenario: Scenario {
            topology: 0,
            traffic: 0,
        },
        steps: vec![Step {
            state: StateVector {
                srtt_ms: 40.0,
                queue_delay_ms: 2.0,
                delivery_pps: 80.0,
                send_pps: 90.0,
                loss_rate: 0.1,
                cwnd: 8.0,
            },
            action: Action(2),
            reward: None,
        }],
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("leader-test-{tag}-{}", std::process::id()))
}

type WorkerSide = (
    FrameReceiver<tokio_io::ReadHalf<tokio_io::DuplexStream>>,
    FrameSender<tokio_io::WriteHalf<tokio_io::DuplexStream>>,
);

/// Wires one in-memory connection into the leader and hands back the
/// worker-side channel halves.
fn connect(leader: &mut Leader) -> WorkerSide {
    let (leader_stream, worker_stream) = tokio_io::duplex(1 << 16);

    let (rx, tx) = tokio_io::split(leader_stream);
    let (rx, tx) = comms::channel(rx, tx);
    leader.spawn(rx, tx);

    let (rx, tx) = tokio_io::split(worker_stream);
    comms::channel(rx, tx)
}

async fn recv_params<R: tokio_io::AsyncRead + Unpin>(rx: &mut FrameReceiver<R>) -> io::Result<u64> {
    match rx.recv::<Msg>().await? {
        Msg::Params { version, .. } => Ok(version),
        other => panic!("expected params, got {other:?}"),
    }
}

async fn handshake(worker: usize, side: &mut WorkerSide) -> io::Result<u64> {
    let (rx, tx) = side;

    tx.send(&Msg::Control(Command::Register { worker })).await?;
    let version = recv_params(rx).await?;
    tx.send(&Msg::Control(Command::Ack { worker, version })).await?;
    Ok(version)
}

async fn scripted_worker(mut side: WorkerSide, worker: usize, owed: usize, batches: u64) -> io::Result<u64> {
    let mut version = handshake(worker, &mut side).await?;
    assert_eq!(version, 0);

    let (rx, tx) = &mut side;
    for batch in 1..=batches {
        tx.send(&Msg::Control(Command::Submit {
            worker,
            batch,
            episodes: vec![episode(); owed],
        }))
        .await?;

        let next = recv_params(rx).await?;
        assert_eq!(next, version + 1);
        version = next;
        tx.send(&Msg::Control(Command::Ack { worker, version })).await?;
    }

    match rx.recv::<Msg>().await? {
        Msg::Control(Command::Shutdown) => Ok(version),
        other => panic!("expected shutdown, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_cycle_reaches_final_version() -> io::Result<()> {
    const BATCHES: u64 = 2;

    let save_dir = scratch_dir("full-cycle");
    let cfg = LeaderConfig {
        workers: NonZeroUsize::new(2).unwrap(),
        catalog: catalog(3),
        spec: spec(BATCHES, StallSpec::Block, 5_000),
        save_dir: save_dir.clone(),
    };

    let mut leader = Leader::new(cfg, Box::new(ShadowPolicy::new(0.01)));
    let metrics = leader.metrics();

    // Catalog of 3 over 2 workers: worker 0 owes 1 episode, worker 1 owes 2.
    let side0 = connect(&mut leader);
    let side1 = connect(&mut leader);

    let cancel = CancellationToken::new();
    let leader_task = tokio::spawn(async move { leader.run(&cancel).await });

    let w0 = tokio::spawn(scripted_worker(side0, 0, 1, BATCHES));
    let w1 = tokio::spawn(scripted_worker(side1, 1, 2, BATCHES));

    assert_eq!(w0.await.unwrap()?, BATCHES);
    assert_eq!(w1.await.unwrap()?, BATCHES);

    let params = leader_task.await.unwrap().map_err(io::Error::from)?;
    assert_eq!(params.version, BATCHES);
    assert_eq!(metrics.lock().batches_completed, BATCHES);

    let persisted = load_params(&save_dir.join(format!("params-v{BATCHES}.bin")))?;
    assert_eq!(persisted, params);

    fs::remove_dir_all(&save_dir)?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_worker_stalls_the_batch() -> io::Result<()> {
    let save_dir = scratch_dir("stall");
    let cfg = LeaderConfig {
        workers: NonZeroUsize::new(2).unwrap(),
        catalog: catalog(2),
        spec: spec(1, StallSpec::Block, 1_000),
        save_dir: save_dir.clone(),
    };

    let mut leader = Leader::new(cfg, Box::new(ShadowPolicy::new(0.01)));
    let metrics = leader.metrics();

    let mut side0 = connect(&mut leader);
    let mut side1 = connect(&mut leader);

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let leader_task = tokio::spawn(async move { leader.run(&run_cancel).await });

    handshake(0, &mut side0).await?;
    handshake(1, &mut side1).await?;

    // Worker 0 delivers; worker 1 never does.
    side0
        .1
        .send(&Msg::Control(Command::Submit {
            worker: 0,
            batch: 1,
            episodes: vec![episode()],
        }))
        .await?;

    // The full barrier holds: no parameter broadcast may arrive.
    let starved = timeout(Duration::from_millis(2_500), recv_params(&mut side0.0)).await;
    assert!(starved.is_err(), "leader broadcast despite an open barrier");

    // The stall is observable while the leader still waits for the batch.
    assert!(metrics.lock().stalled_ticks >= 1);
    assert_eq!(metrics.lock().phase, leader::Phase::WaitingForBatch);

    cancel.cancel();
    let outcome = leader_task.await.unwrap();
    assert!(matches!(outcome, Err(LeaderErr::Cancelled)));

    // Nothing was persisted mid-batch.
    assert!(!save_dir.exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn withdraw_policy_finishes_without_the_straggler() -> io::Result<()> {
    let save_dir = scratch_dir("withdraw");
    let cfg = LeaderConfig {
        workers: NonZeroUsize::new(2).unwrap(),
        catalog: catalog(2),
        spec: spec(1, StallSpec::Withdraw { deadline_ms: 500 }, 2_000),
        save_dir: save_dir.clone(),
    };

    let mut leader = Leader::new(cfg, Box::new(ShadowPolicy::new(0.01)));
    let metrics = leader.metrics();

    let mut side0 = connect(&mut leader);
    let mut side1 = connect(&mut leader);

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let leader_task = tokio::spawn(async move { leader.run(&run_cancel).await });

    handshake(0, &mut side0).await?;
    handshake(1, &mut side1).await?;

    side0
        .1
        .send(&Msg::Control(Command::Submit {
            worker: 0,
            batch: 1,
            episodes: vec![episode()],
        }))
        .await?;

    // The straggler gets withdrawn at the deadline and the batch proceeds.
    let version = timeout(Duration::from_secs(10), recv_params(&mut side0.0))
        .await
        .expect("withdraw policy must unblock the batch")?;
    assert_eq!(version, 1);

    side0
        .1
        .send(&Msg::Control(Command::Ack { worker: 0, version }))
        .await?;

    match side0.0.recv::<Msg>().await? {
        Msg::Control(Command::Shutdown) => {}
        other => panic!("expected shutdown, got {other:?}"),
    }

    // The straggler outlived its withdrawal; let its connection go so the
    // leader's teardown drains promptly.
    drop(side1);

    let params = leader_task.await.unwrap().map_err(io::Error::from)?;
    assert_eq!(params.version, 1);
    assert_eq!(metrics.lock().workers_withdrawn, 1);

    fs::remove_dir_all(&save_dir)?;
    Ok(())
}
