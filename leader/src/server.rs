//! The parameter server: registration, batch barrier, update, broadcast.

use std::{borrow::Cow, collections::HashMap, io, num::NonZeroUsize, path::PathBuf, sync::Arc};

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg},
    scenario::Catalog,
    specs::{StallSpec, TrainSpec},
    trajectory::Episode,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use policy::{ModelParameters, Policy};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, watch},
    task::JoinSet,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{LeaderErr, LeaderMetrics, Phase, Result, barrier::BatchBarrier, persist};

/// How often a stalled batch leaves a diagnostic mark.
const STALL_DIAG_PERIOD: Duration = Duration::from_secs(1);

/// How long connection teardown may take after a completed run.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Static configuration of one leader process.
pub struct LeaderConfig {
    pub workers: NonZeroUsize,
    pub catalog: Catalog,
    pub spec: TrainSpec,
    pub save_dir: PathBuf,
}

impl LeaderConfig {
    /// Episodes each worker owes per batch.
    ///
    /// Derived from the same catalog partition every worker computes
    /// locally, so no negotiation message is needed.
    fn expected_counts(&self) -> Vec<usize> {
        let per_scenario = self.spec.run.episodes_per_scenario.get();

        self.catalog
            .partition(self.workers)
            .iter()
            .map(|a| a.len() * per_scenario)
            .collect()
    }
}

/// What the connection readers feed into the leader loop.
enum Event {
    Registered {
        worker: usize,
    },
    Submitted {
        worker: usize,
        batch: u64,
        episodes: Vec<Episode>,
    },
    Acked {
        worker: usize,
        version: u64,
    },
    Disconnected {
        worker: Option<usize>,
    },
}

/// What the leader loop pushes out through the connection writers.
#[derive(Clone)]
enum Broadcast {
    Idle,
    Params(Arc<ModelParameters>),
    Shutdown,
}

/// The central server structure: owns the canonical policy and the barrier.
pub struct Leader {
    cfg: LeaderConfig,
    policy: Box<dyn Policy>,
    conns: JoinSet<io::Result<()>>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    bcast_tx: watch::Sender<Broadcast>,
    metrics: Arc<Mutex<LeaderMetrics>>,
}

impl Leader {
    pub fn new(cfg: LeaderConfig, policy: Box<dyn Policy>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(cfg.workers.get().max(16) * 4);
        let (bcast_tx, _) = watch::channel(Broadcast::Idle);

        Self {
            cfg,
            policy,
            conns: JoinSet::new(),
            events_tx,
            events_rx,
            bcast_tx,
            metrics: Arc::default(),
        }
    }

    /// Handle to the observable counters, shared with the run.
    pub fn metrics(&self) -> Arc<Mutex<LeaderMetrics>> {
        self.metrics.clone()
    }

    /// Binds one worker connection to this leader.
    ///
    /// The connection splits into a reader task feeding the event inbox and
    /// a writer task following the broadcast channel, so a frame read never
    /// races a broadcast write.
    pub fn spawn<R, W>(&mut self, mut rx: FrameReceiver<R>, mut tx: FrameSender<W>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let events = self.events_tx.clone();
        self.conns.spawn(async move {
            let mut worker = None;

            loop {
                let msg: Msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(err) => {
                        let _ = events.send(Event::Disconnected { worker }).await;

                        return match err.kind() {
                            io::ErrorKind::UnexpectedEof => Ok(()),
                            _ => Err(err),
                        };
                    }
                };

                let event = match msg {
                    Msg::Control(Command::Register { worker: id }) => {
                        worker = Some(id);
                        Event::Registered { worker: id }
                    }
                    Msg::Control(Command::Submit {
                        worker,
                        batch,
                        episodes,
                    }) => Event::Submitted {
                        worker,
                        batch,
                        episodes,
                    },
                    Msg::Control(Command::Ack { worker, version }) => {
                        Event::Acked { worker, version }
                    }
                    msg => {
                        warn!("ignoring unexpected message: {msg:?}");
                        continue;
                    }
                };

                if events.send(event).await.is_err() {
                    // The leader loop is gone; nothing left to feed.
                    return Ok(());
                }
            }
        });

        let mut bcast = self.bcast_tx.subscribe();
        self.conns.spawn(async move {
            loop {
                if bcast.changed().await.is_err() {
                    return Ok(());
                }

                let update = bcast.borrow_and_update().clone();
                match update {
                    Broadcast::Idle => {}
                    Broadcast::Params(params) => {
                        let msg = Msg::Params {
                            version: params.version,
                            blob: Cow::Borrowed(&params.blob),
                        };
                        tx.send(&msg).await?;
                    }
                    Broadcast::Shutdown => {
                        tx.send(&Msg::Control(Command::Shutdown)).await?;
                        return Ok(());
                    }
                }
            }
        });
    }

    /// Runs the configured number of batches, persists the final
    /// parameters and tears the connections down.
    ///
    /// On cancellation no parameters are persisted and the transport is
    /// released immediately.
    pub async fn run(self, cancel: &CancellationToken) -> Result<ModelParameters> {
        let Leader {
            cfg,
            policy,
            mut conns,
            events_tx,
            events_rx,
            bcast_tx,
            metrics,
        } = self;

        // Only the reader tasks may keep the event inbox open from now on.
        drop(events_tx);

        let mut driver = Driver {
            expected: cfg.expected_counts(),
            live: vec![true; cfg.workers.get()],
            pending: HashMap::new(),
            events: events_rx,
            bcast: bcast_tx,
            policy,
            metrics,
            spec: cfg.spec.clone(),
        };

        let outcome = driver.drive(cancel).await;

        match &outcome {
            Ok(params) => {
                let path = persist::save_params(&cfg.save_dir, params)?;
                info!("persisted final parameters to {}", path.display());

                let _ = driver.bcast.send(Broadcast::Shutdown);
                let drain = async {
                    while let Some(joined) = conns.join_next().await {
                        if let Ok(Err(err)) = joined {
                            debug!("connection closed with error: {err}");
                        }
                    }
                };
                if time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
                    conns.shutdown().await;
                }
            }
            Err(err) => {
                info!("run ended early ({err}); releasing transport without persisting");
                conns.shutdown().await;
            }
        }

        driver.set_phase(Phase::Shutdown);
        outcome
    }
}

/// The single-owner leader loop state, after `run` takes the `Leader` apart.
struct Driver {
    expected: Vec<usize>,
    live: Vec<bool>,
    pending: HashMap<u64, Vec<(usize, Vec<Episode>)>>,
    events: mpsc::Receiver<Event>,
    bcast: watch::Sender<Broadcast>,
    policy: Box<dyn Policy>,
    metrics: Arc<Mutex<LeaderMetrics>>,
    spec: TrainSpec,
}

impl Driver {
    fn set_phase(&self, phase: Phase) {
        self.metrics.lock().phase = phase;
        debug!("leader phase: {phase:?}");
    }

    async fn next_event(&mut self, cancel: &CancellationToken) -> Result<Event> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LeaderErr::Cancelled),
            event = self.events.recv() => event.ok_or(LeaderErr::WorkersGone),
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<ModelParameters> {
        self.register_all(cancel).await?;

        let mut params = Arc::new(self.policy.snapshot());
        self.broadcast(params.clone(), cancel).await?;

        let max_batches = self.spec.run.max_batches;
        for batch in 1..=max_batches {
            info!(batch = batch, max_batches = max_batches; "opening batch");

            let episodes = self.collect(batch, cancel).await?;

            self.set_phase(Phase::Aggregating);
            debug!(batch = batch, episodes = episodes.len(); "batch complete");

            self.set_phase(Phase::Updating);
            params = Arc::new(self.policy.update(&episodes)?);
            info!(version = params.version; "policy updated");

            self.broadcast(params.clone(), cancel).await?;
            self.metrics.lock().batches_completed += 1;
        }

        Ok(ModelParameters::clone(&params))
    }

    async fn register_all(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut registered = vec![false; self.live.len()];
        info!(workers = registered.len(); "waiting for worker registration");

        while registered.iter().any(|done| !done) {
            match self.next_event(cancel).await? {
                Event::Registered { worker } if worker < registered.len() => {
                    if registered[worker] {
                        warn!(worker = worker; "duplicate registration");
                    }
                    registered[worker] = true;
                    info!(worker = worker; "worker registered");
                }
                Event::Registered { worker } => {
                    warn!(worker = worker; "registration outside the configured worker range");
                }
                Event::Disconnected { worker } => {
                    warn!("connection lost during registration: {worker:?}");
                }
                _ => warn!("ignoring event from an unregistered connection"),
            }
        }

        Ok(())
    }

    /// Holds the barrier open until every live worker has delivered its
    /// expected episode count for `batch`.
    async fn collect(&mut self, batch: u64, cancel: &CancellationToken) -> Result<Vec<Episode>> {
        self.set_phase(Phase::WaitingForBatch);

        let mut barrier = BatchBarrier::new(&self.expected, &self.live);
        let mut episodes = Vec::new();

        for (worker, buffered) in self.pending.remove(&batch).unwrap_or_default() {
            if barrier.note(worker, buffered.len()) {
                episodes.extend(buffered);
            } else {
                self.metrics.lock().rejected_submissions += 1;
            }
        }

        let opened = Instant::now();
        let mut diag = time::interval_at(Instant::now() + STALL_DIAG_PERIOD, STALL_DIAG_PERIOD);
        diag.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !barrier.is_complete() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(LeaderErr::Cancelled),

                _ = diag.tick() => self.on_stall_tick(&mut barrier, batch, opened),

                event = self.events.recv() => match event.ok_or(LeaderErr::WorkersGone)? {
                    Event::Submitted { worker, batch: tagged, episodes: submitted } => {
                        self.accept(&mut barrier, batch, worker, tagged, submitted, &mut episodes);
                    }
                    Event::Acked { worker, version } => {
                        debug!(worker = worker, version = version; "late acknowledgement");
                    }
                    Event::Registered { worker } => warn!(worker = worker; "unexpected re-registration"),
                    Event::Disconnected { worker } => {
                        warn!("worker connection lost mid-batch: {worker:?}");
                    }
                },
            }
        }

        // Withdrawals stick for the rest of the run.
        self.live.copy_from_slice(barrier.live());
        Ok(episodes)
    }

    /// Routes one submission: counted for the open batch, parked for a
    /// future one, rejected for a closed one.
    fn accept(
        &mut self,
        barrier: &mut BatchBarrier,
        current: u64,
        worker: usize,
        tagged: u64,
        submitted: Vec<Episode>,
        sink: &mut Vec<Episode>,
    ) {
        if tagged == current {
            if barrier.note(worker, submitted.len()) {
                debug!(worker = worker, batch = tagged, episodes = submitted.len(); "submission accepted");
                sink.extend(submitted);
            } else {
                warn!(worker = worker, batch = tagged; "submission from an unknown or withdrawn worker");
                self.metrics.lock().rejected_submissions += 1;
            }
        } else if tagged > current {
            debug!(worker = worker, batch = tagged; "buffering early submission");
            self.metrics.lock().buffered_submissions += 1;
            self.pending.entry(tagged).or_default().push((worker, submitted));
        } else {
            warn!(worker = worker, batch = tagged; "rejecting submission for a closed batch");
            self.metrics.lock().rejected_submissions += 1;
        }
    }

    fn on_stall_tick(&mut self, barrier: &mut BatchBarrier, batch: u64, opened: Instant) {
        let missing = barrier.missing();
        if missing.is_empty() {
            return;
        }

        let overdue = match self.spec.run.stall {
            StallSpec::Withdraw { deadline_ms } => {
                opened.elapsed() >= Duration::from_millis(deadline_ms)
            }
            StallSpec::Block => false,
        };

        if overdue {
            let dropped = barrier.withdraw_missing();
            self.metrics.lock().workers_withdrawn += dropped.len() as u64;
            warn!(batch = batch; "withdrawing overdue workers {dropped:?}");
        } else {
            self.metrics.lock().stalled_ticks += 1;
            warn!(batch = batch; "batch stalled waiting for workers {missing:?}");
        }
    }

    /// Pushes `params` to every connection and waits for the live workers
    /// to acknowledge, up to the configured timeout.
    async fn broadcast(
        &mut self,
        params: Arc<ModelParameters>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.set_phase(Phase::Broadcasting);

        if self.bcast.send(Broadcast::Params(params.clone())).is_err() {
            return Err(LeaderErr::WorkersGone);
        }
        info!(version = params.version; "broadcasting parameters");

        // Withdrawn workers owe no acknowledgement.
        let mut acked: Vec<bool> = self.live.iter().map(|live| !live).collect();
        let deadline = time::sleep(self.spec.run.ack_timeout());
        tokio::pin!(deadline);

        while acked.iter().any(|done| !done) {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(LeaderErr::Cancelled),

                _ = &mut deadline => {
                    let missing: Vec<usize> = acked
                        .iter()
                        .enumerate()
                        .filter(|(_, done)| !**done)
                        .map(|(worker, _)| worker)
                        .collect();

                    self.metrics.lock().ack_timeouts += 1;
                    warn!(
                        version = params.version;
                        "broadcast unacknowledged by workers {missing:?} within the timeout"
                    );
                    break;
                }

                event = self.events.recv() => match event.ok_or(LeaderErr::WorkersGone)? {
                    Event::Acked { worker, version }
                        if version == params.version && worker < acked.len() =>
                    {
                        debug!(worker = worker, version = version; "broadcast acknowledged");
                        acked[worker] = true;
                    }
                    Event::Acked { worker, version } => {
                        debug!(worker = worker, version = version; "stale acknowledgement");
                    }
                    Event::Submitted { worker, batch, episodes } => {
                        // A fast worker racing ahead of the slow acks.
                        debug!(worker = worker, batch = batch; "buffering early submission");
                        self.metrics.lock().buffered_submissions += 1;
                        self.pending.entry(batch).or_default().push((worker, episodes));
                    }
                    Event::Registered { worker } => warn!(worker = worker; "unexpected re-registration"),
                    Event::Disconnected { worker } => {
                        warn!("worker connection lost during broadcast: {worker:?}");
                    }
                },
            }
        }

        Ok(())
    }
}
