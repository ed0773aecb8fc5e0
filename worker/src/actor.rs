//! The actor loop: episodes out, parameter broadcasts in.

use comms::{
    FrameReceiver, FrameSender, scenario::Scenario, specs::TransportSpec, trajectory::Episode,
};
use environment::{EnvErr, Environment};
use log::{debug, error, info, warn};
use policy::Policy;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{ActorConfig, ActorMetrics, LeaderClient, Result, WorkerErr};

/// One worker: an environment, a local policy copy and the leader channel.
///
/// Per batch it runs one episode per assigned scenario, submits the batch
/// share, then blocks until the next broadcast; the local batch counter
/// never runs ahead of the leader, which is what bounds parameter staleness
/// to a single batch.
pub struct Actor {
    cfg: ActorConfig,
    policy: Box<dyn Policy>,
    env: Environment,
    metrics: ActorMetrics,
}

impl Actor {
    pub fn new(cfg: ActorConfig, policy: Box<dyn Policy>, env: Environment) -> Self {
        Self {
            cfg,
            policy,
            env,
            metrics: ActorMetrics::default(),
        }
    }

    /// Runs the full training loop against the leader on `rx`/`tx`.
    ///
    /// Cancellation is a clean exit: transport is released, the in-flight
    /// episode is discarded, and the metrics report what was dropped.
    pub async fn run<R, W>(
        mut self,
        rx: FrameReceiver<R>,
        tx: FrameSender<W>,
        cancel: &CancellationToken,
    ) -> Result<ActorMetrics>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let mut client = LeaderClient::new(rx, tx);

        match self.drive(&mut client, cancel).await {
            Ok(()) => Ok(self.metrics),
            Err(WorkerErr::Cancelled) => {
                info!(
                    worker = self.cfg.worker;
                    "cancelled; transport released, in-flight work discarded"
                );
                self.metrics.cancelled = true;
                Ok(self.metrics)
            }
            Err(err) => Err(err),
        }
    }

    async fn drive<R, W>(
        &mut self,
        client: &mut LeaderClient<R, W>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let assignment = self.cfg.assignment();
        let scenarios = self.cfg.scenarios();
        info!(
            worker = self.cfg.worker,
            start = assignment.start,
            end = assignment.end;
            "allocated scenario slice"
        );

        client.register(self.cfg.worker).await?;

        let Some(mut version) = self.await_params(client, cancel, None).await? else {
            info!(worker = self.cfg.worker; "leader shut down before the first batch");
            return Ok(());
        };

        let per_scenario = self.cfg.spec.run.episodes_per_scenario.get();
        for batch in 1..=self.cfg.spec.run.max_batches {
            let mut episodes = Vec::with_capacity(scenarios.len() * per_scenario);

            for &scenario in &scenarios {
                for _ in 0..per_scenario {
                    if let Some(episode) = self.produce(scenario, cancel).await? {
                        episodes.push(episode);
                    }
                }
            }

            debug!(
                worker = self.cfg.worker,
                batch = batch,
                episodes = episodes.len();
                "submitting batch share"
            );
            client.submit(self.cfg.worker, batch, episodes).await?;
            self.metrics.batches_submitted += 1;

            let Some(next) = self.await_params(client, cancel, Some(version)).await? else {
                info!(worker = self.cfg.worker; "leader shut down early; exiting");
                return Ok(());
            };
            version = next;
        }

        self.await_shutdown(client, cancel).await
    }

    /// Runs one episode, retrying or skipping per the transport policy.
    ///
    /// A spoiled episode is discarded whole and recorded; it never reaches
    /// the leader and never kills the worker.
    async fn produce(
        &mut self,
        scenario: Scenario,
        cancel: &CancellationToken,
    ) -> Result<Option<Episode>> {
        let attempts = match self.cfg.spec.transport {
            TransportSpec::Retry { attempts } => attempts.max(1),
            TransportSpec::Skip => 1,
        };

        for attempt in 1..=attempts {
            match self
                .env
                .run_episode(scenario, self.policy.as_ref(), cancel)
                .await
            {
                Ok(episode) => {
                    self.metrics.episodes_run += 1;
                    return Ok(Some(episode));
                }
                Err(EnvErr::Cancelled) => return Err(WorkerErr::Cancelled),
                Err(EnvErr::Transport(err)) => {
                    self.metrics.episodes_discarded += 1;
                    warn!(
                        worker = self.cfg.worker,
                        topology = scenario.topology,
                        traffic = scenario.traffic,
                        attempt = attempt;
                        "episode discarded on transport failure: {err}"
                    );
                    if attempt < attempts {
                        self.metrics.transport_retries += 1;
                    }
                }
            }
        }

        error!(
            worker = self.cfg.worker,
            topology = scenario.topology,
            traffic = scenario.traffic;
            "scenario dropped for this batch after repeated transport failures"
        );
        self.metrics.scenarios_skipped += 1;
        Ok(None)
    }

    /// Blocks until the next broadcast, installs it and acknowledges.
    ///
    /// # Returns
    /// The new version, or `None` if the leader announced shutdown instead.
    async fn await_params<R, W>(
        &mut self,
        client: &mut LeaderClient<R, W>,
        cancel: &CancellationToken,
        held: Option<u64>,
    ) -> Result<Option<u64>>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let broadcast = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkerErr::Cancelled),
            broadcast = client.next_broadcast() => broadcast?,
        };

        let Some(params) = broadcast else {
            return Ok(None);
        };

        if let Some(held) = held {
            if params.version <= held {
                return Err(WorkerErr::VersionRegression {
                    got: params.version,
                    held,
                });
            }
        }

        self.policy.install(&params)?;
        client.ack(self.cfg.worker, params.version).await?;
        self.metrics.last_version = params.version;
        debug!(
            worker = self.cfg.worker,
            version = params.version;
            "installed parameter broadcast"
        );

        Ok(Some(params.version))
    }

    async fn await_shutdown<R, W>(
        &mut self,
        client: &mut LeaderClient<R, W>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorkerErr::Cancelled),
            broadcast = client.next_broadcast() => match broadcast? {
                None => Ok(()),
                Some(params) => {
                    warn!(version = params.version; "unexpected broadcast after the final batch");
                    Ok(())
                }
            },
        }
    }
}
