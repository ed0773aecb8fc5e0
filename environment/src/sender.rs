//! The congestion-controlled sending side of the channel.

use std::{future::Future, pin::Pin, time::Instant};

use comms::{
    datagram::{Datagram, MAX_DATAGRAM},
    scenario::Scenario,
    specs::{ChannelSpec, EpisodeBound, RewardSpec},
    trajectory::{Episode, Step},
};
use futures::future;
use log::debug;
use policy::Policy;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{EnvErr, Estimator, Feedback, Result, Window, link::DatagramLink, reward, wall_clock};

/// Runs one episode worth of paced, policy-controlled transmission.
///
/// Transmission, feedback ingestion and the control clock all multiplex in
/// one owner loop, so the outstanding window is only ever touched from one
/// place; there is no lock to forget.
pub struct CcSender<'a, L> {
    link: L,
    policy: &'a dyn Policy,
    spec: &'a ChannelSpec,
    reward: Option<&'a RewardSpec>,
}

impl<'a, L: DatagramLink> CcSender<'a, L> {
    pub fn new(
        link: L,
        policy: &'a dyn Policy,
        spec: &'a ChannelSpec,
        reward: Option<&'a RewardSpec>,
    ) -> Self {
        Self {
            link,
            policy,
            spec,
            reward,
        }
    }

    /// Drives the channel until the episode bound is reached.
    ///
    /// Cancellation and transport failures spoil the episode: the
    /// accumulated steps are dropped with the sender, never returned.
    pub async fn run(self, scenario: Scenario, cancel: &CancellationToken) -> Result<Episode> {
        let Self {
            mut link,
            policy,
            spec,
            reward,
        } = self;

        let mut window = Window::new();
        let mut estimator = Estimator::new(spec.loss_timeout());
        let mut cwnd = spec.init_cwnd;
        let mut steps = Vec::new();

        let payload = vec![0u8; spec.payload_len];
        let mut out = Vec::new();
        let mut inbox = [0u8; MAX_DATAGRAM];

        // The first control tick must come one full interval in, not
        // immediately; pacing on the other hand should fill the initial
        // window right away.
        let mut control = time::interval_at(
            time::Instant::now() + spec.control_interval(),
            spec.control_interval(),
        );
        control.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pace = time::interval(spec.pace_interval());
        pace.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let max_steps = match spec.bound {
            EpisodeBound::Steps(steps) => Some(steps as usize),
            EpisodeBound::Millis(_) => None,
        };
        let mut deadline: Pin<Box<dyn Future<Output = ()> + Send>> = match spec.bound {
            EpisodeBound::Millis(ms) => Box::pin(time::sleep(Duration::from_millis(ms))),
            EpisodeBound::Steps(_) => Box::pin(future::pending()),
        };

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(collected = steps.len(); "episode cancelled, discarding partial run");
                    return Err(EnvErr::Cancelled);
                }

                _ = deadline.as_mut() => break,

                _ = control.tick() => {
                    let lost = window.expire(Instant::now(), spec.loss_timeout());
                    estimator.on_loss(lost);

                    let state = estimator.interval_state(spec.control_interval(), cwnd);
                    let action = policy.decide(&state);

                    // The new window applies to packets sent from here on,
                    // never retroactively.
                    cwnd = action.apply(cwnd, spec.min_cwnd, spec.max_cwnd);

                    let reward = reward.map(|spec| reward::interval_reward(spec, &state));
                    steps.push(Step { state, action, reward });

                    if max_steps.is_some_and(|max| steps.len() >= max) {
                        break;
                    }
                }

                received = link.recv(&mut inbox) => {
                    let len = received?;

                    match Datagram::decode(&inbox[..len]) {
                        Ok(Datagram::Feedback { seq, recv_ts }) => {
                            match window.on_feedback(seq) {
                                Feedback::Retired { sent } => {
                                    estimator.on_ack(sent.at.elapsed(), recv_ts - sent.wall_ts);
                                }
                                // Idempotent ignores: duplicates and
                                // leftovers from a reused path.
                                Feedback::Stale | Feedback::Foreign => {}
                            }
                        }
                        Ok(Datagram::Data { .. }) => {}
                        Err(err) => debug!("dropping undecodable datagram: {err}"),
                    }
                }

                _ = pace.tick() => {
                    while window.in_flight() < cwnd as usize {
                        let wall_ts = wall_clock();
                        let seq = window.mark_sent(Instant::now(), wall_ts);

                        Datagram::Data {
                            seq,
                            send_ts: wall_ts,
                            payload: &payload,
                        }
                        .encode(&mut out);

                        link.send(&out).await?;
                        estimator.on_send();
                    }
                }
            }
        }

        debug!(steps = steps.len(); "episode complete");
        Ok(Episode { scenario, steps })
    }
}
