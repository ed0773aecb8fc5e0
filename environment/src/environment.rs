//! One environment = one channel + one scenario at a time.

use comms::{
    scenario::Scenario,
    specs::{ChannelSpec, RewardSpec},
    trajectory::Episode,
};
use log::{debug, warn};
use policy::Policy;
use tokio_util::sync::CancellationToken;

use crate::{
    CcSender, FeedbackEcho, Result,
    link::{DatagramLink, EmuLink, EmuProfile, UdpLink},
};

/// What actually carries the datagrams underneath an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substrate {
    /// In-memory emulated path with impairments derived from the scenario.
    Emulated,
    /// Real UDP sockets over loopback; the receiver runs in-process.
    Udp,
}

/// Produces one episode per invocation by running a sender against a
/// receiver under a given scenario.
pub struct Environment {
    substrate: Substrate,
    channel: ChannelSpec,
    reward: Option<RewardSpec>,
}

impl Environment {
    pub fn new(substrate: Substrate, channel: ChannelSpec, reward: Option<RewardSpec>) -> Self {
        Self {
            substrate,
            channel,
            reward,
        }
    }

    /// Runs one complete bounded episode against `scenario`.
    ///
    /// Transport resources live exactly as long as this call: both link
    /// endpoints are released on every exit path, cancellation included.
    pub async fn run_episode(
        &self,
        scenario: Scenario,
        policy: &dyn Policy,
        cancel: &CancellationToken,
    ) -> Result<Episode> {
        debug!(
            topology = scenario.topology,
            traffic = scenario.traffic;
            "starting episode"
        );

        match self.substrate {
            Substrate::Emulated => {
                let (near, far) = EmuLink::pair(EmuProfile::from_scenario(scenario));
                self.drive(scenario, policy, near, far, cancel).await
            }
            Substrate::Udp => {
                let (near, far) = UdpLink::pair().await?;
                self.drive(scenario, policy, near, far, cancel).await
            }
        }
    }

    async fn drive<L>(
        &self,
        scenario: Scenario,
        policy: &dyn Policy,
        near: L,
        far: L,
        cancel: &CancellationToken,
    ) -> Result<Episode>
    where
        L: DatagramLink + Send + 'static,
    {
        let echo_cancel = cancel.child_token();
        let echo = tokio::spawn(FeedbackEcho::new(far).run(echo_cancel.clone()));

        let sender = CcSender::new(near, policy, &self.channel, self.reward.as_ref());
        let outcome = sender.run(scenario, cancel).await;

        // Tear the receiving side down no matter how the sender ended.
        echo_cancel.cancel();
        match echo.await {
            Ok(Ok(echoed)) => debug!(echoed = echoed; "receiver drained"),
            Ok(Err(err)) => warn!("receiver closed with a transport error: {err}"),
            Err(err) => warn!("receiver task failed to join: {err}"),
        }

        outcome
    }
}
