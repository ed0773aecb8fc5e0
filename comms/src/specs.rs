//! Run configuration shared by every process in a run.
//!
//! All processes must load an identical spec; the leader and the workers
//! derive their expected episode counts independently from it.

use std::{num::NonZeroUsize, time::Duration};

/// Bounds of the whole training run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSpec {
    /// Number of batches before the leader persists and shuts down.
    pub max_batches: u64,
    /// Episodes each worker runs per assigned scenario per batch.
    pub episodes_per_scenario: NonZeroUsize,
    /// How long the leader waits for broadcast acknowledgements.
    pub ack_timeout_ms: u64,
    /// What the leader does about workers that miss the batch deadline.
    pub stall: StallSpec,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            max_batches: 10,
            episodes_per_scenario: NonZeroUsize::new(1).unwrap(),
            ack_timeout_ms: 5_000,
            stall: StallSpec::Block,
        }
    }
}

impl RunSpec {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Leader behavior when a worker fails to submit its batch share.
///
/// The default is the full barrier: the batch never closes without every
/// live worker, and the stall is surfaced through diagnostics only.
/// `Withdraw` is the explicit opt-in relaxation that drops overdue workers
/// from the live set for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallSpec {
    Block,
    Withdraw { deadline_ms: u64 },
}

/// When an episode is over.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeBound {
    /// Fixed wall-clock duration.
    Millis(u64),
    /// Fixed number of control steps.
    Steps(u32),
}

/// Timing and sizing of the sender/receiver channel protocol.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelSpec {
    /// Wall-clock control interval: state is recomputed and the policy
    /// re-invoked once per interval, independent of throughput.
    pub control_interval_ms: u64,
    /// An outstanding packet with no feedback after this long counts lost.
    pub loss_timeout_ms: u64,
    /// Granularity of the pacing loop that refills the window.
    pub pace_interval_ms: u64,
    /// Payload bytes per data packet.
    pub payload_len: usize,
    pub init_cwnd: f64,
    pub min_cwnd: f64,
    pub max_cwnd: f64,
    pub bound: EpisodeBound,
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self {
            control_interval_ms: 20,
            loss_timeout_ms: 120,
            pace_interval_ms: 2,
            payload_len: 1200,
            init_cwnd: 10.0,
            min_cwnd: 2.0,
            max_cwnd: 1000.0,
            bound: EpisodeBound::Millis(2_000),
        }
    }
}

impl ChannelSpec {
    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms)
    }

    pub fn loss_timeout(&self) -> Duration {
        Duration::from_millis(self.loss_timeout_ms)
    }

    pub fn pace_interval(&self) -> Duration {
        Duration::from_millis(self.pace_interval_ms)
    }
}

/// Weights of the per-interval reward, a pure function of the interval
/// state. Present only for reward-driven runs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RewardSpec {
    pub throughput: f32,
    pub delay: f32,
    pub loss: f32,
}

impl Default for RewardSpec {
    fn default() -> Self {
        Self {
            throughput: 1.0,
            delay: 0.5,
            loss: 10.0,
        }
    }
}

/// Worker behavior when a transport failure spoils an episode.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSpec {
    /// Rerun the scenario up to `attempts` times before giving up on it.
    Retry { attempts: u32 },
    /// Drop the scenario for this batch immediately.
    Skip,
}

impl Default for TransportSpec {
    fn default() -> Self {
        Self::Retry { attempts: 2 }
    }
}

/// Everything a process needs to participate in a run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainSpec {
    pub run: RunSpec,
    pub channel: ChannelSpec,
    pub reward: Option<RewardSpec>,
    pub transport: TransportSpec,
}
