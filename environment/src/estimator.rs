//! Turns raw feedback timing into per-interval state vectors.

use std::time::Duration;

use comms::trajectory::StateVector;

const SRTT_GAIN: f64 = 0.125;

/// Interval statistics accumulator.
///
/// Smoothed RTT and the one-way-delay floor survive across intervals; the
/// send/ack/loss counters are per interval and reset when the state is
/// taken. The one-way delay mixes both endpoints' clocks, so only its
/// distance from the episode minimum is meaningful.
pub struct Estimator {
    loss_timeout: Duration,
    srtt_ms: Option<f64>,
    min_owd: Option<f64>,
    last_owd: f64,
    sent: u32,
    acked: u32,
    lost: u32,
}

impl Estimator {
    pub fn new(loss_timeout: Duration) -> Self {
        Self {
            loss_timeout,
            srtt_ms: None,
            min_owd: None,
            last_owd: 0.0,
            sent: 0,
            acked: 0,
            lost: 0,
        }
    }

    pub fn on_send(&mut self) {
        self.sent += 1;
    }

    /// Folds in one retired packet: its round trip and one-way delay.
    pub fn on_ack(&mut self, rtt: Duration, owd: f64) {
        self.acked += 1;

        let rtt_ms = rtt.as_secs_f64() * 1e3;
        self.srtt_ms = Some(match self.srtt_ms {
            Some(srtt) => srtt + SRTT_GAIN * (rtt_ms - srtt),
            None => rtt_ms,
        });

        self.min_owd = Some(self.min_owd.map_or(owd, |min| min.min(owd)));
        self.last_owd = owd;
    }

    pub fn on_loss(&mut self, packets: usize) {
        self.lost += packets as u32;
    }

    /// Closes the current interval and produces its state vector.
    ///
    /// An interval that saw no feedback at all still yields a state: the
    /// latency estimate pins to the loss timeout and the loss rate to its
    /// maximum, instead of aborting the episode.
    pub fn interval_state(&mut self, elapsed: Duration, cwnd: f64) -> StateVector {
        let secs = elapsed.as_secs_f64().max(1e-9);
        let send_pps = f64::from(self.sent) / secs;

        let state = if self.acked == 0 {
            let timeout_ms = self.loss_timeout.as_secs_f64() * 1e3;

            StateVector {
                srtt_ms: timeout_ms as f32,
                queue_delay_ms: timeout_ms as f32,
                delivery_pps: 0.0,
                send_pps: send_pps as f32,
                loss_rate: 1.0,
                cwnd: cwnd as f32,
            }
        } else {
            let queue_delay = self
                .min_owd
                .map_or(0.0, |min| (self.last_owd - min).max(0.0) * 1e3);
            let settled = f64::from(self.acked + self.lost);

            StateVector {
                srtt_ms: self.srtt_ms.unwrap_or_default() as f32,
                queue_delay_ms: queue_delay as f32,
                delivery_pps: (f64::from(self.acked) / secs) as f32,
                send_pps: send_pps as f32,
                loss_rate: (f64::from(self.lost) / settled) as f32,
                cwnd: cwnd as f32,
            }
        };

        self.sent = 0;
        self.acked = 0;
        self.lost = 0;
        state
    }
}
