//! The receiving side of the channel: immediate per-packet feedback.

use std::io;

use comms::datagram::{Datagram, MAX_DATAGRAM};
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{link::DatagramLink, wall_clock};

/// Echoes one feedback datagram for every data packet, as soon as it
/// arrives. Feedback is best effort and never batched, so the sender's
/// state estimate carries no added latency from this side.
pub struct FeedbackEcho<L> {
    link: L,
}

impl<L: DatagramLink> FeedbackEcho<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Runs until cancelled, returning how many packets were echoed.
    pub async fn run(mut self, cancel: CancellationToken) -> io::Result<u64> {
        let mut inbox = [0u8; MAX_DATAGRAM];
        let mut out = Vec::new();
        let mut echoed = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(echoed),

                received = self.link.recv(&mut inbox) => {
                    let len = received?;

                    match Datagram::decode(&inbox[..len]) {
                        Ok(Datagram::Data { seq, .. }) => {
                            Datagram::Feedback {
                                seq,
                                recv_ts: wall_clock(),
                            }
                            .encode(&mut out);

                            self.link.send(&out).await?;
                            echoed += 1;
                        }
                        Ok(Datagram::Feedback { .. }) => {}
                        Err(err) => debug!("dropping undecodable datagram: {err}"),
                    }
                }
            }
        }
    }
}
