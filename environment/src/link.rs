//! The datagram path behind the channel.
//!
//! The protocol only ever assumes the unreliable-datagram contract: packets
//! may be lost, duplicated or reordered in transit. Whether the path is a
//! real UDP socket or an in-memory emulation is invisible above this seam.

use std::{io, net::SocketAddr, sync::Arc};

use comms::scenario::Scenario;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::{
    net::UdpSocket,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    time::{Duration, sleep},
};

/// One endpoint of an unreliable, unordered datagram path.
#[allow(unused)]
#[trait_variant::make(DatagramLink: Send)]
pub trait LocalDatagramLink {
    /// Sends one datagram, best effort.
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Waits for one datagram, writing it into `buf` and returning its size.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A connected UDP socket as the datagram path.
pub struct UdpLink {
    socket: UdpSocket,
}

impl UdpLink {
    /// Binds `local` and pins the endpoint to `peer`.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(Self { socket })
    }

    /// Two loopback endpoints connected to each other, for runs that keep
    /// the receiver in-process.
    pub async fn pair() -> io::Result<(Self, Self)> {
        let one = UdpSocket::bind("127.0.0.1:0").await?;
        let two = UdpSocket::bind("127.0.0.1:0").await?;

        one.connect(two.local_addr()?).await?;
        two.connect(one.local_addr()?).await?;

        Ok((Self { socket: one }, Self { socket: two }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramLink for UdpLink {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send(datagram).await.map(|_| ())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }
}

/// Impairments of an emulated path, derived deterministically from a
/// scenario so identical catalogs reproduce identical conditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmuProfile {
    pub delay: Duration,
    pub jitter: Duration,
    pub loss: f64,
    pub duplicate: f64,
    pub seed: u64,
}

impl EmuProfile {
    /// No impairments at all; useful as a clean baseline.
    pub fn pristine() -> Self {
        Self {
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            loss: 0.0,
            duplicate: 0.0,
            seed: 0,
        }
    }

    /// Maps a scenario onto concrete path conditions.
    pub fn from_scenario(scenario: Scenario) -> Self {
        const LOSS_GRADES: [f64; 4] = [0.0, 0.005, 0.02, 0.08];

        let Scenario { topology, traffic } = scenario;

        Self {
            delay: Duration::from_millis(2 + u64::from(topology % 8) * 5),
            jitter: Duration::from_millis(u64::from(traffic % 4)),
            loss: LOSS_GRADES[traffic as usize % LOSS_GRADES.len()],
            duplicate: if topology % 5 == 0 { 0.01 } else { 0.0 },
            seed: (u64::from(topology) << 32) | u64::from(traffic),
        }
    }
}

struct EmuState {
    rng: StdRng,
    loss: f64,
}

/// One endpoint of an in-memory emulated path.
///
/// Both endpoints share a seeded random source and a loss dial; delivery
/// goes through per-datagram delay tasks, so jitter naturally reorders.
pub struct EmuLink {
    out: UnboundedSender<Vec<u8>>,
    inbox: UnboundedReceiver<Vec<u8>>,
    profile: EmuProfile,
    state: Arc<Mutex<EmuState>>,
}

impl EmuLink {
    /// Creates both endpoints of an emulated path.
    pub fn pair(profile: EmuProfile) -> (Self, Self) {
        let (near_tx, far_rx) = unbounded_channel();
        let (far_tx, near_rx) = unbounded_channel();
        let state = Arc::new(Mutex::new(EmuState {
            rng: StdRng::seed_from_u64(profile.seed),
            loss: profile.loss,
        }));

        let near = Self {
            out: near_tx,
            inbox: near_rx,
            profile,
            state: state.clone(),
        };
        let far = Self {
            out: far_tx,
            inbox: far_rx,
            profile,
            state,
        };

        (near, far)
    }

    /// Moves the loss dial for both directions, e.g. to black out the path
    /// mid-episode.
    pub fn set_loss(&self, loss: f64) {
        self.state.lock().loss = loss.clamp(0.0, 1.0);
    }
}

impl DatagramLink for EmuLink {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let (dropped, copies, delay) = {
            let mut state = self.state.lock();
            let loss = state.loss;
            let dropped = state.rng.random_bool(loss);
            let copies = if state.rng.random_bool(self.profile.duplicate) {
                2
            } else {
                1
            };
            let jitter_ms = self.profile.jitter.as_millis() as u64;
            let jitter = if jitter_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(state.rng.random_range(0..=jitter_ms))
            };

            (dropped, copies, self.profile.delay + jitter)
        };

        if dropped {
            return Ok(());
        }

        for _ in 0..copies {
            let bytes = datagram.to_vec();
            let out = self.out.clone();

            if delay.is_zero() {
                let _ = out.send(bytes);
            } else {
                tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = out.send(bytes);
                });
            }
        }

        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.inbox.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "emulated path closed")
        })?;

        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_reproducible() {
        let scenario = Scenario {
            topology: 13,
            traffic: 2,
        };

        assert_eq!(
            EmuProfile::from_scenario(scenario),
            EmuProfile::from_scenario(scenario)
        );
    }

    #[test]
    fn distinct_scenarios_get_distinct_seeds() {
        let one = EmuProfile::from_scenario(Scenario {
            topology: 1,
            traffic: 0,
        });
        let two = EmuProfile::from_scenario(Scenario {
            topology: 0,
            traffic: 1,
        });

        assert_ne!(one.seed, two.seed);
    }

    #[tokio::test]
    async fn pristine_pair_delivers_in_both_directions() {
        let (mut near, mut far) = EmuLink::pair(EmuProfile::pristine());
        let mut buf = [0u8; 16];

        DatagramLink::send(&mut near, b"ping").await.unwrap();
        let n = DatagramLink::recv(&mut far, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        DatagramLink::send(&mut far, b"pong").await.unwrap();
        let n = DatagramLink::recv(&mut near, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn full_loss_drops_everything() {
        let (mut near, mut far) = EmuLink::pair(EmuProfile::pristine());
        near.set_loss(1.0);

        DatagramLink::send(&mut near, b"gone").await.unwrap();
        drop(near);

        let mut buf = [0u8; 16];
        assert!(DatagramLink::recv(&mut far, &mut buf).await.is_err());
    }
}
