mod environment;
pub mod error;
mod estimator;
mod link;
mod receiver;
mod reward;
mod sender;
mod window;

use std::time::{SystemTime, UNIX_EPOCH};

pub use environment::{Environment, Substrate};
pub use error::EnvErr;
pub use estimator::Estimator;
pub use link::{DatagramLink, EmuLink, EmuProfile, UdpLink};
pub use receiver::FeedbackEcho;
pub use reward::interval_reward;
pub use sender::CcSender;
pub use window::{Feedback, Sent, Window};

/// The environment module's result type.
pub type Result<T> = std::result::Result<T, EnvErr>;

/// Wall-clock seconds since the unix epoch, as carried on the wire.
pub(crate) fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
