use std::{error::Error, fmt, io};

use comms::scenario::Scenario;

/// Policy update failures.
#[derive(Debug)]
pub enum PolicyErr {
    EmptyBatch,
    MissingReward { scenario: Scenario },
    ShapeMismatch { got: usize, expected: usize },
}

impl fmt::Display for PolicyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyErr::EmptyBatch => write!(f, "batch update on an empty batch"),
            PolicyErr::MissingReward { scenario } => write!(
                f,
                "reward-driven update on a rewardless episode for topology {} traffic {}",
                scenario.topology, scenario.traffic
            ),
            PolicyErr::ShapeMismatch { got, expected } => {
                write!(f, "parameter shape mismatch: got {got}, expected {expected}")
            }
        }
    }
}

impl Error for PolicyErr {}

/// Boundary conversion for binaries / I/O APIs.
impl From<PolicyErr> for io::Error {
    fn from(value: PolicyErr) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}
