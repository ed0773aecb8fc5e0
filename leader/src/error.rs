use std::{error::Error, fmt, io};

use policy::PolicyErr;

/// Leader runtime failures.
#[derive(Debug)]
pub enum LeaderErr {
    Io(io::Error),
    Policy(PolicyErr),
    /// Every worker connection is gone while the run still needs them.
    WorkersGone,
    /// Operator interrupt; a designed shutdown path, not a failure.
    Cancelled,
}

impl fmt::Display for LeaderErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderErr::Io(e) => write!(f, "io error: {e}"),
            LeaderErr::Policy(e) => write!(f, "policy update failed: {e}"),
            LeaderErr::WorkersGone => write!(f, "all worker connections closed mid-run"),
            LeaderErr::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl Error for LeaderErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LeaderErr::Io(e) => Some(e),
            LeaderErr::Policy(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LeaderErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PolicyErr> for LeaderErr {
    fn from(value: PolicyErr) -> Self {
        Self::Policy(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<LeaderErr> for io::Error {
    fn from(value: LeaderErr) -> Self {
        match value {
            LeaderErr::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
