use std::{error::Error, fmt, io};

use policy::PolicyErr;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Policy(PolicyErr),
    /// The leader broadcast a version at or below one this worker already
    /// holds; versions only ever move forward.
    VersionRegression { got: u64, held: u64 },
    /// Operator interrupt; a designed shutdown path, not a failure.
    Cancelled,
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Policy(e) => write!(f, "policy error: {e}"),
            WorkerErr::VersionRegression { got, held } => {
                write!(f, "parameter version went backwards: got {got}, held {held}")
            }
            WorkerErr::Cancelled => write!(f, "worker cancelled"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Policy(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PolicyErr> for WorkerErr {
    fn from(value: PolicyErr) -> Self {
        Self::Policy(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
