use std::{error::Error, fmt, io};

/// Episode failures local to one environment run.
#[derive(Debug)]
pub enum EnvErr {
    /// The channel failed underneath the episode; the episode is spoiled
    /// and must be discarded, never truncated-and-kept.
    Transport(io::Error),
    /// The run was cancelled mid-episode; same discard rule.
    Cancelled,
}

impl fmt::Display for EnvErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvErr::Transport(e) => write!(f, "channel transport failure: {e}"),
            EnvErr::Cancelled => write!(f, "episode cancelled before completion"),
        }
    }
}

impl Error for EnvErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EnvErr::Transport(e) => Some(e),
            EnvErr::Cancelled => None,
        }
    }
}

impl From<io::Error> for EnvErr {
    fn from(value: io::Error) -> Self {
        Self::Transport(value)
    }
}
