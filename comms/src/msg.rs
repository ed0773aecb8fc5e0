//! Application layer messages for the leader/worker control plane.

use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize, trajectory::Episode};

type Kind = u32;
const KIND_SIZE: usize = size_of::<Kind>();

const ERR_K: Kind = 0;
const CONTROL_K: Kind = 1;
const PARAMS_K: Kind = 2;

const VERSION_SIZE: usize = size_of::<u64>();

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// A worker announcing itself after connecting.
    Register { worker: usize },
    /// Episodes produced by `worker` for batch `batch`.
    Submit {
        worker: usize,
        batch: u64,
        episodes: Vec<Episode>,
    },
    /// Acknowledgement of a received parameter broadcast.
    Ack { worker: usize, version: u64 },
    /// The run is over; the receiving side tears down.
    Shutdown,
}

/// The application layer message for the control plane.
///
/// Control structures travel as JSON; parameter blobs travel on a raw
/// zero-copy lane since they dominate the traffic.
#[derive(Debug)]
pub enum Msg<'a> {
    Err(Cow<'a, str>),
    Control(Command),
    Params { version: u64, blob: Cow<'a, [f32]> },
}

impl Msg<'_> {
    fn frame_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {size} bytes is smaller than the {KIND_SIZE} byte kind header"),
        ))
    }

    fn invalid_kind<T>(kind: Kind) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("received an invalid message kind {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(detail) => {
                buf.extend_from_slice(&ERR_K.to_be_bytes());
                Some(detail.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_K.to_be_bytes());

                // SAFETY: Serialize impl for `Command` is derived and not
                //         implemented by hand. Nor has a non string-key map
                //         inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Params { version, blob } => {
                buf.extend_from_slice(&PARAMS_K.to_be_bytes());
                buf.extend_from_slice(&version.to_be_bytes());
                Some(bytemuck::cast_slice(blob))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < KIND_SIZE {
            return Self::frame_too_small(buf.len());
        }

        let (kind_buf, body) = buf.split_at(KIND_SIZE);

        // SAFETY: We splitted the buffer to be of size `KIND_SIZE` just above.
        let kind = Kind::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR_K => {
                let detail = str::from_utf8(body)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(detail)))
            }
            CONTROL_K => {
                let cmd = serde_json::from_slice(body)?;
                Ok(Self::Control(cmd))
            }
            PARAMS_K => {
                if body.len() < VERSION_SIZE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("params frame of {} bytes has no version", body.len()),
                    ));
                }

                let (version_buf, blob_buf) = body.split_at(VERSION_SIZE);
                let version = u64::from_be_bytes(version_buf.try_into().unwrap());

                if blob_buf.len() % size_of::<f32>() != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("params blob of {} bytes is not f32 aligned", blob_buf.len()),
                    ));
                }

                // Copies once; the incoming byte buffer has no alignment
                // guarantee for an in-place cast.
                let blob = bytemuck::pod_collect_to_vec(blob_buf);
                Ok(Self::Params {
                    version,
                    blob: Cow::Owned(blob),
                })
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
