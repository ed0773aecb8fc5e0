//! Worker-side wrapper over the leader control channel.

use std::io;

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg},
    trajectory::Episode,
};
use log::warn;
use policy::ModelParameters;
use tokio::io::{AsyncRead, AsyncWrite};

/// Client view of the leader connection.
///
/// Contract (current protocol):
/// - announce once with `Register`
/// - submit episodes tagged with their batch number
/// - acknowledge every parameter broadcast by version
pub struct LeaderClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: FrameReceiver<R>,
    tx: FrameSender<W>,
}

impl<R, W> LeaderClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(rx: FrameReceiver<R>, tx: FrameSender<W>) -> Self {
        Self { rx, tx }
    }

    pub async fn register(&mut self, worker: usize) -> io::Result<()> {
        self.tx.send(&Msg::Control(Command::Register { worker })).await
    }

    pub async fn submit(
        &mut self,
        worker: usize,
        batch: u64,
        episodes: Vec<Episode>,
    ) -> io::Result<()> {
        self.tx
            .send(&Msg::Control(Command::Submit {
                worker,
                batch,
                episodes,
            }))
            .await
    }

    pub async fn ack(&mut self, worker: usize, version: u64) -> io::Result<()> {
        self.tx.send(&Msg::Control(Command::Ack { worker, version })).await
    }

    /// Waits for the next parameter broadcast.
    ///
    /// # Returns
    /// `Some` with a fresh parameter artifact, or `None` once the leader
    /// announces shutdown.
    pub async fn next_broadcast(&mut self) -> io::Result<Option<ModelParameters>> {
        loop {
            match self.rx.recv::<Msg>().await? {
                Msg::Params { version, blob } => {
                    return Ok(Some(ModelParameters::new(version, blob.into_owned())));
                }
                Msg::Control(Command::Shutdown) => return Ok(None),
                Msg::Err(detail) => warn!("leader reported: {detail}"),
                msg => warn!("ignoring unexpected message: {msg:?}"),
            }
        }
    }
}
