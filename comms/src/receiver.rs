//! Receiving end of the framed message channel.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, LEN_TYPE_SIZE, LenType};

/// The receiving half of a framed channel.
///
/// Owns a reusable frame buffer; decoded messages may borrow from it, so
/// each received message must be consumed (or converted to an owned form)
/// before the next `recv` call.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits for the next complete frame and decodes it.
    ///
    /// # Returns
    /// The decoded message, or `io::Error` on transport or decode failure.
    pub async fn recv<'a, T: Deserialize<'a>>(&'a mut self) -> io::Result<T> {
        let mut prefix = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut prefix).await?;
        let len = LenType::from_be_bytes(prefix) as usize;

        self.buf.clear();
        self.buf.resize(len, 0);
        self.rx.read_exact(&mut self.buf).await?;

        T::deserialize(&self.buf)
    }
}
