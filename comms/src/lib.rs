mod deserialize;
mod receiver;
mod sender;
mod serialize;

pub mod datagram;
pub mod msg;
pub mod scenario;
pub mod specs;
pub mod trajectory;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use receiver::FrameReceiver;
pub use sender::FrameSender;
pub use serialize::Serialize;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Creates both ends of a framed message channel over a byte stream.
///
/// Frames are length-prefixed, so any `AsyncRead`/`AsyncWrite` pair that
/// preserves byte order works as a carrier (a TCP stream, an in-memory
/// duplex in tests).
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// The receiving and sending halves of the channel.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReceiver::new(rx), FrameSender::new(tx))
}
