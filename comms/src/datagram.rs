//! Self-contained datagram codec for the sender/receiver data path.
//!
//! Every datagram decodes on its own: there is no cross-packet framing, so
//! loss, duplication and reordering in transit never corrupt the stream.

use std::io;

const DATA_K: u8 = 0;
const FEEDBACK_K: u8 = 1;

const SEQ_SIZE: usize = size_of::<u64>();
const TS_SIZE: usize = size_of::<f64>();

/// Fixed bytes before the payload of a data datagram.
pub const DATA_OVERHEAD: usize = 1 + SEQ_SIZE + TS_SIZE;

/// Total size of a feedback datagram.
pub const FEEDBACK_SIZE: usize = 1 + SEQ_SIZE + TS_SIZE;

/// Largest datagram either side ever emits.
pub const MAX_DATAGRAM: usize = 1500;

/// One packet on the sender/receiver wire.
#[derive(Debug, PartialEq)]
pub enum Datagram<'a> {
    /// Sender to receiver: a sequenced, timestamped chunk of payload.
    Data {
        seq: u64,
        send_ts: f64,
        payload: &'a [u8],
    },
    /// Receiver to sender: the immediate echo for one received packet.
    Feedback { seq: u64, recv_ts: f64 },
}

impl<'a> Datagram<'a> {
    /// Encodes the datagram into `buf`, replacing its previous content.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.clear();

        match self {
            Datagram::Data {
                seq,
                send_ts,
                payload,
            } => {
                buf.push(DATA_K);
                buf.extend_from_slice(&seq.to_be_bytes());
                buf.extend_from_slice(&send_ts.to_be_bytes());
                buf.extend_from_slice(payload);
            }
            Datagram::Feedback { seq, recv_ts } => {
                buf.push(FEEDBACK_K);
                buf.extend_from_slice(&seq.to_be_bytes());
                buf.extend_from_slice(&recv_ts.to_be_bytes());
            }
        }
    }

    /// Decodes one datagram from a received buffer.
    pub fn decode(buf: &'a [u8]) -> io::Result<Self> {
        let truncated =
            |what| io::Error::new(io::ErrorKind::InvalidData, format!("truncated {what} datagram"));

        match buf.first() {
            Some(&DATA_K) => {
                if buf.len() < DATA_OVERHEAD {
                    return Err(truncated("data"));
                }

                let (head, payload) = buf.split_at(DATA_OVERHEAD);
                Ok(Datagram::Data {
                    seq: u64::from_be_bytes(head[1..1 + SEQ_SIZE].try_into().unwrap()),
                    send_ts: f64::from_be_bytes(head[1 + SEQ_SIZE..].try_into().unwrap()),
                    payload,
                })
            }
            Some(&FEEDBACK_K) => {
                if buf.len() < FEEDBACK_SIZE {
                    return Err(truncated("feedback"));
                }

                Ok(Datagram::Feedback {
                    seq: u64::from_be_bytes(buf[1..1 + SEQ_SIZE].try_into().unwrap()),
                    recv_ts: f64::from_be_bytes(buf[1 + SEQ_SIZE..FEEDBACK_SIZE].try_into().unwrap()),
                })
            }
            Some(&kind) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown datagram kind {kind}"),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "empty datagram",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrip() {
        let payload = [7_u8; 32];
        let datagram = Datagram::Data {
            seq: 99,
            send_ts: 1.25,
            payload: &payload,
        };

        let mut buf = Vec::new();
        datagram.encode(&mut buf);
        assert_eq!(buf.len(), DATA_OVERHEAD + payload.len());

        assert_eq!(Datagram::decode(&buf).unwrap(), datagram);
    }

    #[test]
    fn feedback_roundtrip() {
        let datagram = Datagram::Feedback {
            seq: u64::MAX,
            recv_ts: -0.5,
        };

        let mut buf = Vec::new();
        datagram.encode(&mut buf);
        assert_eq!(buf.len(), FEEDBACK_SIZE);

        assert_eq!(Datagram::decode(&buf).unwrap(), datagram);
    }

    #[test]
    fn rejects_truncated_and_unknown() {
        assert!(Datagram::decode(&[]).is_err());
        assert!(Datagram::decode(&[DATA_K, 1, 2]).is_err());
        assert!(Datagram::decode(&[FEEDBACK_K; FEEDBACK_SIZE - 1]).is_err());
        assert!(Datagram::decode(&[0xff, 0, 0]).is_err());
    }
}
