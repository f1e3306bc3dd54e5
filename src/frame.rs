//! Control frames carried on the multiplexer's wakeup pipe.
//!
//! Each frame is written in a single pipe write: a `u32` little-endian
//! length covering the body, then the body (kind tag plus fields in
//! declaration order). Bounding the whole frame by PIPE_BUF keeps the
//! write atomic, so the loop never observes an interleaved frame.

use bytes::BytesMut;

use crate::codec::{BinaryDeserializer, BinarySerializer};
use crate::error::{Error, Result};
use crate::operation::Operation;

/// Largest permitted frame body. Together with the 4-byte length prefix
/// this stays within the smallest POSIX PIPE_BUF guarantee (512), leaving
/// ample room under the 4096 bytes Linux and the BSDs provide.
pub const MAX_BODY_LEN: usize = 508;

const KIND_SHUTDOWN: u8 = 0x01;
const KIND_ADD: u8 = 0x02;
const KIND_ENABLE: u8 = 0x03;
const KIND_DISABLE: u8 = 0x04;
const KIND_SET_TIMEOUT: u8 = 0x05;
const KIND_CANCEL_TIMEOUT: u8 = 0x06;

/// One mutation request posted by a non-loop thread.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ControlFrame {
    /// Stop the event loop after the current iteration.
    Shutdown,
    /// Hand a socket to the loop; the factory builds its manager from
    /// `factory_key` and `args`.
    Add {
        socket_id: i32,
        factory_key: u16,
        args: Vec<u8>,
    },
    /// Union `op` into the socket's interest mask.
    Enable { socket_id: i32, op: Operation },
    /// Subtract `op`; drop the manager when the mask empties and `remove`
    /// is set.
    Disable {
        socket_id: i32,
        op: Operation,
        remove: bool,
    },
    /// Schedule a timeout for the socket's manager. No id is reported back
    /// to the poster; schedule from the loop thread when the id is needed.
    SetTimeout {
        socket_id: i32,
        when_ns_since_epoch: i64,
    },
    /// Remove a scheduled timeout by id.
    CancelTimeout { id: u64 },
}

impl ControlFrame {
    fn encode_body(&self, body: &mut BytesMut) {
        let mut bs = BinarySerializer::new(body);
        match self {
            ControlFrame::Shutdown => {
                bs.apply(&KIND_SHUTDOWN);
            }
            ControlFrame::Add {
                socket_id,
                factory_key,
                args,
            } => {
                bs.apply(&KIND_ADD)
                    .apply(socket_id)
                    .apply(factory_key)
                    .apply(args);
            }
            ControlFrame::Enable { socket_id, op } => {
                bs.apply(&KIND_ENABLE).apply(socket_id).apply(&op.bits());
            }
            ControlFrame::Disable {
                socket_id,
                op,
                remove,
            } => {
                bs.apply(&KIND_DISABLE)
                    .apply(socket_id)
                    .apply(&op.bits())
                    .apply(&u8::from(*remove));
            }
            ControlFrame::SetTimeout {
                socket_id,
                when_ns_since_epoch,
            } => {
                bs.apply(&KIND_SET_TIMEOUT)
                    .apply(socket_id)
                    .apply(when_ns_since_epoch);
            }
            ControlFrame::CancelTimeout { id } => {
                bs.apply(&KIND_CANCEL_TIMEOUT).apply(id);
            }
        }
    }

    /// Encodes the frame with its length prefix, ready for a single pipe
    /// write. Fails if the body would exceed [`MAX_BODY_LEN`].
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body);
        if body.len() > MAX_BODY_LEN {
            return Err(Error::InvalidArgument(format!(
                "control frame body of {} bytes exceeds the atomic-write bound",
                body.len()
            )));
        }
        BinarySerializer::new(buf).apply(&(body.len() as u32));
        buf.extend_from_slice(&body);
        Ok(())
    }

    /// Decodes one frame body (the bytes after the length prefix).
    pub fn decode(body: &[u8]) -> Result<ControlFrame> {
        let mut input = BinaryDeserializer::new(body);
        let kind: u8 = input.apply()?;
        let frame = match kind {
            KIND_SHUTDOWN => ControlFrame::Shutdown,
            KIND_ADD => ControlFrame::Add {
                socket_id: input.apply()?,
                factory_key: input.apply()?,
                args: input.apply()?,
            },
            KIND_ENABLE => ControlFrame::Enable {
                socket_id: input.apply()?,
                op: decode_op(&mut input)?,
            },
            KIND_DISABLE => ControlFrame::Disable {
                socket_id: input.apply()?,
                op: decode_op(&mut input)?,
                remove: input.apply::<u8>()? != 0,
            },
            KIND_SET_TIMEOUT => ControlFrame::SetTimeout {
                socket_id: input.apply()?,
                when_ns_since_epoch: input.apply()?,
            },
            KIND_CANCEL_TIMEOUT => ControlFrame::CancelTimeout {
                id: input.apply()?,
            },
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown control frame kind {other:#04x}"
                )));
            }
        };
        if !input.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{} trailing bytes after control frame",
                input.remaining()
            )));
        }
        Ok(frame)
    }
}

fn decode_op(input: &mut BinaryDeserializer<'_>) -> Result<Operation> {
    let bits: u8 = input.apply()?;
    Operation::from_bits(bits)
        .ok_or_else(|| Error::InvalidArgument(format!("bad operation bits {bits:#04x}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(frame: ControlFrame) {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        let len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len() - 4);
        assert_eq!(ControlFrame::decode(&buf[4..]).unwrap(), frame);
    }

    #[test]
    fn round_trips() {
        round_trip(ControlFrame::Shutdown);
        round_trip(ControlFrame::Add {
            socket_id: 17,
            factory_key: 3,
            args: b"ping".to_vec(),
        });
        round_trip(ControlFrame::Enable {
            socket_id: 4,
            op: Operation::WRITE,
        });
        round_trip(ControlFrame::Disable {
            socket_id: 4,
            op: Operation::READ_WRITE,
            remove: true,
        });
        round_trip(ControlFrame::SetTimeout {
            socket_id: 9,
            when_ns_since_epoch: 1_234_567_890,
        });
        round_trip(ControlFrame::CancelTimeout { id: 42 });
    }

    #[test]
    fn shutdown_layout() {
        let mut buf = BytesMut::new();
        ControlFrame::Shutdown.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x01, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn enable_layout() {
        let mut buf = BytesMut::new();
        ControlFrame::Enable {
            socket_id: 7,
            op: Operation::READ_WRITE,
        }
        .encode(&mut buf)
        .unwrap();
        // length 6, kind 0x03, socket_id 7 LE, op bits 0b11
        assert_eq!(
            &buf[..],
            &[0x06, 0x00, 0x00, 0x00, 0x03, 0x07, 0x00, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn oversized_args_rejected() {
        let frame = ControlFrame::Add {
            socket_id: 1,
            factory_key: 0,
            args: vec![0u8; MAX_BODY_LEN],
        };
        let mut buf = BytesMut::new();
        assert!(frame.encode(&mut buf).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(ControlFrame::decode(&[]).is_err());
        assert!(ControlFrame::decode(&[0xFF]).is_err());
        // Enable frame with trailing junk.
        assert!(ControlFrame::decode(&[0x03, 7, 0, 0, 0, 0x01, 0xAA]).is_err());
        // Enable frame with bad operation bits.
        assert!(ControlFrame::decode(&[0x03, 7, 0, 0, 0, 0x07]).is_err());
    }
}
