//! [`Message`]: the data carrier handed between a processor and the user,
//! and between the user and a processor on the way back out.

use bytes::{Bytes, BytesMut};

use crate::frame::{encode_header, OpCode};
use crate::mask::apply_mask;

/// One complete logical WebSocket payload — already reassembled from any
/// fragmentation on the way in, or not yet framed on the way out.
///
/// `header` is only populated once [`Message::prepare`] has run; until
/// then it's empty and `prepared` is `false`. A prepared message's
/// `payload` is already masked if it carries a mask key, so the connection
/// can write `[header, payload]` as a single vectored write without
/// touching the payload bytes again.
#[derive(Debug, Clone)]
pub struct Message {
    opcode: OpCode,
    header: BytesMut,
    payload: Bytes,
    prepared: bool,
    terminal: bool,
}

impl Message {
    /// Wraps an already-reassembled incoming payload. Incoming messages are
    /// never "prepared" — that flag only applies to outgoing wire data.
    pub fn incoming(opcode: OpCode, payload: Bytes) -> Message {
        Message {
            opcode,
            header: BytesMut::new(),
            payload,
            prepared: false,
            terminal: opcode == OpCode::Close,
        }
    }

    /// Wraps raw outgoing data that still needs [`Message::prepare`].
    pub fn outgoing(opcode: OpCode, payload: Bytes) -> Message {
        Message {
            opcode,
            header: BytesMut::new(),
            payload,
            prepared: false,
            terminal: opcode == OpCode::Close,
        }
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Whether writing this message should be followed by closing the
    /// transport (set for close messages).
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Masks the payload in place (if `mask` is `Some`) and builds the wire
    /// header, marking this message ready for a single outgoing write.
    /// Idempotent: calling it twice re-masks and would corrupt the payload,
    /// so callers must only prepare a message once.
    pub fn prepare(&mut self, mask: Option<[u8; 4]>) {
        self.header = encode_header(self.opcode, true, mask, self.payload.len());
        if let Some(key) = mask {
            let mut buf = BytesMut::from(&self.payload[..]);
            apply_mask(&mut buf, key);
            self.payload = buf.freeze();
        }
        self.prepared = true;
    }

    /// Total bytes a write of this prepared message will put on the wire.
    pub fn wire_len(&self) -> usize {
        self.header.len() + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_builds_a_decodable_header_and_masks_the_payload() {
        let mut msg = Message::outgoing(OpCode::Text, Bytes::from_static(b"hi"));
        msg.prepare(Some([1, 2, 3, 4]));
        assert!(msg.is_prepared());
        assert_ne!(msg.payload().as_ref(), b"hi");

        let mut wire = BytesMut::new();
        wire.extend_from_slice(msg.header());
        wire.extend_from_slice(msg.payload());
        let decoder = crate::frame::FrameDecoder::new(true);
        let frame = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"hi");
    }

    #[test]
    fn unmasked_prepare_leaves_payload_untouched() {
        let mut msg = Message::outgoing(OpCode::Binary, Bytes::from_static(b"data"));
        msg.prepare(None);
        assert_eq!(msg.payload().as_ref(), b"data");
    }

    #[test]
    fn close_opcode_is_terminal() {
        let msg = Message::incoming(OpCode::Close, Bytes::new());
        assert!(msg.is_terminal());
        let msg = Message::incoming(OpCode::Text, Bytes::new());
        assert!(!msg.is_terminal());
    }
}
