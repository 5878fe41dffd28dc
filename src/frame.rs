//! The WebSocket frame codec: a streaming parser and a serializer for a
//! single frame (FIN/RSV/opcode/mask/length/payload), including the
//! fragmentation-relevant bits (FIN, opcode).
//!
//! The parser is decoupled from I/O — it drains complete frames out of a
//! growing [`BytesMut`] — so the property law in the specification
//! (`parse(serialize(frame)) == frame`) can be tested directly, the same
//! shape as `WebSocket::parse_frame_header` in the teacher crate but with
//! the read loop pulled out into the connection state machine (C6).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WebSocketError;
use crate::mask::apply_mask;

/// Default bound on a single frame's payload length (independent of the
/// connection-level `max_message_size` bound on a reassembled message).
pub const DEFAULT_MAX_FRAME_PAYLOAD: u64 = 100 * 1024 * 1024;

/// The six opcodes defined by RFC 6455. Reserved opcodes (3-7, 11-15) never
/// construct this type — [`OpCode::try_from`] rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(self) -> bool {
        !self.is_control()
    }

    fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(WebSocketError::InvalidOpcode(other)),
        }
    }
}

/// The header fields of a parsed frame, excluding the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }
}

/// A single complete WebSocket frame: header plus already-unmasked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload: Bytes) -> Frame {
        Frame {
            header: FrameHeader {
                fin,
                rsv1: false,
                rsv2: false,
                rsv3: false,
                opcode,
                mask,
            },
            payload,
        }
    }

    pub fn text(payload: Bytes, mask: Option<[u8; 4]>) -> Frame {
        Frame::new(true, OpCode::Text, mask, payload)
    }

    pub fn binary(payload: Bytes, mask: Option<[u8; 4]>) -> Frame {
        Frame::new(true, OpCode::Binary, mask, payload)
    }

    pub fn ping(payload: Bytes, mask: Option<[u8; 4]>) -> Frame {
        Frame::new(true, OpCode::Ping, mask, payload)
    }

    pub fn pong(payload: Bytes, mask: Option<[u8; 4]>) -> Frame {
        Frame::new(true, OpCode::Pong, mask, payload)
    }

    pub fn close(payload: Bytes, mask: Option<[u8; 4]>) -> Frame {
        Frame::new(true, OpCode::Close, mask, payload)
    }

    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    pub fn fin(&self) -> bool {
        self.header.fin
    }

    /// Serializes this frame to wire bytes, masking the payload in the
    /// output (not in place) when `header.mask` is set.
    pub fn encode(&self) -> BytesMut {
        encode_frame(
            self.header.opcode,
            self.header.fin,
            self.header.mask,
            &self.payload,
        )
    }
}

/// Serializes just the frame header (first byte, length field, and mask
/// key if present) for `payload_len` bytes of payload. Used by
/// [`crate::message::Message::prepare`] to build a header buffer that can
/// be written in the same vectored write as an already-masked payload,
/// without copying the payload through this function.
pub fn encode_header(opcode: OpCode, fin: bool, mask: Option<[u8; 4]>, payload_len: usize) -> BytesMut {
    let mut header_len = 2;
    if payload_len > 65535 {
        header_len += 8;
    } else if payload_len > 125 {
        header_len += 2;
    }
    if mask.is_some() {
        header_len += 4;
    }

    let mut out = BytesMut::with_capacity(header_len);
    let first_byte = (if fin { 0b1000_0000 } else { 0 }) | opcode.as_u8();
    out.put_u8(first_byte);

    let mask_bit = if mask.is_some() { 0b1000_0000 } else { 0 };
    if payload_len > 65535 {
        out.put_u8(mask_bit | 127);
        out.put_u64(payload_len as u64);
    } else if payload_len > 125 {
        out.put_u8(mask_bit | 126);
        out.put_u16(payload_len as u16);
    } else {
        out.put_u8(mask_bit | payload_len as u8);
    }

    if let Some(key) = mask {
        out.put_slice(&key);
    }

    out
}

/// Serializes a frame header + payload to wire bytes. When `mask` is
/// `Some`, the returned payload bytes are masked; `payload` itself is left
/// untouched.
pub fn encode_frame(opcode: OpCode, fin: bool, mask: Option<[u8; 4]>, payload: &[u8]) -> BytesMut {
    let mut out = encode_header(opcode, fin, mask, payload.len());
    let start = out.len();
    out.put_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut out[start..], key);
    }
    out
}

/// Incremental byte-counting parser for WebSocket frames.
///
/// Call [`decode`](FrameDecoder::decode) each time more bytes are appended
/// to a shared [`BytesMut`]; it returns `Ok(None)` if the buffer does not
/// yet hold a whole frame (leaving the buffer untouched so the caller can
/// append more and retry), `Ok(Some(frame))` with the consumed bytes
/// advanced out of the buffer, or `Err` on a fatal protocol violation.
pub struct FrameDecoder {
    max_payload: u64,
    /// `true` when decoding frames coming from a client (peer must mask);
    /// `false` for frames coming from a server (peer must not mask).
    expect_masked: bool,
}

impl FrameDecoder {
    pub fn new(expect_masked: bool) -> FrameDecoder {
        FrameDecoder {
            max_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            expect_masked,
        }
    }

    pub fn with_max_payload(mut self, max_payload: u64) -> FrameDecoder {
        self.max_payload = max_payload;
        self
    }

    /// Attempts to decode one frame from the front of `buf`. The payload in
    /// the returned frame is already unmasked.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, WebSocketError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];

        let fin = b0 & 0b1000_0000 != 0;
        let rsv1 = b0 & 0b0100_0000 != 0;
        let rsv2 = b0 & 0b0010_0000 != 0;
        let rsv3 = b0 & 0b0001_0000 != 0;
        if rsv1 || rsv2 || rsv3 {
            return Err(WebSocketError::InvalidRsvBit);
        }

        let opcode = OpCode::try_from(b0 & 0b0000_1111)?;

        let masked = b1 & 0b1000_0000 != 0;
        if masked != self.expect_masked {
            return Err(if self.expect_masked {
                WebSocketError::MaskingRequired
            } else {
                WebSocketError::MaskingForbidden
            });
        }

        if opcode.is_control() && !fin {
            return Err(WebSocketError::FragmentedControl);
        }

        let len_code = b1 & 0x7F;
        let (len_field_size, basic_len) = match len_code {
            126 => (2usize, None),
            127 => (8usize, None),
            n => (0usize, Some(n as u64)),
        };

        let mut cursor = 2usize;
        let payload_len = match basic_len {
            Some(n) => n,
            None => {
                if buf.len() < cursor + len_field_size {
                    return Ok(None);
                }
                let len = if len_field_size == 2 {
                    u16::from_be_bytes([buf[cursor], buf[cursor + 1]]) as u64
                } else {
                    u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap())
                };
                cursor += len_field_size;
                len
            }
        };

        if opcode.is_control() && payload_len > 125 {
            return Err(WebSocketError::ControlTooBig);
        }
        if payload_len > self.max_payload {
            return Err(WebSocketError::MessageTooBig);
        }

        let mask_key = if masked {
            if buf.len() < cursor + 4 {
                return Ok(None);
            }
            let key: [u8; 4] = buf[cursor..cursor + 4].try_into().unwrap();
            cursor += 4;
            Some(key)
        } else {
            None
        };

        let total_len = cursor + payload_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(cursor);
        let mut payload = buf.split_to(payload_len as usize);
        if let Some(key) = mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Frame {
            header: FrameHeader {
                fin,
                rsv1,
                rsv2,
                rsv3,
                opcode,
                mask: mask_key,
            },
            payload: payload.freeze(),
        }))
    }
}
