//! The processor shared by protocol versions 7, 8 and 13 — the drafts and
//! the final RFC 6455 text that differ only in a handful of inert details
//! (none of which affect wire framing or key derivation), so one type
//! serves all three.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rand::RngCore;

use super::Processor;
use crate::close::CloseCode;
use crate::config::{DefaultMessageAllocator, MessageAllocator};
use crate::error::{Result, WebSocketError};
use crate::frame::{FrameDecoder, OpCode};
use crate::handshake;
use crate::http::{Request, Response};
use crate::mask::generate_mask;
use crate::message::Message;
use crate::uri::Uri;
use crate::utf8::Utf8Validator;
use crate::Role;

/// In-progress reassembly state for a fragmented data message.
struct Fragmentation {
    opcode: OpCode,
    buffer: BytesMut,
    utf8: Option<Utf8Validator>,
}

pub struct Hybi {
    version: u8,
    role: Role,
    decoder: FrameDecoder,
    max_message_size: u64,
    fragmentation: Option<Fragmentation>,
    pending: VecDeque<Message>,
    allocator: Arc<dyn MessageAllocator>,
}

impl Hybi {
    pub fn new(version: u8, role: Role, max_message_size: u64) -> Hybi {
        Hybi::with_allocator(version, role, max_message_size, Arc::new(DefaultMessageAllocator))
    }

    pub fn with_allocator(version: u8, role: Role, max_message_size: u64, allocator: Arc<dyn MessageAllocator>) -> Hybi {
        let expect_masked = matches!(role, Role::Server);
        Hybi {
            version,
            role,
            decoder: FrameDecoder::new(expect_masked),
            max_message_size,
            fragmentation: None,
            pending: VecDeque::new(),
            allocator,
        }
    }

    fn is_client(&self) -> bool {
        matches!(self.role, Role::Client)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    fn check_message_size(&self, len: usize) -> Result<()> {
        if len as u64 > self.max_message_size {
            Err(WebSocketError::MessageTooBig)
        } else {
            Ok(())
        }
    }
}

impl Processor for Hybi {
    fn validate_handshake(&self, req: &Request) -> Result<()> {
        if req.method() != "GET" {
            return Err(WebSocketError::InvalidHttpMethod);
        }
        if !(req.version() == "HTTP/1.1" || req.version() == "HTTP/2" || req.version() == "HTTP/2.0") {
            return Err(WebSocketError::InvalidHttpVersion);
        }
        if req.header("Host").is_empty() {
            return Err(WebSocketError::MissingRequiredHeader("Host"));
        }
        if !req.headers().contains_token_ci("Upgrade", "websocket") {
            return Err(WebSocketError::MissingRequiredHeader("Upgrade"));
        }
        if !req.headers().contains_token_ci("Connection", "upgrade") {
            return Err(WebSocketError::MissingRequiredHeader("Connection"));
        }
        if req.header("Sec-WebSocket-Key").is_empty() {
            return Err(WebSocketError::MissingRequiredHeader("Sec-WebSocket-Key"));
        }
        Ok(())
    }

    fn process_handshake(&self, req: &Request, selected_subprotocol: Option<&str>, user_agent: &str) -> Result<Response> {
        let accept = handshake::accept_key(req.header("Sec-WebSocket-Key"));
        let mut res = Response::build("HTTP/1.1", 101, "Switching Protocols");
        res.set_header("Upgrade", "websocket");
        res.set_header("Connection", "Upgrade");
        res.set_header("Sec-WebSocket-Accept", &accept);
        res.set_header("Server", user_agent);
        if let Some(protocol) = selected_subprotocol {
            res.set_header("Sec-WebSocket-Protocol", protocol);
        }
        Ok(res)
    }

    fn validate_server_handshake_response(&self, client_key: &str, res: &Response) -> Result<()> {
        if res.status_code() != 101 {
            return Err(WebSocketError::ServerHandshakeMismatch);
        }
        if !res.headers().contains_token_ci("Upgrade", "websocket") {
            return Err(WebSocketError::ServerHandshakeMismatch);
        }
        if !res.headers().contains_token_ci("Connection", "upgrade") {
            return Err(WebSocketError::ServerHandshakeMismatch);
        }
        if !handshake::verify_accept(client_key, res.header("Sec-WebSocket-Accept")) {
            return Err(WebSocketError::ServerHandshakeMismatch);
        }
        Ok(())
    }

    fn consume(&mut self, buf: &mut BytesMut) -> Result<()> {
        loop {
            let Some(frame) = self.decoder.decode(buf)? else {
                return Ok(());
            };
            let opcode = frame.opcode();

            if opcode.is_control() {
                self.pending.push_back(self.allocator.incoming(opcode, frame.payload));
                continue;
            }

            match opcode {
                OpCode::Continuation => {
                    let Some(frag) = self.fragmentation.as_mut() else {
                        return Err(WebSocketError::InvalidContinuation);
                    };
                    self.check_message_size(frag.buffer.len() + frame.payload.len())?;
                    if let Some(validator) = frag.utf8.as_mut() {
                        if !validator.consume_slice(&frame.payload) {
                            return Err(WebSocketError::InvalidUtf8);
                        }
                    }
                    frag.buffer.extend_from_slice(&frame.payload);
                    if frame.fin() {
                        let frag = self.fragmentation.take().unwrap();
                        if let Some(validator) = &frag.utf8 {
                            if !validator.complete() {
                                return Err(WebSocketError::InvalidUtf8);
                            }
                        }
                        self.pending.push_back(self.allocator.incoming(frag.opcode, frag.buffer.freeze()));
                    }
                }
                OpCode::Text | OpCode::Binary => {
                    if self.fragmentation.is_some() {
                        return Err(WebSocketError::InvalidContinuation);
                    }
                    self.check_message_size(frame.payload.len())?;
                    if frame.fin() {
                        if opcode == OpCode::Text && !crate::utf8::is_valid_utf8(&frame.payload) {
                            return Err(WebSocketError::InvalidUtf8);
                        }
                        self.pending.push_back(self.allocator.incoming(opcode, frame.payload));
                    } else {
                        let mut utf8 = (opcode == OpCode::Text).then(Utf8Validator::new);
                        if let Some(validator) = utf8.as_mut() {
                            if !validator.consume_slice(&frame.payload) {
                                return Err(WebSocketError::InvalidUtf8);
                            }
                        }
                        self.fragmentation = Some(Fragmentation {
                            opcode,
                            buffer: BytesMut::from(&frame.payload[..]),
                            utf8,
                        });
                    }
                }
                OpCode::Close | OpCode::Ping | OpCode::Pong => unreachable!("handled above as control frames"),
            }
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
    }

    fn get_message(&mut self) -> Option<Message> {
        self.pending.pop_front()
    }

    fn prepare_data_frame(&self, opcode: OpCode, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message> {
        if opcode == OpCode::Text && !crate::utf8::is_valid_utf8(&payload) {
            return Err(WebSocketError::InvalidUtf8);
        }
        let mask = self.is_client().then(|| generate_mask(rng));
        let mut msg = self.allocator.outgoing(opcode, payload);
        msg.prepare(mask);
        Ok(msg)
    }

    fn prepare_ping(&self, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message> {
        if payload.len() > 125 {
            return Err(WebSocketError::ControlTooBig);
        }
        let mask = self.is_client().then(|| generate_mask(rng));
        let mut msg = self.allocator.outgoing(OpCode::Ping, payload);
        msg.prepare(mask);
        Ok(msg)
    }

    fn prepare_pong(&self, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message> {
        if payload.len() > 125 {
            return Err(WebSocketError::ControlTooBig);
        }
        let mask = self.is_client().then(|| generate_mask(rng));
        let mut msg = self.allocator.outgoing(OpCode::Pong, payload);
        msg.prepare(mask);
        Ok(msg)
    }

    fn prepare_close(&self, code: CloseCode, reason: &str, silent: bool, rng: &mut dyn RngCore) -> Result<Message> {
        let payload = if silent {
            Vec::new()
        } else {
            crate::close::build_payload(code, reason)
        };
        let mask = self.is_client().then(|| generate_mask(rng));
        let mut msg = self.allocator.outgoing(OpCode::Close, Bytes::from(payload));
        msg.prepare(mask);
        Ok(msg)
    }
}

/// Builds an outbound client handshake request for protocol version 13
/// (the version this crate always offers — there's no benefit to clients
/// negotiating the older drafts).
pub fn client_handshake_request(uri: &Uri, subprotocols: &[String], user_agent: &str) -> Request {
    let mut req = Request::build("GET", uri.resource(), "HTTP/1.1").expect("GET is a valid token");
    req.set_header("Host", &uri.host_port());
    req.set_header("Upgrade", "websocket");
    req.set_header("Connection", "Upgrade");
    req.set_header("Sec-WebSocket-Key", &handshake::generate_key());
    req.set_header("Sec-WebSocket-Version", "13");
    req.set_header("User-Agent", user_agent);
    if !subprotocols.is_empty() {
        req.set_header("Sec-WebSocket-Protocol", &subprotocols.join(", "));
    }
    req
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn frame_bytes(opcode: OpCode, fin: bool, mask: Option<[u8; 4]>, payload: &[u8]) -> BytesMut {
        crate::frame::encode_frame(opcode, fin, mask, payload)
    }

    #[test]
    fn validates_a_well_formed_handshake() {
        let mut req = Request::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: h\r\nUpgrade: websocket\r\nConnection: upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"[..]);
        req.consume(&mut buf).unwrap();
        let processor = Hybi::new(13, Role::Server, 1024);
        assert!(processor.validate_handshake(&req).is_ok());
    }

    #[test]
    fn rejects_missing_upgrade_header() {
        let mut req = Request::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: h\r\nConnection: upgrade\r\nSec-WebSocket-Key: k\r\n\r\n"[..]);
        req.consume(&mut buf).unwrap();
        let processor = Hybi::new(13, Role::Server, 1024);
        assert!(processor.validate_handshake(&req).is_err());
    }

    #[test]
    fn process_handshake_computes_accept_key() {
        let mut req = Request::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: h\r\nUpgrade: websocket\r\nConnection: upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"[..]);
        req.consume(&mut buf).unwrap();
        let processor = Hybi::new(13, Role::Server, 1024);
        let res = processor.process_handshake(&req, None, "wscore/0.1.0").unwrap();
        assert_eq!(res.header("Sec-WebSocket-Accept"), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn consume_reassembles_a_fragmented_message_with_an_interleaved_ping() {
        let mut processor = Hybi::new(13, Role::Server, 1 << 20);
        let mask = Some([0x12, 0x34, 0x56, 0x78]);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame_bytes(OpCode::Text, false, mask, b"*"));
        buf.extend_from_slice(&frame_bytes(OpCode::Ping, true, mask, b""));
        buf.extend_from_slice(&frame_bytes(OpCode::Continuation, true, mask, b"*"));
        processor.consume(&mut buf).unwrap();

        let first = processor.get_message().unwrap();
        assert_eq!(first.opcode(), OpCode::Ping);
        let second = processor.get_message().unwrap();
        assert_eq!(second.opcode(), OpCode::Text);
        assert_eq!(second.payload().as_ref(), b"**");
        assert!(processor.get_message().is_none());
    }

    #[test]
    fn consume_rejects_unmasked_client_frame() {
        let mut processor = Hybi::new(13, Role::Server, 1024);
        let mut buf = frame_bytes(OpCode::Text, true, None, b"hi");
        assert!(matches!(processor.consume(&mut buf), Err(WebSocketError::MaskingRequired)));
    }

    #[test]
    fn prepare_data_frame_rejects_invalid_utf8_text() {
        let processor = Hybi::new(13, Role::Server, 1024);
        let mut rng = rand::thread_rng();
        let result = processor.prepare_data_frame(OpCode::Text, Bytes::from_static(&[0xFF, 0xFE]), &mut rng);
        assert!(matches!(result, Err(WebSocketError::InvalidUtf8)));
    }

    #[test]
    fn client_masks_outgoing_frames_server_does_not() {
        let mut rng = rand::thread_rng();
        let client = Hybi::new(13, Role::Client, 1024);
        let msg = client.prepare_data_frame(OpCode::Binary, Bytes::from_static(b"hi"), &mut rng).unwrap();
        assert_eq!(msg.header()[1] & 0x80, 0x80);

        let server = Hybi::new(13, Role::Server, 1024);
        let msg = server.prepare_data_frame(OpCode::Binary, Bytes::from_static(b"hi"), &mut rng).unwrap();
        assert_eq!(msg.header()[1] & 0x80, 0x00);
    }

    #[test]
    fn consume_and_prepare_route_through_a_custom_allocator() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct CountingAllocator {
            incoming: AtomicUsize,
            outgoing: AtomicUsize,
        }

        impl MessageAllocator for CountingAllocator {
            fn incoming(&self, opcode: OpCode, payload: Bytes) -> Message {
                self.incoming.fetch_add(1, Ordering::SeqCst);
                Message::incoming(opcode, payload)
            }

            fn outgoing(&self, opcode: OpCode, payload: Bytes) -> Message {
                self.outgoing.fetch_add(1, Ordering::SeqCst);
                Message::outgoing(opcode, payload)
            }
        }

        let allocator = Arc::new(CountingAllocator::default());
        let mut processor = Hybi::with_allocator(13, Role::Server, 1024, allocator.clone());

        let mut buf = frame_bytes(OpCode::Text, true, Some([1, 2, 3, 4]), b"hi");
        processor.consume(&mut buf).unwrap();
        assert!(processor.get_message().is_some());
        assert_eq!(allocator.incoming.load(Ordering::SeqCst), 1);

        let mut rng = rand::thread_rng();
        processor
            .prepare_data_frame(OpCode::Binary, Bytes::from_static(b"hi"), &mut rng)
            .unwrap();
        assert_eq!(allocator.outgoing.load(Ordering::SeqCst), 1);
    }
}
