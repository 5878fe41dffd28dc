//! The legacy Hixie draft 75/76 ("hybi-00") handshake, gated behind the
//! `hybi00` feature. Grounded directly on `websocketpp::processor::hybi00`:
//! the three-part `key1`/`key2`/`key3` handshake is implemented faithfully,
//! including that source's own `decode_client_key` digit/space algorithm.
//!
//! The upstream `hybi00` processor never actually implemented post-
//! handshake framing (`consume`/`prepare_*` return `not_implemented`/
//! `no_protocol_support` there too) — draft 75/76 predates masking and
//! uses a 0x00/0xFF-delimited frame format with no deployed client left to
//! validate against, so this crate draws the same line: the handshake is
//! real, the data path is not implemented.

use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};
use rand::RngCore;

use super::Processor;
use crate::close::CloseCode;
use crate::error::{Result, WebSocketError};
use crate::frame::OpCode;
use crate::http::{Request, Response};
use crate::message::Message;
use crate::Role;

pub struct Hybi00 {
    #[allow(dead_code)]
    role: Role,
}

impl Hybi00 {
    pub fn new(role: Role) -> Hybi00 {
        Hybi00 { role }
    }
}

/// Reproduces `websocketpp::processor::hybi00::decode_client_key`: strip
/// everything but digits and count spaces, divide, and write the result as
/// 4 big-endian bytes (zero if the key was malformed rather than garbage).
fn decode_client_key(key: &str) -> [u8; 4] {
    let mut spaces: u32 = 0;
    let mut digits = String::new();
    for c in key.chars() {
        if c == ' ' {
            spaces += 1;
        } else if c.is_ascii_digit() {
            digits.push(c);
        }
    }
    let num: u32 = digits.parse().unwrap_or(0);
    if spaces > 0 && num > 0 {
        (num / spaces).to_be_bytes()
    } else {
        [0; 4]
    }
}

/// Builds the 16-byte key used as the MD5 input: `decode(key1) ++
/// decode(key2) ++ key3` (key3 is used as-is, up to 8 bytes, zero-padded —
/// the original leaves a short key3 undefined; zero-padding keeps this
/// deterministic instead of reading whatever happened to be on the stack).
fn build_key_final(key1: &str, key2: &str, key3: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&decode_client_key(key1));
    out[4..8].copy_from_slice(&decode_client_key(key2));
    let n = key3.len().min(8);
    out[8..8 + n].copy_from_slice(&key3[..n]);
    out
}

impl Processor for Hybi00 {
    fn validate_handshake(&self, req: &Request) -> Result<()> {
        if req.method() != "GET" {
            return Err(WebSocketError::InvalidHttpMethod);
        }
        if req.version() != "HTTP/1.1" {
            return Err(WebSocketError::InvalidHttpVersion);
        }
        if req.header("Sec-WebSocket-Key1").is_empty() {
            return Err(WebSocketError::MissingRequiredHeader("Sec-WebSocket-Key1"));
        }
        if req.header("Sec-WebSocket-Key2").is_empty() {
            return Err(WebSocketError::MissingRequiredHeader("Sec-WebSocket-Key2"));
        }
        if req.body().len() < 8 {
            return Err(WebSocketError::MissingRequiredHeader("Sec-WebSocket-Key3"));
        }
        Ok(())
    }

    fn process_handshake(&self, req: &Request, _selected_subprotocol: Option<&str>, _user_agent: &str) -> Result<Response> {
        let key3 = req.body();
        let key_final = build_key_final(req.header("Sec-WebSocket-Key1"), req.header("Sec-WebSocket-Key2"), key3);

        let mut hasher = Md5::new();
        hasher.update(key_final);
        let digest = hasher.finalize();

        let mut res = Response::build("HTTP/1.1", 101, "WebSocket Protocol Handshake");
        res.set_header("Upgrade", "WebSocket");
        res.set_header("Connection", "Upgrade");
        if !req.header("Origin").is_empty() {
            res.set_header("Sec-WebSocket-Origin", req.header("Origin"));
        }
        if !req.header("Host").is_empty() {
            res.set_header("Sec-WebSocket-Location", &format!("ws://{}{}", req.header("Host"), req.target()));
        }
        res.set_body(digest.to_vec());
        Ok(res)
    }

    fn validate_server_handshake_response(&self, _client_key: &str, _res: &Response) -> Result<()> {
        // Outbound hybi-00 client connections are not supported, matching
        // the original processor's `no_protocol_support` stance.
        Err(WebSocketError::UnsupportedVersion)
    }

    fn consume(&mut self, _buf: &mut BytesMut) -> Result<()> {
        Err(WebSocketError::UnsupportedVersion)
    }

    fn ready(&self) -> bool {
        false
    }

    fn get_message(&mut self) -> Option<Message> {
        None
    }

    fn prepare_data_frame(&self, _opcode: OpCode, _payload: Bytes, _rng: &mut dyn RngCore) -> Result<Message> {
        Err(WebSocketError::UnsupportedVersion)
    }

    fn prepare_ping(&self, _payload: Bytes, _rng: &mut dyn RngCore) -> Result<Message> {
        Err(WebSocketError::UnsupportedVersion)
    }

    fn prepare_pong(&self, _payload: Bytes, _rng: &mut dyn RngCore) -> Result<Message> {
        Err(WebSocketError::UnsupportedVersion)
    }

    fn prepare_close(&self, _code: CloseCode, _reason: &str, _silent: bool, _rng: &mut dyn RngCore) -> Result<Message> {
        Err(WebSocketError::UnsupportedVersion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_client_key_divides_digits_by_space_count() {
        // RFC 6455 appendix / Hixie draft worked example.
        assert_eq!(decode_client_key("18x 6]8vM;54 *(5:  {   U1]8  z [  8"), 155712099u32.to_be_bytes());
    }

    #[test]
    fn malformed_key_decodes_to_zero() {
        assert_eq!(decode_client_key("no digits or spaces here"), [0, 0, 0, 0]);
    }

    #[test]
    fn process_handshake_produces_a_16_byte_digest_body() {
        let mut req = Request::build("GET", "/demo", "HTTP/1.1").unwrap();
        req.set_header("Host", "example.com");
        req.set_header("Sec-WebSocket-Key1", "4 @1  46546xW%0l 1 5");
        req.set_header("Sec-WebSocket-Key2", "12998 5 Y3 1  .P00");
        req.set_body(b"^n:ds[4U".to_vec());

        let processor = Hybi00::new(Role::Server);
        processor.validate_handshake(&req).unwrap();
        let res = processor.process_handshake(&req, None, "wscore/0.1.0").unwrap();
        assert_eq!(res.body().len(), 16);
        assert_eq!(res.header("Sec-WebSocket-Location"), "ws://example.com/demo");
    }
}
