//! Incremental HTTP/1.1 request parsing and serialization.
//!
//! Mirrors `websocketpp::http::parser::request`: a method/target/version
//! start line, an ordered case-insensitive header map, and an optional body
//! sized by `Content-Length` or `Transfer-Encoding: chunked`. `consume`
//! drains bytes directly out of the caller's buffer (the same pattern as
//! [`crate::frame::FrameDecoder::decode`]), so any bytes that arrive after
//! the terminating blank line — e.g. the first WebSocket frame, coalesced
//! with the upgrade request in the same TCP segment — are left untouched
//! in the caller's buffer instead of being swallowed here.

use bytes::{Buf, BytesMut};

use super::body::{body_mode, BodyMode, ChunkedDecoder};
use super::headers::HeaderMap;
use crate::error::WebSocketError;

const DEFAULT_MAX_HEADER_SIZE: usize = 16 * 1024;

fn is_token_char(b: u8) -> bool {
    b.is_ascii_graphic()
        && !matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'[' | b']' | b'?' | b'=' | b'{' | b'}'
        )
}

/// An HTTP/1.1 request, incrementally parsed or built field-by-field for
/// an outgoing client handshake.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    target: String,
    version: String,
    headers: HeaderMap,
    body: Vec<u8>,
    max_header_size: usize,
    header_bytes_seen: usize,
    headers_ready: bool,
    complete: bool,
    body_mode: Option<BodyMode>,
    chunked: Option<ChunkedDecoder>,
}

impl Default for Request {
    fn default() -> Self {
        Request {
            method: String::new(),
            target: String::new(),
            version: String::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            header_bytes_seen: 0,
            headers_ready: false,
            complete: false,
            body_mode: None,
            chunked: None,
        }
    }
}

impl Request {
    pub fn new() -> Request {
        Request::default()
    }

    pub fn with_max_header_size(max_header_size: usize) -> Request {
        Request {
            max_header_size,
            ..Request::default()
        }
    }

    /// Builds a request explicitly, for a client constructing an outbound
    /// handshake rather than parsing an inbound one.
    pub fn build(method: &str, target: &str, version: &str) -> Result<Request, WebSocketError> {
        if !method.bytes().all(is_token_char) || method.is_empty() {
            return Err(WebSocketError::BadRequest("invalid method token"));
        }
        let mut req = Request::default();
        req.method = method.to_string();
        req.target = target.to_string();
        req.version = version.to_string();
        req.headers_ready = true;
        req.complete = true;
        req.body_mode = Some(BodyMode::None);
        Ok(req)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.replace(name, value);
    }

    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.headers.replace("Content-Length", &body.len().to_string());
        self.body = body;
    }

    /// True once the header section has been fully parsed.
    pub fn headers_ready(&self) -> bool {
        self.headers_ready
    }

    /// True once the request (headers and any body) is fully parsed.
    pub fn is_ready(&self) -> bool {
        self.complete
    }

    /// Feeds bytes from `buf` into the parser, consuming as much as forms
    /// complete lines/body bytes and leaving the remainder untouched.
    pub fn consume(&mut self, buf: &mut BytesMut) -> Result<(), WebSocketError> {
        loop {
            if self.complete {
                return Ok(());
            }

            if !self.headers_ready {
                if self.header_bytes_seen + buf.len() > self.max_header_size {
                    return Err(WebSocketError::HeaderTooLarge);
                }
                let Some(line_len) = find_line(buf) else {
                    return Ok(());
                };
                let line = buf.split_to(line_len);
                buf.advance(2); // CRLF
                self.header_bytes_seen += line_len + 2;

                if line.is_empty() {
                    if self.method.is_empty() {
                        return Err(WebSocketError::BadRequest("incomplete request line"));
                    }
                    if self.header("Host").is_empty() {
                        return Err(WebSocketError::MissingRequiredHeader("Host"));
                    }
                    self.headers_ready = true;
                    let mode = body_mode(&self.headers)?;
                    if let BodyMode::Chunked = mode {
                        self.chunked = Some(ChunkedDecoder::new());
                    }
                    self.body_mode = Some(mode);
                    continue;
                }

                if self.method.is_empty() {
                    self.parse_start_line(&line)?;
                } else {
                    self.parse_header_line(&line)?;
                }
                continue;
            }

            match self.body_mode.as_ref().expect("set when headers_ready") {
                BodyMode::None => {
                    self.complete = true;
                }
                BodyMode::ContentLength(len) => {
                    let len = *len;
                    if buf.len() < len {
                        return Ok(());
                    }
                    self.body = buf.split_to(len).to_vec();
                    self.complete = true;
                }
                BodyMode::Chunked => {
                    let decoder = self.chunked.as_mut().expect("set for chunked mode");
                    match decoder.feed(buf)? {
                        None => return Ok(()),
                        Some(consumed) => {
                            buf.advance(consumed);
                            self.body = self.chunked.take().unwrap().into_body();
                            self.complete = true;
                        }
                    }
                }
            }
        }
    }

    fn parse_start_line(&mut self, line: &[u8]) -> Result<(), WebSocketError> {
        let line = std::str::from_utf8(line).map_err(|_| WebSocketError::BadRequest("non-UTF-8 request line"))?;
        let mut parts = line.splitn(3, ' ');
        let method = parts.next().unwrap_or("");
        let target = parts.next().ok_or(WebSocketError::BadRequest("missing request target"))?;
        let version = parts.next().ok_or(WebSocketError::BadRequest("missing HTTP version"))?;

        if method.is_empty() || !method.bytes().all(is_token_char) {
            return Err(WebSocketError::BadRequest("invalid method token"));
        }

        self.method = method.to_string();
        self.target = target.to_string();
        self.version = version.to_string();
        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<(), WebSocketError> {
        let line = std::str::from_utf8(line).map_err(|_| WebSocketError::BadRequest("non-UTF-8 header line"))?;
        match line.split_once(':') {
            Some((name, value)) => {
                self.headers.append(name.trim(), value.trim());
            }
            // A line with no colon is ignored, not fatal (§4.2 edge case).
            None => {}
        }
        Ok(())
    }

    /// Serializes this request back to wire bytes with canonical CRLF
    /// termination and a trailing blank line.
    pub fn raw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

fn find_line(buf: &BytesMut) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_handshake_request() {
        let mut req = Request::new();
        let data = b"GET / HTTP/1.1\r\nHost: www.example.com\r\nConnection: upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nOrigin: http://www.example.com\r\n\r\n";
        let mut buf = BytesMut::from(&data[..]);
        req.consume(&mut buf).unwrap();
        assert!(req.is_ready());
        assert_eq!(req.method(), "GET");
        assert_eq!(req.target(), "/");
        assert_eq!(req.header("Host"), "www.example.com");
        assert_eq!(req.header("Sec-WebSocket-Key"), "dGhlIHNhbXBsZSBub25jZQ==");
        assert!(buf.is_empty());
    }

    #[test]
    fn leaves_trailing_bytes_for_the_frame_reader() {
        let mut req = Request::new();
        let mut data = b"GET / HTTP/1.1\r\nHost: h\r\n\r\n".to_vec();
        data.extend_from_slice(&[0x82, 0x00]); // a coalesced empty binary frame
        let mut buf = BytesMut::from(&data[..]);
        req.consume(&mut buf).unwrap();
        assert!(req.is_ready());
        assert_eq!(&buf[..], &[0x82, 0x00]);
    }

    #[test]
    fn incremental_feed_across_many_small_chunks() {
        let mut req = Request::new();
        let data = b"GET / HTTP/1.1\r\nHost: h\r\n\r\n";
        let mut buf = BytesMut::new();
        for byte in data {
            buf.extend_from_slice(&[*byte]);
            req.consume(&mut buf).unwrap();
        }
        assert!(req.is_ready());
    }

    #[test]
    fn missing_host_is_an_error() {
        let mut req = Request::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);
        assert!(req.consume(&mut buf).is_err());
    }

    #[test]
    fn oversized_headers_are_rejected() {
        let mut req = Request::with_max_header_size(32);
        let mut buf = BytesMut::from(&b"GET /this/is/a/long/path/that/is/too/long HTTP/1.1\r\n"[..]);
        assert!(matches!(
            req.consume(&mut buf),
            Err(WebSocketError::HeaderTooLarge)
        ));
    }

    #[test]
    fn colon_less_header_line_is_ignored_not_fatal() {
        let mut req = Request::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: h\r\ngarbage line no colon\r\n\r\n"[..]);
        req.consume(&mut buf).unwrap();
        assert!(req.is_ready());
    }

    #[test]
    fn content_length_body_is_parsed() {
        let mut req = Request::new();
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello"[..]);
        req.consume(&mut buf).unwrap();
        assert!(req.is_ready());
        assert_eq!(req.body(), b"hello");
    }

    #[test]
    fn raw_round_trips_a_built_request() {
        let mut req = Request::build("GET", "/chat", "HTTP/1.1").unwrap();
        req.set_header("Host", "example.com");
        let raw = req.raw();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
