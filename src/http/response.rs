//! Incremental HTTP/1.1 response parsing and serialization, the
//! counterpart to [`super::request::Request`] used when validating a
//! server's handshake reply from the client side.

use bytes::{Buf, BytesMut};

use super::body::{body_mode, BodyMode, ChunkedDecoder};
use super::headers::HeaderMap;
use crate::error::WebSocketError;

const DEFAULT_MAX_HEADER_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct Response {
    version: String,
    status_code: u16,
    status_msg: String,
    headers: HeaderMap,
    body: Vec<u8>,
    max_header_size: usize,
    header_bytes_seen: usize,
    headers_ready: bool,
    complete: bool,
    body_mode: Option<BodyMode>,
    chunked: Option<ChunkedDecoder>,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            version: String::new(),
            status_code: 0,
            status_msg: String::new(),
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

impl Response {
    pub fn new() -> Response {
        Response::default()
    }

    pub fn with_max_header_size(max_header_size: usize) -> Response {
        Response {
            max_header_size,
            ..Response::default()
        }
    }

    /// Builds a response explicitly, for a server constructing an outbound
    /// handshake reply rather than parsing an inbound one.
    pub fn build(version: &str, status_code: u16, status_msg: &str) -> Response {
        Response {
            version: version.to_string(),
            status_code,
            status_msg: status_msg.to_string(),
            headers_ready: true,
            complete: true,
            body_mode: Some(BodyMode::None),
            ..Response::default()
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_msg(&self) -> &str {
        &self.status_msg
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

    /// True once the status line and headers are fully parsed, before any
    /// body bytes are required. A 101 Switching Protocols response is
    /// usable as soon as this is true, since its "body" is in fact the
    /// start of the WebSocket byte stream.
    pub fn headers_ready(&self) -> bool {
        self.headers_ready
    }

    pub fn is_ready(&self) -> bool {
        self.complete
    }

    pub fn is_switching_protocols(&self) -> bool {
        self.status_code == 101
    }

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
                buf.advance(2);
                self.header_bytes_seen += line_len + 2;

                if line.is_empty() {
                    if self.version.is_empty() {
                        return Err(WebSocketError::BadRequest("incomplete status line"));
                    }
                    self.headers_ready = true;
                    // A 101 response has no body; anything that follows in
                    // this buffer belongs to the WebSocket stream, not to us.
                    let mode = if self.is_switching_protocols() {
                        BodyMode::None
                    } else {
                        body_mode(&self.headers)?
                    };
                    if let BodyMode::Chunked = mode {
                        self.chunked = Some(ChunkedDecoder::new());
                    }
                    self.body_mode = Some(mode);
                    continue;
                }

                if self.version.is_empty() {
                    self.parse_status_line(&line)?;
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

    fn parse_status_line(&mut self, line: &[u8]) -> Result<(), WebSocketError> {
        let line = std::str::from_utf8(line).map_err(|_| WebSocketError::BadRequest("non-UTF-8 status line"))?;
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        let code = parts.next().ok_or(WebSocketError::BadRequest("missing status code"))?;
        let msg = parts.next().unwrap_or("");

        if version.is_empty() {
            return Err(WebSocketError::BadRequest("missing HTTP version"));
        }
        let code: u16 = code.parse().map_err(|_| WebSocketError::BadRequest("non-numeric status code"))?;

        self.version = version.to_string();
        self.status_code = code;
        self.status_msg = msg.to_string();
        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8]) -> Result<(), WebSocketError> {
        let line = std::str::from_utf8(line).map_err(|_| WebSocketError::BadRequest("non-UTF-8 header line"))?;
        if let Some((name, value)) = line.split_once(':') {
            self.headers.append(name.trim(), value.trim());
        }
        Ok(())
    }

    pub fn raw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.version.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status_code.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status_msg.as_bytes());
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
    fn parses_a_switching_protocols_response() {
        let mut resp = Response::new();
        let data = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let mut buf = BytesMut::from(&data[..]);
        resp.consume(&mut buf).unwrap();
        assert!(resp.is_ready());
        assert_eq!(resp.status_code(), 101);
        assert!(resp.is_switching_protocols());
        assert_eq!(resp.header("Sec-WebSocket-Accept"), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(buf.is_empty());
    }

    #[test]
    fn switching_protocols_leaves_following_bytes_untouched() {
        let mut resp = Response::new();
        let mut data = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n".to_vec();
        data.extend_from_slice(&[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
        let mut buf = BytesMut::from(&data[..]);
        resp.consume(&mut buf).unwrap();
        assert!(resp.is_ready());
        assert_eq!(&buf[..7], &[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn parses_a_rejected_handshake_with_body() {
        let mut resp = Response::new();
        let data = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 11\r\n\r\nbad request";
        let mut buf = BytesMut::from(&data[..]);
        resp.consume(&mut buf).unwrap();
        assert!(resp.is_ready());
        assert_eq!(resp.status_code(), 400);
        assert_eq!(resp.body(), b"bad request");
    }

    #[test]
    fn non_numeric_status_code_is_rejected() {
        let mut resp = Response::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 abc OK\r\n\r\n"[..]);
        assert!(resp.consume(&mut buf).is_err());
    }

    #[test]
    fn raw_round_trips_a_built_response() {
        let mut resp = Response::build("HTTP/1.1", 101, "Switching Protocols");
        resp.set_header("Upgrade", "websocket");
        let text = String::from_utf8(resp.raw()).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
    }
}
