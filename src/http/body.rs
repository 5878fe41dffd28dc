//! Body-length determination and incremental consumption shared by
//! [`super::request::Request`] and [`super::response::Response`], once
//! their header section is complete.

use super::headers::HeaderMap;
use crate::error::WebSocketError;

#[derive(Debug, Clone)]
pub(crate) enum BodyMode {
    /// No body expected; parsing is done as soon as headers are complete.
    None,
    ContentLength(usize),
    Chunked,
}

pub(crate) fn body_mode(headers: &HeaderMap) -> Result<BodyMode, WebSocketError> {
    if headers.contains_token_ci("Transfer-Encoding", "chunked") {
        return Ok(BodyMode::Chunked);
    }
    let cl = headers.get("Content-Length");
    if cl.is_empty() {
        return Ok(BodyMode::None);
    }
    let len: usize = cl
        .trim()
        .parse()
        .map_err(|_| WebSocketError::BadRequest("invalid Content-Length"))?;
    Ok(BodyMode::ContentLength(len))
}

/// Incrementally decodes a chunked-encoding body. Returns `Some(bytes
/// consumed)` once the terminating zero-length chunk and its trailing CRLF
/// have both been seen.
pub(crate) struct ChunkedDecoder {
    body: Vec<u8>,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> ChunkedDecoder {
        ChunkedDecoder { body: Vec::new() }
    }

    pub(crate) fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Attempts to decode as many complete chunks as `buf` holds. Returns
    /// `Ok(Some(n))` with `n` bytes consumed from the front of `buf` once
    /// the terminal chunk is seen, `Ok(None)` if more bytes are needed.
    pub(crate) fn feed(&mut self, buf: &[u8]) -> Result<Option<usize>, WebSocketError> {
        let mut cursor = 0usize;
        loop {
            let rest = &buf[cursor..];
            let Some(line_end) = find_crlf(rest) else {
                return Ok(None);
            };
            let size_line = std::str::from_utf8(&rest[..line_end])
                .map_err(|_| WebSocketError::BadRequest("invalid chunk size"))?;
            let size_str = size_line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_str, 16)
                .map_err(|_| WebSocketError::BadRequest("invalid chunk size"))?;
            let after_size_line = line_end + 2;
            if size == 0 {
                // Terminal chunk: consume the trailing CRLF (no trailers
                // supported) and we're done.
                if rest.len() < after_size_line + 2 {
                    return Ok(None);
                }
                cursor += after_size_line + 2;
                return Ok(Some(cursor));
            }
            if rest.len() < after_size_line + size + 2 {
                return Ok(None);
            }
            self.body.extend_from_slice(&rest[after_size_line..after_size_line + size]);
            cursor += after_size_line + size + 2;
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
