//! WebSocket close codes and close-frame payload encoding/decoding.
//!
//! Grounded on `websocketpp::close::status` (IANA-registered codes, the
//! reserved/invalid ranges, and the terminal-code classification used to
//! decide whether a close handshake is worth waiting for).

use crate::error::WebSocketError;
use crate::utf8::Utf8Validator;

/// A WebSocket close status code.
///
/// `NoStatus`, `Abnormal` and `Tls` are synthetic: they are meaningful only
/// to the local endpoint and [`CloseCode::to_wire`] refuses to serialize
/// them, which is how this crate enforces "never appears on the wire" at
/// the type level instead of by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    UnsupportedData,
    NoStatus,
    Abnormal,
    InvalidPayload,
    PolicyViolation,
    MessageTooBig,
    ExtensionRequired,
    InternalError,
    Tls,
    Reserved(u16),
    Library(u16),
    Other(u16),
}

impl CloseCode {
    /// Parses the numeric code off the wire.
    pub fn from_u16(code: u16) -> CloseCode {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::ExtensionRequired,
            1011 => CloseCode::InternalError,
            1015 => CloseCode::Tls,
            1016..=2999 => CloseCode::Reserved(code),
            1004 | 1012 | 1013 | 1014 => CloseCode::Reserved(code),
            3000..=3999 => CloseCode::Library(code),
            4000..=4999 => CloseCode::Other(code),
            other => CloseCode::Reserved(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match *self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::ExtensionRequired => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Tls => 1015,
            CloseCode::Reserved(c) | CloseCode::Library(c) | CloseCode::Other(c) => c,
        }
    }

    /// True if this code must never be sent or received on the wire.
    pub fn is_invalid(&self) -> bool {
        let code = self.as_u16();
        code <= 999
            || code >= 5000
            || matches!(
                self,
                CloseCode::NoStatus | CloseCode::Abnormal | CloseCode::Tls
            )
    }

    /// True if the code falls in a range reserved for future protocol use.
    pub fn is_reserved(&self) -> bool {
        matches!(self, CloseCode::Reserved(_))
    }

    /// True if, once discovered, no further meaningful WebSocket exchange
    /// can occur and the close handshake need not be awaited.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CloseCode::ProtocolError
                | CloseCode::InvalidPayload
                | CloseCode::PolicyViolation
                | CloseCode::MessageTooBig
                | CloseCode::InternalError
        )
    }

    /// The code as it should appear on the wire, or `None` if this code must
    /// never be sent (in which case the close frame should carry no code).
    pub fn to_wire(&self) -> Option<u16> {
        if self.is_invalid() {
            None
        } else {
            Some(self.as_u16())
        }
    }
}

/// Maximum length of a close reason so it plus a 2-byte code fits in a
/// 125-byte control frame payload.
pub const MAX_REASON_LEN: usize = 123;

/// Truncates a user-supplied close reason to fit a control frame, splitting
/// only at a UTF-8 character boundary.
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_REASON_LEN {
        return reason;
    }
    let mut end = MAX_REASON_LEN;
    while end > 0 && !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Extracts the close code from a received close-frame payload.
///
/// An empty payload yields [`CloseCode::NoStatus`]. A single-byte payload is
/// a protocol error since a code cannot be represented in one byte.
pub fn extract_code(payload: &[u8]) -> Result<CloseCode, WebSocketError> {
    match payload.len() {
        0 => Ok(CloseCode::NoStatus),
        1 => Err(WebSocketError::BadCloseCode),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            let close = CloseCode::from_u16(code);
            if close.is_invalid() {
                return Err(WebSocketError::ReservedCloseCode(code));
            }
            if close.is_reserved() {
                return Err(WebSocketError::ReservedCloseCode(code));
            }
            Ok(close)
        }
    }
}

/// Extracts and validates the reason string from a received close-frame
/// payload (the bytes after the 2-byte code, if any).
pub fn extract_reason(payload: &[u8]) -> Result<String, WebSocketError> {
    if payload.len() <= 2 {
        return Ok(String::new());
    }
    let bytes = &payload[2..];
    let mut validator = Utf8Validator::new();
    for &b in bytes {
        if !validator.consume(b) {
            return Err(WebSocketError::InvalidUtf8);
        }
    }
    if !validator.complete() {
        return Err(WebSocketError::InvalidUtf8);
    }
    Ok(String::from_utf8(bytes.to_vec()).expect("validated above"))
}

/// Builds the wire payload for an outgoing close frame: `code` as a 2-byte
/// big-endian integer followed by the (already truncated) UTF-8 reason, or
/// an empty payload when `code` is a sentinel that must never be sent.
pub fn build_payload(code: CloseCode, reason: &str) -> Vec<u8> {
    match code.to_wire() {
        Some(wire_code) => {
            let reason = truncate_reason(reason);
            let mut payload = Vec::with_capacity(2 + reason.len());
            payload.extend_from_slice(&wire_code.to_be_bytes());
            payload.extend_from_slice(reason.as_bytes());
            payload
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_codes_never_hit_the_wire() {
        assert_eq!(CloseCode::NoStatus.to_wire(), None);
        assert_eq!(CloseCode::Abnormal.to_wire(), None);
        assert_eq!(CloseCode::Tls.to_wire(), None);
    }

    #[test]
    fn reserved_ranges_are_rejected() {
        assert!(CloseCode::from_u16(1016).is_reserved());
        assert!(CloseCode::from_u16(1004).is_reserved());
        assert!(CloseCode::from_u16(2999).is_reserved());
        assert!(!CloseCode::from_u16(3000).is_reserved());
    }

    #[test]
    fn extract_code_empty_is_no_status() {
        assert_eq!(extract_code(&[]).unwrap(), CloseCode::NoStatus);
    }

    #[test]
    fn extract_code_single_byte_is_bad() {
        assert!(matches!(
            extract_code(&[1]),
            Err(WebSocketError::BadCloseCode)
        ));
    }

    #[test]
    fn round_trips_code_and_reason() {
        let payload = build_payload(CloseCode::Normal, "bye");
        assert_eq!(extract_code(&payload).unwrap(), CloseCode::Normal);
        assert_eq!(extract_reason(&payload).unwrap(), "bye");
    }

    #[test]
    fn reason_is_truncated_to_123_bytes() {
        let long = "a".repeat(200);
        let truncated = truncate_reason(&long);
        assert_eq!(truncated.len(), MAX_REASON_LEN);
    }
}
