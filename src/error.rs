//! The error taxonomy for the whole engine.
//!
//! Every fallible operation in this crate returns [`WebSocketError`]. Variants
//! are grouped the way the specification groups them: handshake errors abort
//! the handshake, protocol/payload/size errors map to a close code, state
//! errors are programmer errors, transport errors terminate the connection.

use crate::close::CloseCode;

/// Unified error type for handshake, framing and connection-level failures.
#[derive(thiserror::Error, Debug)]
pub enum WebSocketError {
    // --- Handshake errors ---
    #[error("invalid HTTP method, expected GET")]
    InvalidHttpMethod,
    #[error("invalid HTTP version, expected 1.1 or higher")]
    InvalidHttpVersion,
    #[error("missing required header: {0}")]
    MissingRequiredHeader(&'static str),
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("HTTP header section exceeded the configured maximum size")]
    HeaderTooLarge,
    #[error("plain HTTP request received where a WebSocket upgrade was expected")]
    UpgradeRequired,
    #[error("server handshake response did not match the request")]
    ServerHandshakeMismatch,
    #[error("server selected a subprotocol the client did not offer")]
    InvalidSubprotocol,

    // --- Protocol errors (close code 1002) ---
    #[error("reserved or unknown opcode {0}")]
    InvalidOpcode(u8),
    #[error("reserved bit set without a negotiated extension")]
    InvalidRsvBit,
    #[error("control frame was fragmented")]
    FragmentedControl,
    #[error("continuation frame received with no message in progress, or a new data frame while one was in progress")]
    InvalidContinuation,
    #[error("client frame was not masked")]
    MaskingRequired,
    #[error("server frame was masked")]
    MaskingForbidden,
    #[error("close payload had a single byte, which cannot hold a status code")]
    BadCloseCode,
    #[error("close code {0} is in a reserved range")]
    ReservedCloseCode(u16),
    #[error("unsupported WebSocket version")]
    UnsupportedVersion,
    /// A control frame's own payload cannot exceed 125 bytes regardless of
    /// any negotiated message-size limit — this is a framing violation, not
    /// a policy one, so it closes with 1002 like the rest of this group.
    #[error("control frame payload exceeded 125 bytes")]
    ControlTooBig,

    // --- Payload errors (close code 1007) ---
    #[error("payload was not valid UTF-8")]
    InvalidUtf8,

    // --- Size errors (close code 1009) ---
    #[error("message exceeded the configured maximum size")]
    MessageTooBig,

    // --- State errors ---
    #[error("invalid state transition attempted")]
    InvalidState,
    #[error("no connection for the given handle")]
    BadConnection,
    #[error("operation is only valid on a client connection")]
    ClientOnly,
    #[error("operation is only valid on a server connection")]
    ServerOnly,
    #[error("server proposed a subprotocol the client never requested")]
    UnrequestedSubprotocol,

    // --- Transport errors ---
    #[error("end of stream")]
    Eof,
    #[error("short read across a TLS record boundary")]
    TlsShortRead,
    #[error("operation was cancelled")]
    OperationAborted,
    #[error("operation timed out")]
    Timeout,
    #[error(transparent)]
    PassThrough(#[from] std::io::Error),
}

impl WebSocketError {
    /// Maps a protocol/payload/size error to the close code the connection
    /// state machine should send, per §7 of the specification. Returns
    /// `None` for errors that never result in a close frame (handshake,
    /// state, and transport errors are handled through other paths).
    pub fn close_code(&self) -> Option<CloseCode> {
        use WebSocketError::*;
        match self {
            InvalidOpcode(_)
            | InvalidRsvBit
            | FragmentedControl
            | InvalidContinuation
            | MaskingRequired
            | MaskingForbidden
            | BadCloseCode
            | ReservedCloseCode(_)
            | ControlTooBig => Some(CloseCode::ProtocolError),
            InvalidUtf8 => Some(CloseCode::InvalidPayload),
            MessageTooBig => Some(CloseCode::MessageTooBig),
            _ => None,
        }
    }

    /// Whether this error leaves the connection in a state from which no
    /// further meaningful exchange is possible, i.e. it should be treated as
    /// terminal the way `websocketpp::close::status::terminal` does.
    pub fn is_terminal(&self) -> bool {
        matches!(self.close_code(), Some(code) if code.is_terminal())
    }
}

pub type Result<T> = std::result::Result<T, WebSocketError>;
