//! Per-version processor strategies (C5): handshake validation/generation,
//! frame-to-message reassembly, and outgoing message preparation.
//!
//! §9 calls out the processor hierarchy as the textbook case for replacing
//! virtual dispatch with a tagged variant: there are exactly three closed
//! possibilities (v7/8, v13 — identical enough to share one implementation
//! — and the legacy v0/Hixie-00 draft), so [`AnyProcessor`] is a plain enum
//! matched on the negotiated version rather than a trait object.

mod hybi;
#[cfg(feature = "hybi00")]
mod hybi00;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rand::RngCore;

use crate::close::CloseCode;
use crate::config::MessageAllocator;
use crate::error::{Result, WebSocketError};
use crate::frame::OpCode;
use crate::http::{Request, Response};
use crate::message::Message;
use crate::uri::Uri;
use crate::Role;

pub use hybi::Hybi;
#[cfg(feature = "hybi00")]
pub use hybi00::Hybi00;

/// Operations every version-specific processor provides (spec §4.5).
pub trait Processor {
    fn validate_handshake(&self, req: &Request) -> Result<()>;
    fn process_handshake(&self, req: &Request, selected_subprotocol: Option<&str>, user_agent: &str) -> Result<Response>;
    fn validate_server_handshake_response(&self, client_key: &str, res: &Response) -> Result<()>;

    /// Feeds bytes from the frame decoder, stashing any completed
    /// messages for later retrieval via [`ready`](Processor::ready)/
    /// [`get_message`](Processor::get_message).
    fn consume(&mut self, buf: &mut BytesMut) -> Result<()>;
    fn ready(&self) -> bool;
    fn get_message(&mut self) -> Option<Message>;

    fn prepare_data_frame(&self, opcode: OpCode, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message>;
    fn prepare_ping(&self, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message>;
    fn prepare_pong(&self, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message>;
    fn prepare_close(&self, code: CloseCode, reason: &str, silent: bool, rng: &mut dyn RngCore) -> Result<Message>;
}

/// The closed set of version-specific processors, dispatched by `match`
/// instead of by vtable.
pub enum AnyProcessor {
    Hybi(Hybi),
    #[cfg(feature = "hybi00")]
    Hybi00(Hybi00),
}

impl AnyProcessor {
    /// Builds a client-side opening handshake request for the best
    /// protocol version this crate supports (13). `hybi00` connections are
    /// only ever entered from the server side (no deployed client needs to
    /// originate one), so there is a single client request shape.
    pub fn client_handshake_request(uri: &Uri, subprotocols: &[String], user_agent: &str) -> Request {
        hybi::client_handshake_request(uri, subprotocols, user_agent)
    }
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            AnyProcessor::Hybi(p) => p.$method($($arg),*),
            #[cfg(feature = "hybi00")]
            AnyProcessor::Hybi00(p) => p.$method($($arg),*),
        }
    };
}

impl Processor for AnyProcessor {
    fn validate_handshake(&self, req: &Request) -> Result<()> {
        dispatch!(self, validate_handshake, req)
    }

    fn process_handshake(&self, req: &Request, selected_subprotocol: Option<&str>, user_agent: &str) -> Result<Response> {
        dispatch!(self, process_handshake, req, selected_subprotocol, user_agent)
    }

    fn validate_server_handshake_response(&self, client_key: &str, res: &Response) -> Result<()> {
        dispatch!(self, validate_server_handshake_response, client_key, res)
    }

    fn consume(&mut self, buf: &mut BytesMut) -> Result<()> {
        dispatch!(self, consume, buf)
    }

    fn ready(&self) -> bool {
        dispatch!(self, ready)
    }

    fn get_message(&mut self) -> Option<Message> {
        dispatch!(self, get_message)
    }

    fn prepare_data_frame(&self, opcode: OpCode, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message> {
        dispatch!(self, prepare_data_frame, opcode, payload, rng)
    }

    fn prepare_ping(&self, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message> {
        dispatch!(self, prepare_ping, payload, rng)
    }

    fn prepare_pong(&self, payload: Bytes, rng: &mut dyn RngCore) -> Result<Message> {
        dispatch!(self, prepare_pong, payload, rng)
    }

    fn prepare_close(&self, code: CloseCode, reason: &str, silent: bool, rng: &mut dyn RngCore) -> Result<Message> {
        dispatch!(self, prepare_close, code, reason, silent, rng)
    }
}

/// Selects a processor by the version advertised in a request's
/// `Sec-WebSocket-Version` header (absent ⇒ the legacy v0/hybi-00 draft).
pub fn select_processor(req: &Request, role: Role, max_message_size: u64, allocator: Arc<dyn MessageAllocator>) -> Result<AnyProcessor> {
    let version_header = req.header("Sec-WebSocket-Version");
    if version_header.is_empty() {
        #[cfg(feature = "hybi00")]
        return Ok(AnyProcessor::Hybi00(Hybi00::new(role)));
        #[cfg(not(feature = "hybi00"))]
        return Err(WebSocketError::UnsupportedVersion);
    }

    match version_header.trim().parse::<u8>() {
        Ok(7) | Ok(8) | Ok(13) => {
            let version: u8 = version_header.trim().parse().unwrap();
            Ok(AnyProcessor::Hybi(Hybi::with_allocator(version, role, max_message_size, allocator)))
        }
        _ => Err(WebSocketError::UnsupportedVersion),
    }
}

/// The comma-separated list of versions this crate understands, used when
/// rejecting a `Sec-WebSocket-Version` the server cannot serve (scenario 2
/// in spec §8): `Sec-WebSocket-Version: 0, 7, 8, 13`.
pub const SUPPORTED_VERSIONS: &str = "0, 7, 8, 13";
