//! Per-endpoint configuration and handler registration.
//!
//! A plain struct built with `Default` plus setter methods, not a
//! compile-time trait bundle — §9's redesign guidance is explicit that
//! policy selection belongs in a runtime record, not template parameters.

use std::sync::Arc;

use bytes::Bytes;

use crate::close::CloseCode;
use crate::error::WebSocketError;
use crate::frame::OpCode;
use crate::message::Message;

/// Tunables enumerated in spec §6, assembled once at endpoint creation and
/// shared (via `Arc`) by every connection it spawns.
#[derive(Clone)]
pub struct Config {
    /// Placed into the `User-Agent` (client) or `Server` (server) header.
    pub user_agent: String,
    /// Bound on a single reassembled message.
    pub max_message_size: u64,
    /// Bound on the HTTP handshake's header section.
    pub max_header_size: usize,
    pub open_handshake_timeout_ms: u64,
    pub close_handshake_timeout_ms: u64,
    /// 0 disables the pong-timeout watchdog.
    pub pong_timeout_ms: u64,
    /// If true, protocol errors in Open skip the close handshake and drop
    /// the transport directly.
    pub drop_on_protocol_error: bool,
    /// If true, outgoing close frames carry no code or reason.
    pub silent_close: bool,
    /// If false, negotiated extensions (e.g. permessage-deflate) are
    /// suppressed even if both peers offered them.
    pub allow_extensions: bool,
    /// The allocation strategy named in spec §3 ("an allocation strategy
    /// provided by configuration"); every `Hybi` processor builds its
    /// incoming and outgoing `Message`s through this instead of calling
    /// `Message::incoming`/`Message::outgoing` directly.
    pub message_allocator: Arc<dyn MessageAllocator>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("user_agent", &self.user_agent)
            .field("max_message_size", &self.max_message_size)
            .field("max_header_size", &self.max_header_size)
            .field("open_handshake_timeout_ms", &self.open_handshake_timeout_ms)
            .field("close_handshake_timeout_ms", &self.close_handshake_timeout_ms)
            .field("pong_timeout_ms", &self.pong_timeout_ms)
            .field("drop_on_protocol_error", &self.drop_on_protocol_error)
            .field("silent_close", &self.silent_close)
            .field("allow_extensions", &self.allow_extensions)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            user_agent: concat!("wscore/", env!("CARGO_PKG_VERSION")).to_string(),
            max_message_size: 100 * 1024 * 1024,
            max_header_size: 16 * 1024,
            open_handshake_timeout_ms: 5_000,
            close_handshake_timeout_ms: 5_000,
            pong_timeout_ms: 0,
            drop_on_protocol_error: false,
            silent_close: false,
            allow_extensions: true,
            message_allocator: Arc::new(DefaultMessageAllocator),
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Config {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: u64) -> Config {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_max_header_size(mut self, max_header_size: usize) -> Config {
        self.max_header_size = max_header_size;
        self
    }

    pub fn with_open_handshake_timeout_ms(mut self, ms: u64) -> Config {
        self.open_handshake_timeout_ms = ms;
        self
    }

    pub fn with_close_handshake_timeout_ms(mut self, ms: u64) -> Config {
        self.close_handshake_timeout_ms = ms;
        self
    }

    pub fn with_pong_timeout_ms(mut self, ms: u64) -> Config {
        self.pong_timeout_ms = ms;
        self
    }

    pub fn with_drop_on_protocol_error(mut self, drop: bool) -> Config {
        self.drop_on_protocol_error = drop;
        self
    }

    pub fn with_silent_close(mut self, silent: bool) -> Config {
        self.silent_close = silent;
        self
    }

    pub fn with_allow_extensions(mut self, allow: bool) -> Config {
        self.allow_extensions = allow;
        self
    }

    pub fn with_message_allocator(mut self, allocator: impl MessageAllocator + 'static) -> Config {
        self.message_allocator = Arc::new(allocator);
        self
    }
}

/// The ten handler slots from §4.7/§9 collapsed into one record of
/// optional callables, passed by shared reference to every connection
/// instead of ten individually-stored function pointers.
///
/// Each slot is `Option<Arc<dyn Fn(...) + Send + Sync>>`; `None` means "no
/// handler registered", which the connection treats as a sensible default
/// (e.g. an unset `ping_handler` still auto-replies with a pong).
#[derive(Clone, Default)]
pub struct Handlers {
    pub open: Option<Arc<dyn Fn() + Send + Sync>>,
    pub close: Option<Arc<dyn Fn(CloseCode, &str, CloseCode, &str) + Send + Sync>>,
    pub fail: Option<Arc<dyn Fn(&WebSocketError) + Send + Sync>>,
    pub message: Option<Arc<dyn Fn(OpCode, Bytes) + Send + Sync>>,
    /// Returns `true` (or is unset) to auto-reply with a pong of the same
    /// payload; returning `false` suppresses the auto-reply.
    pub ping: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
    pub pong: Option<Arc<dyn Fn(&[u8]) + Send + Sync>>,
    pub pong_timeout: Option<Arc<dyn Fn() + Send + Sync>>,
    pub interrupt: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Invoked for a plain (non-upgrade) HTTP request; if unset the
    /// connection replies `426 Upgrade Required`.
    pub http: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Origin/subprotocol/extension acceptance check run during the
    /// server handshake; returning `false` rejects with `403 Forbidden`.
    pub validate: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("open", &self.open.is_some())
            .field("close", &self.close.is_some())
            .field("fail", &self.fail.is_some())
            .field("message", &self.message.is_some())
            .field("ping", &self.ping.is_some())
            .field("pong", &self.pong.is_some())
            .field("pong_timeout", &self.pong_timeout.is_some())
            .field("interrupt", &self.interrupt.is_some())
            .field("http", &self.http.is_some())
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

/// Not part of the public handler set: the termination callback (§4.6
/// step 12) fires unconditionally after `fail`/`close`, regardless of
/// which path got the connection there.
pub type TerminationHandler = Arc<dyn Fn() + Send + Sync>;

/// The `Message` allocation strategy named in §3 ("an allocation strategy
/// provided by configuration"), installed via [`Config::message_allocator`]
/// and called by every `Hybi` processor instead of building `Message`s
/// directly. The default simply owns a `Bytes` per message; a host
/// application can supply a pooled allocator without this crate's processor
/// code needing to know about it.
pub trait MessageAllocator: Send + Sync {
    fn incoming(&self, opcode: OpCode, payload: Bytes) -> Message {
        Message::incoming(opcode, payload)
    }

    fn outgoing(&self, opcode: OpCode, payload: Bytes) -> Message {
        Message::outgoing(opcode, payload)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageAllocator;

impl MessageAllocator for DefaultMessageAllocator {}
