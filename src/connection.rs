//! The connection state machine (C6): drives one WebSocket connection from
//! the opening handshake through the open phase to the close handshake.
//!
//! `Connection<T>` owns its `Transport` outright and is the sole writer to
//! it — there is exactly one task running [`Connection::run`], so the
//! single-writer-in-flight discipline from §5 falls out of ordinary Rust
//! ownership rather than needing an explicit write-lock flag. External
//! callers (including the connection's own handlers, if they want to reach
//! a *different* connection) talk to a running connection only through a
//! [`ConnectionRef`]: a cheap `Clone` handle onto a small piece of shared
//! state (the outgoing queue, the buffered-byte counter, the external
//! state), never onto the connection or its transport directly.

use std::collections::VecDeque;
use std::io::IoSlice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::{Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;

use crate::close::{self, CloseCode};
use crate::config::{Config, Handlers, TerminationHandler};
use crate::error::{Result, WebSocketError};
use crate::frame::OpCode;
use crate::http::{parse_parameter_list, Request, Response};
use crate::message::Message;
use crate::processor::{self, AnyProcessor, Hybi, Processor};
use crate::transport::{Timer, Transport};
use crate::uri::Uri;
use crate::Role;

/// The externally-observable connection lifecycle (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Finer-grained internal state, kept mostly for introspection/testing —
/// Rust's async/await sequencing already enforces the ordering these
/// states existed to describe in a callback-based engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IState {
    UserInit,
    TransportInit,
    ReadHttpRequest,
    ProcessHttpRequest,
    WriteHttpResponse,
    WriteHttpRequest,
    ReadHttpResponse,
    ProcessConnection,
}

/// Work queued by a [`ConnectionRef`] for the connection's own task to
/// prepare (mask, frame) and write.
enum Outgoing {
    Data(OpCode, Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(CloseCode, String),
    /// Not a wire write: posts `Handlers::interrupt` to run in the
    /// connection's own sequence, per spec §4.7 ("posts an event to be
    /// handled in the connection's sequence; it does not cancel I/O").
    Interrupt,
}

impl Outgoing {
    fn payload_len(&self) -> usize {
        match self {
            Outgoing::Data(_, p) => p.len(),
            Outgoing::Ping(p) => p.len(),
            Outgoing::Pong(p) => p.len(),
            Outgoing::Close(_, r) => r.len(),
            Outgoing::Interrupt => 0,
        }
    }
}

struct Shared {
    outgoing: StdMutex<VecDeque<Outgoing>>,
    notify: Notify,
    buffered_amount: AtomicU64,
    state: StdMutex<State>,
}

/// A cheap, cloneable reference to a running connection's write queue and
/// state — the "strong reference" an [`Handle`](crate::endpoint::Handle)
/// resolves to. Never exposes the transport or the processor, so nothing
/// outside the connection's own task can violate the single-writer rule.
#[derive(Clone)]
pub struct ConnectionRef {
    shared: Arc<Shared>,
}

impl ConnectionRef {
    pub fn send(&self, opcode: OpCode, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(Outgoing::Data(opcode, payload.into()))
    }

    pub fn ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(Outgoing::Ping(payload.into()))
    }

    pub fn close(&self, code: CloseCode, reason: impl Into<String>) -> Result<()> {
        self.enqueue(Outgoing::Close(code, reason.into()))
    }

    /// Posts `Handlers::interrupt` to run on the connection's own task the
    /// next time it drains its outgoing queue. Does not touch the
    /// transport or cancel any in-flight read.
    pub fn interrupt(&self) -> Result<()> {
        self.enqueue(Outgoing::Interrupt)
    }

    pub fn state(&self) -> State {
        *self.shared.state.lock().unwrap()
    }

    /// Cumulative payload bytes of work still sitting in the outgoing
    /// queue, for callers to throttle producers against (§5 backpressure).
    pub fn get_buffered_amount(&self) -> u64 {
        self.shared.buffered_amount.load(Ordering::SeqCst)
    }

    fn enqueue(&self, op: Outgoing) -> Result<()> {
        if *self.shared.state.lock().unwrap() != State::Open {
            return Err(WebSocketError::InvalidState);
        }
        self.shared.buffered_amount.fetch_add(op.payload_len() as u64, Ordering::SeqCst);
        self.shared.outgoing.lock().unwrap().push_back(op);
        self.shared.notify.notify_one();
        Ok(())
    }
}

pub struct Connection<T: Transport> {
    transport: T,
    role: Role,
    config: Arc<Config>,
    handlers: Handlers,
    termination_handler: Option<TerminationHandler>,
    shared: Arc<Shared>,
    processor: Option<AnyProcessor>,
    processor_broken: bool,
    uri: Option<Uri>,
    subprotocols: Vec<String>,
    rng: StdRng,
    read_buf: BytesMut,
    request: Request,
    response: Response,
    istate: IState,
    local_close: (CloseCode, String),
    remote_close: (CloseCode, String),
}

impl<T: Transport> Connection<T> {
    pub fn server(transport: T, config: Arc<Config>, handlers: Handlers, termination_handler: Option<TerminationHandler>) -> Connection<T> {
        Connection::new(transport, Role::Server, None, Vec::new(), config, handlers, termination_handler)
    }

    pub fn client(
        transport: T,
        uri: Uri,
        subprotocols: Vec<String>,
        config: Arc<Config>,
        handlers: Handlers,
        termination_handler: Option<TerminationHandler>,
    ) -> Connection<T> {
        Connection::new(transport, Role::Client, Some(uri), subprotocols, config, handlers, termination_handler)
    }

    fn new(
        transport: T,
        role: Role,
        uri: Option<Uri>,
        subprotocols: Vec<String>,
        config: Arc<Config>,
        handlers: Handlers,
        termination_handler: Option<TerminationHandler>,
    ) -> Connection<T> {
        Connection {
            transport,
            role,
            config,
            handlers,
            termination_handler,
            shared: Arc::new(Shared {
                outgoing: StdMutex::new(VecDeque::new()),
                notify: Notify::new(),
                buffered_amount: AtomicU64::new(0),
                state: StdMutex::new(State::Connecting),
            }),
            processor: None,
            processor_broken: false,
            uri,
            subprotocols,
            rng: StdRng::from_entropy(),
            read_buf: BytesMut::new(),
            request: Request::new(),
            response: Response::new(),
            istate: IState::UserInit,
            local_close: (CloseCode::Normal, String::new()),
            remote_close: (CloseCode::NoStatus, String::new()),
        }
    }

    pub fn connection_ref(&self) -> ConnectionRef {
        ConnectionRef { shared: self.shared.clone() }
    }

    fn external_state(&self) -> State {
        *self.shared.state.lock().unwrap()
    }

    fn set_state(&self, state: State) {
        *self.shared.state.lock().unwrap() = state;
    }

    /// Drives the connection through its entire lifecycle: opening
    /// handshake, open-phase read/write loop, close handshake, and
    /// termination (§4.6 steps 1-12). Returns once the connection is
    /// `Closed`; the `fail`/`close`/termination handlers have already
    /// fired by the time this returns.
    pub async fn run(mut self) -> Result<()> {
        self.istate = IState::TransportInit;
        let handshake_result = if self.config.open_handshake_timeout_ms > 0 {
            let open_timer = Timer::new(self.config.open_handshake_timeout_ms);
            tokio::select! {
                r = self.do_handshake() => r,
                _ = open_timer.wait() => Err(WebSocketError::Timeout),
            }
        } else {
            self.do_handshake().await
        };

        if let Err(e) = handshake_result {
            log::warn!("opening handshake failed: {e}");
            self.terminate(Some(&e)).await;
            return Err(e);
        }

        log::debug!("connection open ({:?})", self.role);
        self.set_state(State::Open);
        if let Some(open) = &self.handlers.open {
            open();
        }

        let outcome = self.open_loop().await;
        self.terminate(outcome.as_ref().err()).await;
        outcome
    }

    async fn do_handshake(&mut self) -> Result<()> {
        match self.role {
            Role::Server => self.server_handshake().await,
            Role::Client => self.client_handshake().await,
        }
    }

    async fn server_handshake(&mut self) -> Result<()> {
        self.istate = IState::ReadHttpRequest;
        let mut buf = [0u8; 4096];
        while !self.request.is_ready() {
            let n = self.transport.read(&mut buf).await?;
            self.read_buf.extend_from_slice(&buf[..n]);
            self.request.consume(&mut self.read_buf)?;
        }

        self.istate = IState::ProcessHttpRequest;

        if !self.request.headers().contains_token_ci("Upgrade", "websocket") {
            if let Some(http) = &self.handlers.http {
                http();
            }
            let mut res = Response::build("HTTP/1.1", 426, "Upgrade Required");
            res.set_header("Content-Length", "0");
            let _ = self.transport.write_all(&[IoSlice::new(&res.raw())]).await;
            let _ = self.transport.shutdown().await;
            return Err(WebSocketError::UpgradeRequired);
        }

        let processor = match processor::select_processor(&self.request, Role::Server, self.config.max_message_size, self.config.message_allocator.clone()) {
            Ok(p) => p,
            Err(e) => {
                self.reject_handshake(&e).await;
                return Err(e);
            }
        };
        if let Err(e) = processor.validate_handshake(&self.request) {
            self.reject_handshake(&e).await;
            return Err(e);
        }

        if let Some(validate) = &self.handlers.validate {
            if !validate() {
                self.reject_handshake(&WebSocketError::BadRequest("rejected by validate handler")).await;
                return Err(WebSocketError::BadRequest("rejected by validate handler"));
            }
        }

        let offered_extensions = self.select_extensions();
        if !offered_extensions.is_empty() {
            log::debug!("ignoring requested extensions (none implemented): {offered_extensions:?}");
        }

        let selected_subprotocol = self.select_subprotocol();
        let response = processor.process_handshake(&self.request, selected_subprotocol.as_deref(), &self.config.user_agent)?;

        self.istate = IState::WriteHttpResponse;
        self.transport.write_all(&[IoSlice::new(&response.raw())]).await?;
        self.response = response;
        self.processor = Some(processor);
        self.istate = IState::ProcessConnection;
        Ok(())
    }

    /// Picks the first subprotocol the client offered — this crate has no
    /// way to know an application's acceptable set beyond what `validate`
    /// chooses to reject, so "first offered" is the simplest policy that
    /// still lets a picky application veto it via the validate handler.
    fn select_subprotocol(&self) -> Option<String> {
        let offered = self.request.header("Sec-WebSocket-Protocol");
        parse_parameter_list(offered).into_iter().next().map(|(name, _)| name)
    }

    /// Names the extensions the client offered via `Sec-WebSocket-Extensions`,
    /// or an empty list if `Config::allow_extensions` is off. None of them
    /// are ever accepted yet (permessage-deflate is a stub hook only, see
    /// `Config::allow_extensions`), so this never adds a response header —
    /// it exists so a future negotiated extension has somewhere to plug in,
    /// and so an operator can see what peers are asking for in the meantime.
    fn select_extensions(&self) -> Vec<String> {
        if !self.config.allow_extensions {
            return Vec::new();
        }
        let offered = self.request.header("Sec-WebSocket-Extensions");
        parse_parameter_list(offered).into_iter().map(|(name, _)| name).collect()
    }

    async fn reject_handshake(&mut self, err: &WebSocketError) {
        let (status, msg) = match err {
            WebSocketError::BadRequest(m) if *m == "rejected by validate handler" => (403, "Forbidden"),
            _ => (400, "Bad Request"),
        };
        let mut res = Response::build("HTTP/1.1", status, msg);
        if matches!(err, WebSocketError::UnsupportedVersion) {
            res.set_header("Sec-WebSocket-Version", processor::SUPPORTED_VERSIONS);
        }
        res.set_header("Content-Length", "0");
        log::warn!("rejecting handshake with {status}: {err}");
        let _ = self.transport.write_all(&[IoSlice::new(&res.raw())]).await;
        let _ = self.transport.shutdown().await;
    }

    async fn client_handshake(&mut self) -> Result<()> {
        let uri = self.uri.clone().ok_or(WebSocketError::ClientOnly)?;
        self.istate = IState::WriteHttpRequest;
        let request = AnyProcessor::client_handshake_request(&uri, &self.subprotocols, &self.config.user_agent);
        let client_key = request.header("Sec-WebSocket-Key").to_string();
        self.transport.write_all(&[IoSlice::new(&request.raw())]).await?;
        self.request = request;

        self.istate = IState::ReadHttpResponse;
        let mut buf = [0u8; 4096];
        while !self.response.is_ready() {
            let n = self.transport.read(&mut buf).await?;
            self.read_buf.extend_from_slice(&buf[..n]);
            self.response.consume(&mut self.read_buf)?;
        }

        let processor = AnyProcessor::Hybi(Hybi::with_allocator(13, Role::Client, self.config.max_message_size, self.config.message_allocator.clone()));
        processor.validate_server_handshake_response(&client_key, &self.response)?;

        let granted = self.response.header("Sec-WebSocket-Protocol");
        if !granted.is_empty() && !self.subprotocols.iter().any(|p| p == granted) {
            return Err(WebSocketError::UnrequestedSubprotocol);
        }

        self.processor = Some(processor);
        self.istate = IState::ProcessConnection;
        Ok(())
    }

    async fn open_loop(&mut self) -> Result<()> {
        let mut buf = vec![0u8; 8192];
        let mut pong_timer: Option<Timer> = None;
        let mut close_timer: Option<Timer> = None;

        loop {
            let close_wait = wait_optional(&close_timer);
            let pong_wait = wait_optional(&pong_timer);
            tokio::select! {
                result = self.transport.read(&mut buf) => {
                    match result {
                        Ok(n) => {
                            self.read_buf.extend_from_slice(&buf[..n]);
                            if self.pump_processor(&mut pong_timer, &mut close_timer).await? {
                                return Ok(());
                            }
                        }
                        Err(_) => return Ok(()),
                    }
                }
                _ = self.shared.notify.notified() => {
                    self.drain_outgoing(&mut pong_timer, &mut close_timer).await?;
                }
                _ = close_wait => {
                    return Ok(());
                }
                _ = pong_wait => {
                    pong_timer = None;
                    self.handle_pong_timeout(&mut close_timer).await?;
                }
            }
        }
    }

    /// No pong arrived before the watchdog armed in `drain_outgoing` fired:
    /// the peer is presumed unreachable, so begin closing rather than wait
    /// on a connection that may never answer again.
    async fn handle_pong_timeout(&mut self, close_timer: &mut Option<Timer>) -> Result<()> {
        log::warn!("pong timeout, closing");
        if let Some(handler) = &self.handlers.pong_timeout {
            handler();
        }
        self.begin_close(CloseCode::PolicyViolation, "pong timeout", close_timer).await
    }

    async fn pump_processor(&mut self, pong_timer: &mut Option<Timer>, close_timer: &mut Option<Timer>) -> Result<bool> {
        if self.processor_broken {
            return Ok(false);
        }
        if let Err(e) = self.processor.as_mut().expect("set after handshake").consume(&mut self.read_buf) {
            if self.config.drop_on_protocol_error {
                return Err(e);
            }
            self.processor_broken = true;
            let code = e.close_code().unwrap_or(CloseCode::ProtocolError);
            log::warn!("protocol error, closing with {code:?}: {e}");
            self.begin_close(code, &e.to_string(), close_timer).await?;
            return Ok(false);
        }
        loop {
            let Some(msg) = self.processor.as_mut().unwrap().get_message() else {
                return Ok(false);
            };
            if self.handle_message(msg, pong_timer).await? {
                return Ok(true);
            }
        }
    }

    async fn handle_message(&mut self, msg: Message, pong_timer: &mut Option<Timer>) -> Result<bool> {
        match msg.opcode() {
            OpCode::Text | OpCode::Binary => {
                if let Some(handler) = &self.handlers.message {
                    handler(msg.opcode(), msg.into_payload());
                }
                Ok(false)
            }
            OpCode::Ping => {
                let payload = msg.into_payload();
                let should_pong = self.handlers.ping.as_ref().map_or(true, |h| h(&payload));
                if should_pong {
                    self.emit(Outgoing::Pong(payload)).await?;
                }
                Ok(false)
            }
            OpCode::Pong => {
                let payload = msg.into_payload();
                if let Some(handler) = &self.handlers.pong {
                    handler(&payload);
                }
                if let Some(timer) = pong_timer.take() {
                    timer.cancel();
                }
                Ok(false)
            }
            OpCode::Close => {
                let payload = msg.into_payload();
                let code = close::extract_code(&payload).unwrap_or(CloseCode::ProtocolError);
                let reason = close::extract_reason(&payload).unwrap_or_default();
                self.remote_close = (code, reason.clone());
                if self.external_state() != State::Closing {
                    // Peer closed first: ack and don't wait further.
                    self.local_close = (code, reason.clone());
                    self.set_state(State::Closing);
                    self.emit(Outgoing::Close(code, reason)).await?;
                }
                Ok(true)
            }
            OpCode::Continuation => unreachable!("reassembled by the processor before delivery"),
        }
    }

    async fn drain_outgoing(&mut self, pong_timer: &mut Option<Timer>, close_timer: &mut Option<Timer>) -> Result<()> {
        loop {
            let next = self.shared.outgoing.lock().unwrap().pop_front();
            let Some(op) = next else { return Ok(()) };
            self.shared.buffered_amount.fetch_sub(op.payload_len() as u64, Ordering::SeqCst);
            match op {
                Outgoing::Close(code, reason) => {
                    self.begin_close(code, &reason, close_timer).await?;
                }
                Outgoing::Ping(payload) => {
                    if self.config.pong_timeout_ms > 0 {
                        *pong_timer = Some(Timer::new(self.config.pong_timeout_ms));
                    }
                    self.emit(Outgoing::Ping(payload)).await?;
                }
                Outgoing::Interrupt => {
                    if let Some(handler) = &self.handlers.interrupt {
                        handler();
                    }
                }
                other => self.emit(other).await?,
            }
        }
    }

    async fn begin_close(&mut self, code: CloseCode, reason: &str, close_timer: &mut Option<Timer>) -> Result<()> {
        log::debug!("starting close handshake: {code:?} {reason:?}");
        self.local_close = (code, reason.to_string());
        self.set_state(State::Closing);
        if self.config.close_handshake_timeout_ms > 0 {
            *close_timer = Some(Timer::new(self.config.close_handshake_timeout_ms));
        }
        self.emit(Outgoing::Close(code, reason.to_string())).await
    }

    async fn emit(&mut self, op: Outgoing) -> Result<()> {
        let processor = self.processor.as_ref().expect("set after handshake");
        let msg = match op {
            Outgoing::Data(opcode, payload) => processor.prepare_data_frame(opcode, payload, &mut self.rng)?,
            Outgoing::Ping(payload) => processor.prepare_ping(payload, &mut self.rng)?,
            Outgoing::Pong(payload) => processor.prepare_pong(payload, &mut self.rng)?,
            Outgoing::Close(code, reason) => processor.prepare_close(code, &reason, self.config.silent_close, &mut self.rng)?,
            Outgoing::Interrupt => unreachable!("handled directly in drain_outgoing, never reaches emit"),
        };
        self.write_message(msg).await
    }

    async fn write_message(&mut self, msg: Message) -> Result<()> {
        self.transport.write_all(&[IoSlice::new(msg.header()), IoSlice::new(msg.payload())]).await?;
        if msg.is_terminal() {
            let _ = self.transport.shutdown().await;
        }
        Ok(())
    }

    /// §4.6 step 12: shut the transport down, fire whichever handler fits
    /// the state we were leaving, then the termination callback.
    async fn terminate(&mut self, err: Option<&WebSocketError>) {
        log::debug!("terminating connection from {:?}, err={:?}", self.external_state(), err);
        let _ = self.transport.shutdown().await;
        let prior_state = self.external_state();
        self.set_state(State::Closed);
        match prior_state {
            State::Connecting => {
                if let Some(handler) = &self.handlers.fail {
                    handler(err.unwrap_or(&WebSocketError::InvalidState));
                }
            }
            State::Open | State::Closing => {
                if let Some(err) = err {
                    if let Some(handler) = &self.handlers.fail {
                        handler(err);
                    }
                } else if let Some(handler) = &self.handlers.close {
                    let (local_code, local_reason) = &self.local_close;
                    let (remote_code, remote_reason) = &self.remote_close;
                    handler(*local_code, local_reason, *remote_code, remote_reason);
                }
            }
            State::Closed => {}
        }
        if let Some(termination) = &self.termination_handler {
            termination();
        }
    }
}

async fn wait_optional(timer: &Option<Timer>) -> Result<()> {
    match timer {
        Some(t) => t.wait().await,
        None => std::future::pending().await,
    }
}
