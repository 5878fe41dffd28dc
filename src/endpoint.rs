//! The endpoint (C7): holds the defaults every connection it spawns is
//! wired with, owns the table of live connections, and is the only thing
//! that can turn a [`Handle`] back into something you can actually call.
//!
//! A `Handle` is deliberately *not* a strong reference to a connection —
//! it is a bare, `Copy` integer. Reaching the connection behind it always
//! goes through [`Endpoint::get`], which is how this crate avoids the
//! `Connection` ↔ `Endpoint` ↔ handler-closure reference cycle called out
//! in §9: a connection's own task never holds a strong reference to its
//! endpoint, and the endpoint drops its reference to a connection the
//! moment that connection's task finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::close::CloseCode;
use crate::config::{Config, Handlers, TerminationHandler};
use crate::connection::{Connection, ConnectionRef, State};
use crate::error::{Result, WebSocketError};
use crate::frame::OpCode;
use crate::transport::Transport;
use crate::uri::Uri;

/// An opaque, `Copy` identity token for a connection spawned by an
/// [`Endpoint`]. Safe to hold across an `.await`, compare, and pass
/// between tasks; carries no way to reach the connection except by
/// looking it up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

/// Owns connection defaults and the table of currently-live connections.
/// One `Endpoint` can both `accept` server-role connections and `connect`
/// client-role ones; most applications use one or the other.
pub struct Endpoint<T: Transport> {
    config: Arc<Config>,
    handlers: Handlers,
    termination_handler: Option<TerminationHandler>,
    connections: Arc<Mutex<HashMap<u64, ConnectionRef>>>,
    next_id: AtomicU64,
    _transport: std::marker::PhantomData<fn() -> T>,
}

impl<T: Transport + 'static> Endpoint<T> {
    pub fn new(config: Config, handlers: Handlers) -> Endpoint<T> {
        Endpoint {
            config: Arc::new(config),
            handlers,
            termination_handler: None,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            _transport: std::marker::PhantomData,
        }
    }

    pub fn with_termination_handler(mut self, handler: TerminationHandler) -> Endpoint<T> {
        self.termination_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Takes ownership of an already-accepted transport, spawns a
    /// server-role connection on the host executor, and registers it in
    /// the connection table under a fresh [`Handle`].
    pub fn accept(&self, transport: T) -> Handle {
        self.spawn(Connection::server(transport, self.config.clone(), self.handlers.clone(), self.termination_handler.clone()))
    }

    /// Spawns a client-role connection that opens `uri` over `transport`.
    pub fn connect(&self, transport: T, uri: Uri, subprotocols: Vec<String>) -> Handle {
        self.spawn(Connection::client(
            transport,
            uri,
            subprotocols,
            self.config.clone(),
            self.handlers.clone(),
            self.termination_handler.clone(),
        ))
    }

    fn spawn(&self, connection: Connection<T>) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_ref = connection.connection_ref();
        self.connections.lock().unwrap().insert(id, conn_ref);
        log::trace!("spawned connection {id}");

        let table = self.connections.clone();
        tokio::spawn(async move {
            let result = connection.run().await;
            if let Err(e) = result {
                log::debug!("connection {id} ended: {e}");
            }
            table.lock().unwrap().remove(&id);
        });

        Handle(id)
    }

    /// Resolves a `Handle` to a strong, callable reference. Fails with
    /// [`WebSocketError::BadConnection`] once the connection's task has
    /// finished and it has dropped out of the table.
    pub fn get(&self, handle: Handle) -> Result<ConnectionRef> {
        self.connections.lock().unwrap().get(&handle.0).cloned().ok_or(WebSocketError::BadConnection)
    }

    pub fn send(&self, handle: Handle, opcode: OpCode, payload: impl Into<Bytes>) -> Result<()> {
        self.get(handle)?.send(opcode, payload)
    }

    pub fn ping(&self, handle: Handle, payload: impl Into<Bytes>) -> Result<()> {
        self.get(handle)?.ping(payload)
    }

    pub fn close(&self, handle: Handle, code: CloseCode, reason: impl Into<String>) -> Result<()> {
        self.get(handle)?.close(code, reason)
    }

    /// Posts `Handlers::interrupt` to run on the connection's own task;
    /// does not cancel any I/O in progress (spec §4.7).
    pub fn interrupt(&self, handle: Handle) -> Result<()> {
        self.get(handle)?.interrupt()
    }

    pub fn state(&self, handle: Handle) -> Result<State> {
        Ok(self.get(handle)?.state())
    }

    /// Number of connections currently tracked (i.e. whose task has not
    /// yet finished).
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokioTransport;
    use tokio::io::duplex;

    #[tokio::test]
    async fn accept_registers_and_then_removes_a_connection() {
        let (mut client_io, server_io) = duplex(4096);
        let transport = TokioTransport::new(server_io, false, "test".to_string());
        let endpoint: Endpoint<TokioTransport<tokio::io::DuplexStream>> = Endpoint::new(Config::default(), Handlers::default());

        let handle = endpoint.accept(transport);
        assert_eq!(endpoint.connection_count(), 1);

        let req = b"GET / HTTP/1.1\r\nHost: h\r\nUpgrade: websocket\r\nConnection: upgrade\r\n\
                     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        tokio::io::AsyncWriteExt::write_all(&mut client_io, req).await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = tokio::io::AsyncReadExt::read(&mut client_io, &mut buf).await.unwrap();

        assert_eq!(endpoint.state(handle).unwrap(), State::Open);
        endpoint.close(handle, CloseCode::Normal, "done").unwrap();

        drop(client_io);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(endpoint.connection_count(), 0);
        assert!(matches!(endpoint.get(handle), Err(WebSocketError::BadConnection)));
    }

    #[tokio::test]
    async fn unknown_handle_is_a_bad_connection() {
        let endpoint: Endpoint<TokioTransport<tokio::io::DuplexStream>> = Endpoint::new(Config::default(), Handlers::default());
        let bogus = Handle(999);
        assert!(matches!(endpoint.get(bogus), Err(WebSocketError::BadConnection)));
    }
}
