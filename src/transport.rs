//! The abstract transport and timer facility the connection state machine
//! (C6) is built against, so this crate never names a concrete socket or
//! TLS type (spec §6, §9: "model the transport hierarchy as a small trait
//! instead of a base class plus asio/iostream subclasses").
//!
//! [`Connection`](crate::connection::Connection) is generic over
//! `Transport` rather than boxing it — the set of transports used by one
//! process is small and known at compile time, so static dispatch avoids
//! a vtable indirection on every read/write.

use std::io::IoSlice;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::error::{Result, WebSocketError};

/// A byte-stream transport: something the connection can read from, write
/// gathered buffers to, and shut down. Implementations are responsible for
/// their own concrete I/O (plain TCP, TLS, an in-memory duplex for tests).
pub trait Transport: Send {
    /// Reads at least one byte into `buf`, returning the number of bytes
    /// read, or `Err(Eof)` if the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> impl std::future::Future<Output = Result<usize>> + Send;

    /// Writes `bufs` as a single gathered write.
    fn write_all(&mut self, bufs: &[IoSlice<'_>]) -> impl std::future::Future<Output = Result<()>> + Send;

    fn shutdown(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    fn is_secure(&self) -> bool;

    fn remote_endpoint(&self) -> String;
}

/// Adapts any Tokio `AsyncRead + AsyncWrite` stream (a `TcpStream`, a TLS
/// stream, a test duplex) into a [`Transport`].
pub struct TokioTransport<S> {
    inner: S,
    secure: bool,
    remote_endpoint: String,
}

impl<S> TokioTransport<S> {
    pub fn new(inner: S, secure: bool, remote_endpoint: impl Into<String>) -> TokioTransport<S> {
        TokioTransport {
            inner,
            secure,
            remote_endpoint: remote_endpoint.into(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Transport for TokioTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf).await?;
        if n == 0 {
            return Err(WebSocketError::Eof);
        }
        Ok(n)
    }

    async fn write_all(&mut self, bufs: &[IoSlice<'_>]) -> Result<()> {
        // `AsyncWriteExt::write_vectored` may perform a short, single-slice
        // write; loop until every slice is fully flushed.
        let mut owned: Vec<u8> = Vec::with_capacity(bufs.iter().map(|b| b.len()).sum());
        for buf in bufs {
            owned.extend_from_slice(buf);
        }
        self.inner.write_all(&owned).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn remote_endpoint(&self) -> String {
        self.remote_endpoint.clone()
    }
}

/// A cancellable, one-shot timer (`set_timer`/`Timer.cancel()` in §6).
///
/// Cancellation is cooperative: [`wait`](Timer::wait) resolves with
/// `Err(OperationAborted)` as soon as [`cancel`](Timer::cancel) is called,
/// rather than actually interrupting the sleeping task.
#[derive(Clone)]
pub struct Timer {
    notify: Arc<Notify>,
    duration: Duration,
}

impl Timer {
    pub fn new(duration_ms: u64) -> Timer {
        Timer {
            notify: Arc::new(Notify::new()),
            duration: Duration::from_millis(duration_ms),
        }
    }

    pub fn cancel(&self) {
        self.notify.notify_waiters();
    }

    /// Resolves `Ok(())` once the duration elapses, or `Err(OperationAborted)`
    /// if cancelled first.
    pub async fn wait(&self) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => Ok(()),
            _ = self.notify.notified() => Err(WebSocketError::OperationAborted),
        }
    }
}
