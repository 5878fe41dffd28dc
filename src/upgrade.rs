//! Server-side HTTP upgrade, gated behind the `upgrade` feature and powered
//! by [hyper](https://docs.rs/hyper), mirroring how the base crate's own
//! `upgrade` module hands a caller a ready-to-use connection out of a hyper
//! request instead of a raw `Upgraded` stream to wrap by hand.
//!
//! There is no hyper-based client-side handshake helper here: unlike the
//! crate this one is grounded on, [`Connection::client`](crate::connection::Connection::client)
//! already performs the full opening handshake over any [`Transport`], so a
//! client never needs hyper just to reach a `ws://`/`wss://` server.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http_body_util::Empty;
use hyper::header::{HeaderValue, CONNECTION, UPGRADE};
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;

use crate::error::{Result, WebSocketError};
use crate::handshake::accept_key;
use crate::transport::TokioTransport;

/// A [`Transport`](crate::transport::Transport) built on top of hyper's
/// upgraded connection, ready to hand to [`Endpoint::accept`](crate::endpoint::Endpoint::accept).
pub type UpgradedTransport = TokioTransport<TokioIo<Upgraded>>;

/// Validates the request as a WebSocket opening handshake and returns the
/// `101 Switching Protocols` response to send back, plus a future that
/// resolves once hyper finishes the upgrade.
///
/// ```no_run
/// use wscore::upgrade::upgrade;
/// use hyper::body::Incoming;
/// use hyper::Request;
///
/// async fn server_upgrade(
///   mut req: Request<Incoming>,
/// ) -> Result<hyper::Response<http_body_util::Empty<bytes::Bytes>>, wscore::WebSocketError> {
///   let (response, fut) = upgrade(&mut req)?;
///
///   tokio::spawn(async move {
///     let transport = fut.await?;
///     // wrap `transport` in an Endpoint::accept(...) call.
///     Ok::<_, wscore::WebSocketError>(())
///   });
///
///   Ok(response)
/// }
/// ```
pub fn upgrade<B>(req: &mut Request<B>) -> Result<(Response<Empty<bytes::Bytes>>, UpgradeFut)> {
    let headers = req.headers();

    let upgrade_ok = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrade_ok {
        return Err(WebSocketError::MissingRequiredHeader("Upgrade"));
    }

    let connection_ok = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    if !connection_ok {
        return Err(WebSocketError::MissingRequiredHeader("Connection"));
    }

    let key = headers
        .get("Sec-WebSocket-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(WebSocketError::MissingRequiredHeader("Sec-WebSocket-Key"))?;
    let accept = accept_key(key);

    let on_upgrade = hyper::upgrade::on(req);

    let mut res = Response::new(Empty::new());
    *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = res.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(
        "Sec-WebSocket-Accept",
        HeaderValue::from_str(&accept).map_err(|_| WebSocketError::BadRequest("Sec-WebSocket-Key"))?,
    );

    Ok((res, UpgradeFut { inner: on_upgrade }))
}

/// Resolves to an [`UpgradedTransport`] once hyper completes the upgrade.
#[pin_project::pin_project]
pub struct UpgradeFut {
    #[pin]
    inner: hyper::upgrade::OnUpgrade,
}

impl Future for UpgradeFut {
    type Output = Result<UpgradedTransport>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.inner.poll(cx) {
            Poll::Ready(Ok(upgraded)) => {
                let io = TokioIo::new(upgraded);
                Poll::Ready(Ok(TokioTransport::new(io, false, String::new())))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(WebSocketError::Eof)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_rejects_missing_upgrade_header() {
        let mut req = Request::builder().method("GET").uri("/").body(()).unwrap();
        assert!(matches!(upgrade(&mut req), Err(WebSocketError::MissingRequiredHeader("Upgrade"))));
    }

    #[test]
    fn upgrade_rejects_missing_key() {
        let mut req = Request::builder()
            .method("GET")
            .uri("/")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .body(())
            .unwrap();
        assert!(matches!(upgrade(&mut req), Err(WebSocketError::MissingRequiredHeader("Sec-WebSocket-Key"))));
    }

    #[test]
    fn upgrade_accepts_a_well_formed_request() {
        let mut req = Request::builder()
            .method("GET")
            .uri("/")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "keep-alive, Upgrade")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(())
            .unwrap();
        let (res, _fut) = upgrade(&mut req).unwrap();
        assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(res.headers().get("Sec-WebSocket-Accept").unwrap(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
}
