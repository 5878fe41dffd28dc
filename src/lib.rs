// Copyright 2024 wscore contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! _wscore_ is a transport-agnostic WebSocket protocol engine: handshake,
//! framing, and the connection state machine, driven entirely through
//! [`Transport`] and the [`Endpoint`]/[`Handle`] pair rather than naming a
//! concrete socket type.
//!
//! # Example
//!
//! ```no_run
//! use wscore::{Config, Handlers, Endpoint, Role};
//! use wscore::transport::TokioTransport;
//! use tokio::net::TcpStream;
//!
//! # async fn handle(socket: TcpStream) -> wscore::Result<()> {
//! let endpoint: Endpoint<TokioTransport<TcpStream>> =
//!     Endpoint::new(Config::default(), Handlers::default());
//! let transport = TokioTransport::new(socket, false, "127.0.0.1:0".to_string());
//! let handle = endpoint.accept(transport);
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```
//!
//! Enable the `upgrade` feature to terminate the opening handshake inside a
//! [hyper](https://docs.rs/hyper) server instead of owning the raw socket
//! yourself; see [`upgrade`]. Enable `hybi00` to accept the legacy Hixie
//! draft 75/76 handshake from very old clients (data framing is not
//! implemented for that draft, matching the era it comes from).
//!
//! _permessage-deflate and other extensions are not supported yet — see
//! [`Config`] for the negotiation hook reserved for them._

#![cfg_attr(docsrs, feature(doc_cfg))]

mod close;
mod config;
mod connection;
mod endpoint;
mod error;
mod frame;
mod handshake;
mod http;
mod mask;
mod message;
mod processor;
pub mod transport;
#[cfg(feature = "upgrade")]
#[cfg_attr(docsrs, doc(cfg(feature = "upgrade")))]
pub mod upgrade;
mod uri;
mod utf8;

pub use crate::close::CloseCode;
pub use crate::config::{Config, DefaultMessageAllocator, Handlers, MessageAllocator, TerminationHandler};
pub use crate::connection::{ConnectionRef, State};
pub use crate::endpoint::{Endpoint, Handle};
pub use crate::error::{Result, WebSocketError};
pub use crate::frame::OpCode;
pub use crate::handshake::{accept_key, generate_key, verify_accept};
pub use crate::message::Message;
pub use crate::uri::Uri;

/// Which side of the handshake a connection plays. Plain `Copy` rather than
/// the bare `PartialEq` this started from: it is threaded through every
/// layer below the endpoint, including across `.await` points, so it needs
/// to be at least as cheap to pass around as the `Handle` it rides beside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}
