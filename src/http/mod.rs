//! The minimal HTTP/1.1 surface needed to perform the WebSocket upgrade
//! handshake: request/response line and header parsing, a parameter-list
//! grammar for `Sec-WebSocket-Extensions`/`Sec-WebSocket-Protocol`, and the
//! body framing rules shared by both directions.
//!
//! This is a hand-rolled, incremental parser rather than a pull-in of an
//! existing HTTP crate: the handshake path needs a stateful, partially-read
//! `Request`/`Response` that can be fed bytes as they arrive off the wire
//! and queried mid-parse, which general-purpose HTTP parsers are not built
//! to do.

mod body;
mod headers;
mod params;
mod request;
mod response;

pub use headers::HeaderMap;
pub use params::{parse_parameter_list, Attributes, ParameterList};
pub use request::Request;
pub use response::Response;
