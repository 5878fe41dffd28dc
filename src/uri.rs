//! Parsing and canonicalizing `ws://`/`wss://`/`http://`/`https://` URIs.
//!
//! Grounded on `websocketpp::uri`: the same four accepted schemes, the same
//! default-port-elision rule in `str()`, and the same bracket-stripping for
//! IPv6 literals.

use crate::error::WebSocketError;

/// An immutable, parsed WebSocket/HTTP URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    scheme: Scheme,
    host: String,
    port: u16,
    resource: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Wss,
    Http,
    Https,
}

impl Scheme {
    fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Scheme::Ws | Scheme::Http => 80,
            Scheme::Wss | Scheme::Https => 443,
        }
    }

    fn is_secure(&self) -> bool {
        matches!(self, Scheme::Wss | Scheme::Https)
    }

    fn parse(s: &str) -> Result<Scheme, WebSocketError> {
        match s {
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(WebSocketError::BadRequest("unsupported URI scheme")),
        }
    }
}

impl Uri {
    /// Constructs a URI from explicit fields, defaulting `resource` to `/`
    /// if empty, the way `websocketpp::uri`'s non-parsing constructors do.
    pub fn new(secure: bool, host: impl Into<String>, port: u16, resource: impl Into<String>) -> Uri {
        let resource = resource.into();
        Uri {
            scheme: if secure { Scheme::Wss } else { Scheme::Ws },
            host: host.into(),
            port,
            resource: if resource.is_empty() { "/".to_string() } else { resource },
        }
    }

    /// Parses `scheme://host[:port][/resource]`. `host` may be a DNS label,
    /// an IPv4 literal, or a bracketed IPv6 literal (brackets are stripped).
    pub fn parse(input: &str) -> Result<Uri, WebSocketError> {
        let (scheme_str, rest) = input
            .split_once("://")
            .ok_or(WebSocketError::BadRequest("missing URI scheme"))?;
        let scheme = Scheme::parse(scheme_str)?;

        let (authority, resource) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(WebSocketError::BadRequest("empty URI host"));
        }

        let (host, port_str) = split_authority(authority)?;
        let port = match port_str {
            Some(p) => parse_port(p)?,
            None => scheme.default_port(),
        };

        let resource = if resource.is_empty() {
            "/".to_string()
        } else {
            resource.to_string()
        };

        Ok(Uri {
            scheme,
            host,
            port,
            resource,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }

    /// `host:port`, unconditionally including the port.
    pub fn authority(&self) -> String {
        format!("{}:{}", host_for_display(&self.host), self.port)
    }

    /// `host` alone when the port is the scheme default, else `host:port`.
    pub fn host_port(&self) -> String {
        if self.port == self.scheme.default_port() {
            host_for_display(&self.host)
        } else {
            self.authority()
        }
    }

    /// Regenerates a canonical string form, eliding the port when it equals
    /// the scheme default.
    pub fn str(&self) -> String {
        let mut out = String::new();
        out.push_str(self.scheme.as_str());
        out.push_str("://");
        out.push_str(&host_for_display(&self.host));
        if self.port != self.scheme.default_port() {
            out.push(':');
            out.push_str(&self.port.to_string());
        }
        out.push_str(&self.resource);
        out
    }
}

fn host_for_display(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

/// Splits `authority` into (host, optional port string), stripping IPv6
/// brackets. `[::1]:8080` -> ("::1", Some("8080")); `[::1]` -> ("::1", None);
/// `example.com:8080` -> ("example.com", Some("8080")).
fn split_authority(authority: &str) -> Result<(String, Option<&str>), WebSocketError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let close = rest
            .find(']')
            .ok_or(WebSocketError::BadRequest("unterminated IPv6 literal"))?;
        let host = rest[..close].to_string();
        let after = &rest[close + 1..];
        let port = match after.strip_prefix(':') {
            Some(p) => Some(p),
            None if after.is_empty() => None,
            None => return Err(WebSocketError::BadRequest("garbage after IPv6 literal")),
        };
        return Ok((host, port));
    }

    match authority.rfind(':') {
        Some(idx) => Ok((authority[..idx].to_string(), Some(&authority[idx + 1..]))),
        None => Ok((authority.to_string(), None)),
    }
}

fn parse_port(s: &str) -> Result<u16, WebSocketError> {
    let port: u32 = s
        .parse()
        .map_err(|_| WebSocketError::BadRequest("invalid port"))?;
    if port == 0 || port > 65535 {
        return Err(WebSocketError::BadRequest("port out of range"));
    }
    Ok(port as u16)
}
