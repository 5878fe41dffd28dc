//! End-to-end scenarios exercising the connection state machine over a raw,
//! byte-literal wire exchange — the same request/response bytes a real
//! client would send, driven through `Endpoint::accept` rather than any
//! internal API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use wscore::transport::TokioTransport;
use wscore::{CloseCode, Config, Endpoint, Handlers, OpCode};

type Transport = TokioTransport<tokio::io::DuplexStream>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn read_some(io: &mut tokio::io::DuplexStream) -> Vec<u8> {
    let mut buf = [0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(1), io.read(&mut buf)).await.unwrap().unwrap();
    buf[..n].to_vec()
}

const HANDSHAKE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\n\
Host: www.example.com\r\n\
Connection: upgrade\r\n\
Upgrade: websocket\r\n\
Sec-WebSocket-Version: 13\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Origin: http://www.example.com\r\n\r\n";

#[tokio::test]
async fn scenario_1_successful_handshake_and_small_binary_echo() {
    init_logging();
    let (mut client_io, server_io) = duplex(4096);
    let transport: Transport = TokioTransport::new(server_io, false, "test".to_string());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handlers = Handlers::default();
    handlers.message = Some(Arc::new(move |opcode, payload| {
        let _ = tx.send((opcode, payload));
    }));

    let endpoint: Endpoint<Transport> = Endpoint::new(Config::default(), handlers);
    let handle = endpoint.accept(transport);

    client_io.write_all(HANDSHAKE_REQUEST).await.unwrap();
    let response = read_some(&mut client_io).await;
    let response_text = String::from_utf8_lossy(&response);
    assert!(response_text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response_text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

    // A masked binary frame carrying "**": `82 82 FF FF FF FF D5 D5`.
    client_io.write_all(&[0x82, 0x82, 0xFF, 0xFF, 0xFF, 0xFF, 0xD5, 0xD5]).await.unwrap();

    let (opcode, payload) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(opcode, OpCode::Binary);
    assert_eq!(payload.as_ref(), b"**");

    endpoint.send(handle, OpCode::Binary, payload).unwrap();
    let echoed = read_some(&mut client_io).await;
    assert_eq!(echoed, vec![0x82, 0x02, 0x2A, 0x2A]);
}

#[tokio::test]
async fn scenario_2_unsupported_version_gets_400() {
    init_logging();
    let (mut client_io, server_io) = duplex(4096);
    let transport: Transport = TokioTransport::new(server_io, false, "test".to_string());
    let endpoint: Endpoint<Transport> = Endpoint::new(Config::default(), Handlers::default());
    let _handle = endpoint.accept(transport);

    let request = b"GET / HTTP/1.1\r\nHost: www.example.com\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\
                     Sec-WebSocket-Version: 14\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
    client_io.write_all(request).await.unwrap();
    let response = read_some(&mut client_io).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(text.contains("Sec-WebSocket-Version: 0, 7, 8, 13\r\n"));
}

#[tokio::test]
async fn scenario_3_validate_handler_rejects_with_403() {
    init_logging();
    let (mut client_io, server_io) = duplex(4096);
    let transport: Transport = TokioTransport::new(server_io, false, "test".to_string());
    let mut handlers = Handlers::default();
    handlers.validate = Some(Arc::new(|| false));
    let endpoint: Endpoint<Transport> = Endpoint::new(Config::default(), handlers);
    let _handle = endpoint.accept(transport);

    client_io.write_all(HANDSHAKE_REQUEST).await.unwrap();
    let response = read_some(&mut client_io).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
}

#[tokio::test]
async fn scenario_4_control_frame_too_large_closes_with_protocol_error() {
    init_logging();
    let (mut client_io, server_io) = duplex(4096);
    let transport: Transport = TokioTransport::new(server_io, false, "test".to_string());
    let endpoint: Endpoint<Transport> = Endpoint::new(Config::default(), Handlers::default());
    let _handle = endpoint.accept(transport);

    client_io.write_all(HANDSHAKE_REQUEST).await.unwrap();
    let _ = read_some(&mut client_io).await;

    // A close frame claiming a 126-byte payload: `88 7E 00 7E` + 126 bytes.
    // Masked, since the server only accepts masked client frames: header,
    // then the 2-byte extended length, then the 4-byte mask key, then the
    // (masked) payload.
    let mut frame = vec![0x88, 0xFE, 0x00, 0x7E, 0x00, 0x00, 0x00, 0x00];
    frame.extend(std::iter::repeat(0u8).take(126));
    client_io.write_all(&frame).await.unwrap();

    let response = read_some(&mut client_io).await;
    assert_eq!(response[0] & 0x0F, 0x8, "expects a close frame");
    let code = u16::from_be_bytes([response[2], response[3]]);
    assert_eq!(code, CloseCode::ProtocolError.as_u16());
}

#[tokio::test]
async fn scenario_5_fragmented_message_with_interleaved_ping() {
    init_logging();
    let (mut client_io, server_io) = duplex(4096);
    let transport: Transport = TokioTransport::new(server_io, false, "test".to_string());

    #[derive(Debug)]
    enum Event {
        Ping(Vec<u8>),
        Message(OpCode, Vec<u8>),
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_ping = tx.clone();
    let mut handlers = Handlers::default();
    handlers.ping = Some(Arc::new(move |payload: &[u8]| {
        let _ = tx_ping.send(Event::Ping(payload.to_vec()));
        true
    }));
    handlers.message = Some(Arc::new(move |opcode, payload| {
        let _ = tx.send(Event::Message(opcode, payload.to_vec()));
    }));

    let endpoint: Endpoint<Transport> = Endpoint::new(Config::default(), handlers);
    let _handle = endpoint.accept(transport);

    client_io.write_all(HANDSHAKE_REQUEST).await.unwrap();
    let _ = read_some(&mut client_io).await;

    // Same three frames as the literal `02 01 2A 89 00 80 01 2A` scenario,
    // masked with an all-zero key (payload bytes unchanged on the wire).
    client_io.write_all(&[0x02, 0x81, 0x00, 0x00, 0x00, 0x00, 0x2A]).await.unwrap();
    client_io.write_all(&[0x89, 0x80, 0x00, 0x00, 0x00, 0x00]).await.unwrap();
    client_io.write_all(&[0x80, 0x81, 0x00, 0x00, 0x00, 0x00, 0x2A]).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    match first {
        Event::Ping(payload) => assert!(payload.is_empty()),
        other => panic!("expected ping first, got {other:?}"),
    }
    let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    match second {
        Event::Message(opcode, payload) => {
            assert_eq!(opcode, OpCode::Binary);
            assert_eq!(payload, b"**");
        }
        other => panic!("expected a reassembled message second, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_6_missing_client_mask_closes_with_protocol_error() {
    init_logging();
    let (mut client_io, server_io) = duplex(4096);
    let transport: Transport = TokioTransport::new(server_io, false, "test".to_string());
    let endpoint: Endpoint<Transport> = Endpoint::new(Config::default(), Handlers::default());
    let _handle = endpoint.accept(transport);

    client_io.write_all(HANDSHAKE_REQUEST).await.unwrap();
    let _ = read_some(&mut client_io).await;

    // An unmasked text frame carrying "hi": the mask bit is unset, which a
    // server must reject outright.
    client_io.write_all(&[0x81, 0x02, b'h', b'i']).await.unwrap();

    let response = read_some(&mut client_io).await;
    assert_eq!(response[0] & 0x0F, 0x8, "expects a close frame");
    let code = u16::from_be_bytes([response[2], response[3]]);
    assert_eq!(code, CloseCode::ProtocolError.as_u16());
}

#[tokio::test]
async fn accept_key_matches_the_rfc6455_reference_vector() {
    init_logging();
    assert_eq!(wscore::accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn connection_ref_handle_and_state_are_send_and_sync() {
    assert_send_sync::<wscore::ConnectionRef>();
    assert_send_sync::<wscore::Handle>();
    let _ = Mutex::new(wscore::State::Open);
}
