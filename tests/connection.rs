//! End-to-end tests: client and server connections talking over an
//! in-memory duplex stream, covering the full handshake and close flows.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use wscore::{Config, Error, Event, accept, connect};

const ECHO_URL: &str = "ws://server.test/echo";

/// Run the client and server handshakes against each other and return both
/// open connections.
async fn pair() -> (
    wscore::Connection<DuplexStream>,
    wscore::Connection<DuplexStream>,
) {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);

    let (client, server) = tokio::join!(
        connect(client_io, ECHO_URL, &[], Config::client()),
        accept(server_io, Vec::new(), Config::server()),
    );

    (client.unwrap(), server.unwrap())
}

#[tokio::test]
async fn test_handshake_produces_open_pair() {
    let (client, server) = pair().await;
    assert!(client.is_open());
    assert!(server.is_open());
    assert_ne!(client.id(), server.id());
}

#[tokio::test]
async fn test_client_to_server_text() {
    let (mut client, mut server) = pair().await;

    client.send_text("Hello").await.unwrap();

    let event = server.next_event().await.unwrap().unwrap();
    match event {
        Event::Message { payload, is_binary } => {
            assert_eq!(payload, b"Hello");
            assert!(!is_binary);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_to_client_binary() {
    let (mut client, mut server) = pair().await;

    server.send_binary(vec![0xde, 0xad, 0xbe, 0xef]).await.unwrap();

    let event = client.next_event().await.unwrap().unwrap();
    match event {
        Event::Message { payload, is_binary } => {
            assert_eq!(payload, vec![0xde, 0xad, 0xbe, 0xef]);
            assert!(is_binary);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_large_message_roundtrip() {
    let (mut client, mut server) = pair().await;

    // 70000 bytes forces the 64-bit length path on the wire; run both ends
    // concurrently so the pipe never fills up.
    let big: Vec<u8> = (0..70000u32).map(|i| (i % 251) as u8).collect();
    let (sent, event) = tokio::join!(client.send_binary(big.clone()), server.next_event());
    sent.unwrap();

    let event = event.unwrap().unwrap();
    match event {
        Event::Message { payload, .. } => assert_eq!(payload, big),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let (mut client, mut server) = pair().await;

    client.ping(b"heartbeat".to_vec()).await.unwrap();

    // Server surfaces the ping and replies automatically
    let event = server.next_event().await.unwrap().unwrap();
    assert!(matches!(event, Event::Ping(ref d) if d == b"heartbeat"));

    let event = client.next_event().await.unwrap().unwrap();
    assert!(matches!(event, Event::Pong(ref d) if d == b"heartbeat"));
}

#[tokio::test]
async fn test_close_handshake_both_sides() {
    let (mut client, mut server) = pair().await;

    client.close(1000, "done").await.unwrap();

    // Server sees the close frame and echoes it
    let event = server.next_event().await.unwrap().unwrap();
    match event {
        Event::Close { code, reason } => {
            assert_eq!(code, 1000);
            assert_eq!(reason, "done");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(!server.is_open());

    // Client observes its own terminal close event
    let event = client.next_event().await.unwrap().unwrap();
    assert!(matches!(event, Event::Close { code: 1000, .. }));
    assert!(client.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_send_after_close_fails_without_io() {
    let (mut client, _server) = pair().await;

    client.close(1001, "").await.unwrap();

    assert!(matches!(
        client.send_text("too late").await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        client.ping(vec![]).await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_streamed_message_reassembled() {
    let (mut client, mut server) = pair().await;

    let opts = |fin| wscore::SendOptions { binary: true, fin };
    client.send(vec![1, 2], opts(false)).await.unwrap();
    client.send(vec![3], opts(false)).await.unwrap();
    client.send(vec![4, 5], opts(true)).await.unwrap();

    let event = server.next_event().await.unwrap().unwrap();
    match event {
        Event::Message { payload, is_binary } => {
            assert_eq!(payload, vec![1, 2, 3, 4, 5]);
            assert!(is_binary);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_peer_disappearing_yields_abnormal_close() {
    let (client, mut server) = pair().await;

    drop(client);

    let event = server.next_event().await.unwrap().unwrap();
    assert!(matches!(event, Event::Close { code: 1006, .. }));
}

#[tokio::test]
async fn test_oversized_message_is_fatal_for_receiver() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);

    let (client, server) = tokio::join!(
        connect(client_io, ECHO_URL, &[], Config::client()),
        accept(
            server_io,
            Vec::new(),
            Config::server().with_max_payload(16)
        ),
    );
    let (mut client, mut server) = (client.unwrap(), server.unwrap());

    client.send_binary(vec![0u8; 64]).await.unwrap();

    let err = server.next_event().await.unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { .. }));
    assert!(!server.is_open());
}

#[tokio::test]
async fn test_accept_digest_mismatch_aborts_connect() {
    let (client_io, mut raw_server) = tokio::io::duplex(1 << 16);

    let server_side = async {
        // Read the request, then answer with a digest for a different key.
        let mut buf = vec![0u8; 4096];
        let n = raw_server.read(&mut buf).await.unwrap();
        assert!(n > 0);

        raw_server
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
            )
            .await
            .unwrap();
    };

    let (result, ()) = tokio::join!(
        connect(client_io, ECHO_URL, &[], Config::client()),
        server_side
    );

    assert!(matches!(
        result,
        Err(Error::InvalidHandshake(msg)) if msg.contains("Sec-WebSocket-Accept")
    ));
}

#[tokio::test]
async fn test_non_upgrade_response_aborts_connect() {
    let (client_io, mut raw_server) = tokio::io::duplex(1 << 16);

    let server_side = async {
        let mut buf = vec![0u8; 4096];
        let n = raw_server.read(&mut buf).await.unwrap();
        assert!(n > 0);

        raw_server
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    };

    let (result, ()) = tokio::join!(
        connect(client_io, ECHO_URL, &[], Config::client()),
        server_side
    );

    assert!(matches!(result, Err(Error::InvalidHandshake(_))));
}

#[tokio::test]
async fn test_event_loop_echo_server() {
    use std::sync::{Arc, Mutex};

    let (client_io, server_io) = tokio::io::duplex(1 << 16);

    let (client, server) = tokio::join!(
        connect(client_io, ECHO_URL, &[], Config::client()),
        accept(server_io, Vec::new(), Config::server()),
    );
    let (mut client, mut server) = (client.unwrap(), server.unwrap());

    let server_task = tokio::spawn(async move {
        // Echo every message back, stop on close
        while let Some(event) = server.next_event().await.unwrap() {
            match event {
                Event::Message { payload, is_binary } => {
                    server
                        .send(payload, wscore::SendOptions { binary: is_binary, fin: true })
                        .await
                        .unwrap();
                }
                Event::Close { .. } => break,
                _ => {}
            }
        }
    });

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut handlers = wscore::EventHandlers::new();
    let l = log.clone();
    handlers.on_message(move |payload, _| {
        l.lock().unwrap().push(String::from_utf8_lossy(payload).into_owned());
    });

    client.send_text("round trip").await.unwrap();

    let event = client.next_event().await.unwrap().unwrap();
    if let Event::Message { payload, is_binary } = &event {
        assert_eq!(payload.as_slice(), b"round trip");
        assert!(!is_binary);
    } else {
        panic!("unexpected event: {event:?}");
    }
    handlers.dispatch(&event);
    assert_eq!(*log.lock().unwrap(), vec!["round trip"]);

    client.close(1000, "").await.unwrap();
    server_task.await.unwrap();
}
