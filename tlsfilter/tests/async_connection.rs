//! The `AsyncConnection` facade, run on a `futures` executor.

use std::sync::Arc;
use std::thread;

use futures::executor::block_on;

use tlsfilter::{AlertDescription, AlertLevel, AsyncConnection, ConnectionState, Error, ProtocolVersion};

mod common;
use common::*;

fn client_handshake(end: &Duplex, client: &mut TestClient) {
    end.send(&client.client_hello());
    assert!(end.pump_client(client, |c| c.server_hello_done));
    end.send(&client.key_exchange());
    assert!(end.pump_client(client, |c| c.handshake_done));
}

#[test]
fn handshake_echo_and_close() {
    init_logging();
    let (server_end, client_end) = duplex();

    let server = thread::spawn(move || {
        block_on(async move {
            let conn = AsyncConnection::new(server_end);
            conn.authenticate_as_server(Arc::new(make_config()))
                .await?;
            assert_eq!(conn.state(), ConnectionState::Authenticated);
            assert_eq!(conn.negotiated_version(), Some(ProtocolVersion::TLSv1_1));

            let mut buf = [0u8; 64];
            let n = conn.read(&mut buf).await?;
            conn.write(&buf[..n]).await?;

            // the client's close_notify
            assert_eq!(conn.read(&mut buf).await?, 0);

            conn.close().await;
            conn.close().await;
            Ok::<_, Error>(conn.state())
        })
    });

    let mut client = TestClient::new(ProtocolVersion::TLSv1_1, &all_suites());
    client_handshake(&client_end, &mut client);

    client_end.send(&client.send_application_data(b"marco"));
    assert!(client_end.pump_client(&mut client, |c| c.plaintext.len() >= 5));
    assert_eq!(client.take_plaintext(), b"marco");

    client_end.send(&client.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify));
    assert_eq!(server.join().unwrap(), Ok(ConnectionState::Closed));

    // one close_notify in reply, then EOF
    assert!(!client_end.pump_client(&mut client, |_| false));
    assert_eq!(client.alerts.len(), 1);
}

#[test]
fn read_and_write_before_authentication_fail() {
    let (server_end, _client_end) = duplex();
    let conn = AsyncConnection::new(server_end);

    block_on(async {
        let mut buf = [0u8; 8];
        assert_eq!(
            conn.read(&mut buf).await,
            Err(Error::HandshakeNotComplete)
        );
        assert_eq!(conn.write(b"early").await, Err(Error::HandshakeNotComplete));
    });
    assert_eq!(conn.state(), ConnectionState::Unauthenticated);
}

#[test]
fn close_before_authentication() {
    let (server_end, client_end) = duplex();
    let conn = AsyncConnection::new(server_end);

    block_on(async {
        conn.close().await;
        assert_eq!(
            conn.authenticate_as_server(Arc::new(make_config()))
                .await,
            Err(Error::ConnectionClosed)
        );
        assert_eq!(conn.read(&mut [0u8; 8]).await, Ok(0));
        assert_eq!(conn.write(b"late").await, Err(Error::ConnectionClosed));
    });

    let mut buf = [0u8; 8];
    assert_eq!(client_end.rx.read(&mut buf).unwrap(), 0);
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn failed_handshake() {
    let (server_end, client_end) = duplex();

    let server = thread::spawn(move || {
        block_on(async move {
            let conn = AsyncConnection::new(server_end);
            let result = conn
                .authenticate_as_server(Arc::new(make_config()))
                .await;
            (result, conn.state())
        })
    });

    let mut client = TestClient::tls12();
    client_end.send(&client.client_hello());
    assert!(client_end.pump_client(&mut client, |c| c.server_hello_done));
    client_end.send(&client.key_exchange_with(KeyExchangeFaults {
        corrupt_finished: true,
        ..Default::default()
    }));

    let (result, state) = server.join().unwrap();
    assert_eq!(result, Err(Error::FinishedMismatch));
    assert_eq!(state, ConnectionState::Error);
    assert!(client_end.pump_client(&mut client, |c| !c.alerts.is_empty()));
    assert!(client.has_alert(AlertDescription::DecryptError));
}

#[test]
fn eof_after_handshake_ends_reads() {
    let (server_end, client_end) = duplex();

    let server = thread::spawn(move || {
        block_on(async move {
            let conn = AsyncConnection::new(server_end);
            conn.authenticate_as_server(Arc::new(make_config()))
                .await?;
            let mut buf = [0u8; 8];
            conn.read(&mut buf).await
        })
    });

    let mut client = TestClient::tls12();
    client_handshake(&client_end, &mut client);
    client_end.tx.close();

    assert_eq!(server.join().unwrap(), Ok(0));
}
