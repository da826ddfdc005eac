//! End-to-end session tests against an in-process server stub.
//!
//! The stub owns the RSA private key and the client's AES key, so it can
//! play the server side of the cookie handshake over real loopback UDP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use labrys_core::{
    BincodeCodec, Handshake, Ping, Pong, Session, SessionConfig, SessionError, SessionEvents,
    WireCodec, record, record_type,
};
use labrys_crypto::{Aes256Cbc, AsymmetricCipher, CryptoError, RsaOaep, SymmetricCipher};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

const CLIENT_KEY: [u8; 32] = [0x01; 32];
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct ServerStub {
    socket: UdpSocket,
    rsa: RsaOaep,
    aes: Aes256Cbc,
    codec: BincodeCodec,
}

impl ServerStub {
    async fn start() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            rsa: RsaOaep::generate(2048).unwrap(),
            aes: Aes256Cbc::new(),
            codec: BincodeCodec,
        }
    }

    fn public_key_pem(&self) -> Vec<u8> {
        self.rsa.public_key().unwrap()
    }

    fn config(&self) -> SessionConfig {
        SessionConfig::new(
            self.socket.local_addr().unwrap(),
            self.public_key_pem(),
            CLIENT_KEY.to_vec(),
        )
    }

    async fn recv_record(&self) -> (record::Record, SocketAddr) {
        let mut buf = vec![0u8; 4096];
        let (n, from) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for a datagram")
            .unwrap();
        (record::decode(&buf[..n]).unwrap(), from)
    }

    /// Receive a ClientHello and open its asymmetric envelope.
    async fn recv_client_hello(&self) -> (Handshake, SocketAddr) {
        let (rec, from) = self.recv_record().await;
        assert_eq!(rec.record_type, record_type::CLIENT_HELLO);
        let body = self.rsa.decrypt(&rec.body).unwrap();
        (self.codec.decode_handshake(&body).unwrap(), from)
    }

    /// Symmetrically encrypt a body under the client key and send it framed.
    async fn send_sym(&self, to: SocketAddr, record_type: u8, body: &[u8]) {
        let sealed = self.aes.encrypt(body, &CLIENT_KEY).unwrap();
        self.socket
            .send_to(&record::encode(record_type, &sealed), to)
            .await
            .unwrap();
    }

    async fn send_hello_verify(&self, to: SocketAddr, cookie: &[u8]) {
        let verify = Handshake {
            cookie: cookie.to_vec(),
            ..Handshake::default()
        };
        let body = self.codec.encode_handshake(&verify).unwrap();
        self.send_sym(to, record_type::HELLO_VERIFY, &body).await;
    }

    async fn send_server_hello(&self, to: SocketAddr, session_id: &[u8]) {
        let hello = Handshake {
            session_id: session_id.to_vec(),
            ..Handshake::default()
        };
        let body = self.codec.encode_handshake(&hello).unwrap();
        self.send_sym(to, record_type::SERVER_HELLO, &body).await;
    }

    /// Drive the full server side of the handshake and return the client's
    /// address and the handshake it sent on the second hop.
    async fn complete_handshake(
        &self,
        cookie: &[u8],
        session_id: &[u8],
    ) -> (SocketAddr, Handshake) {
        let (_, from) = self.recv_client_hello().await;
        self.send_hello_verify(from, cookie).await;
        let (second, from) = self.recv_client_hello().await;
        self.send_server_hello(from, session_id).await;
        (from, second)
    }

    /// Open a post-handshake record from the client: decrypt and split off
    /// the embedded session id.
    fn open_bound_record(&self, rec: &record::Record, session_id: &[u8]) -> Vec<u8> {
        let plaintext = self.aes.decrypt(&rec.body, &CLIENT_KEY).unwrap();
        assert!(
            plaintext.starts_with(session_id),
            "record not bound to session: {plaintext:02X?}"
        );
        plaintext[session_id.len()..].to_vec()
    }
}

struct Recorder {
    connected: AtomicUsize,
    connected_tx: mpsc::UnboundedSender<()>,
    ping_tx: mpsc::UnboundedSender<i64>,
    record_tx: mpsc::UnboundedSender<(u8, Vec<u8>)>,
}

struct RecorderRx {
    connected: mpsc::UnboundedReceiver<()>,
    pings: mpsc::UnboundedReceiver<i64>,
    records: mpsc::UnboundedReceiver<(u8, Vec<u8>)>,
}

fn recorder() -> (Arc<Recorder>, RecorderRx) {
    let (connected_tx, connected) = mpsc::unbounded_channel();
    let (ping_tx, pings) = mpsc::unbounded_channel();
    let (record_tx, records) = mpsc::unbounded_channel();
    (
        Arc::new(Recorder {
            connected: AtomicUsize::new(0),
            connected_tx,
            ping_tx,
            record_tx,
        }),
        RecorderRx {
            connected,
            pings,
            records,
        },
    )
}

impl SessionEvents for Recorder {
    fn on_connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
        let _ = self.connected_tx.send(());
    }

    fn on_ping_result(&self, rtt_ms: i64) {
        let _ = self.ping_tx.send(rtt_ms);
    }

    fn on_server_record(&self, record_type: u8, payload: Vec<u8>) {
        let _ = self.record_tx.send((record_type, payload));
    }
}

#[tokio::test]
async fn handshake_echoes_cookie_and_binds_records_to_session() {
    let server = ServerStub::start().await;
    let (events, mut rx) = recorder();
    let session = Session::new(server.config(), events.clone()).await.unwrap();

    session.connect(b"auth-token").await.unwrap();

    // First hello: fresh 32-byte random, the symmetric key, nothing else.
    let (first, from) = server.recv_client_hello().await;
    assert_eq!(first.random.len(), 32);
    assert_eq!(first.key, CLIENT_KEY);
    assert!(first.cookie.is_empty());
    assert!(first.token.is_empty());
    assert!(first.session_id.is_empty());

    server.send_hello_verify(from, &[0xCA, 0xFE]).await;

    // Second hello: cookie echoed, random unchanged, token sym-wrapped.
    let (second, from) = server.recv_client_hello().await;
    assert_eq!(second.cookie, [0xCA, 0xFE]);
    assert_eq!(second.random, first.random);
    assert_eq!(second.key, CLIENT_KEY);
    assert!(second.timestamp > 0);
    let token = server.aes.decrypt(&second.token, &CLIENT_KEY).unwrap();
    assert_eq!(token, b"auth-token");

    server.send_server_hello(from, &[0xA1, 0xB2]).await;

    timeout(RECV_TIMEOUT, rx.connected.recv())
        .await
        .expect("on_connected never fired")
        .unwrap();
    assert!(session.is_established());
    assert_eq!(events.connected.load(Ordering::SeqCst), 1);

    // Application records embed the session id inside the ciphertext.
    session.send_to_server(24, b"hi").await.unwrap();
    let (rec, _) = server.recv_record().await;
    assert_eq!(rec.record_type, 24);
    assert_eq!(server.open_bound_record(&rec, &[0xA1, 0xB2]), b"hi");

    // A duplicate ServerHello must not re-fire the callback.
    server.send_server_hello(from, &[0xDE, 0xAD]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(events.connected.load(Ordering::SeqCst), 1);

    session.disconnect().await;
}

#[tokio::test]
async fn short_key_is_rejected_before_any_socket_opens() {
    let server = ServerStub::start().await;
    let config = SessionConfig::new(
        server.socket.local_addr().unwrap(),
        server.public_key_pem(),
        vec![0x01; 16],
    );
    let (events, _rx) = recorder();

    let err = Session::new(config, events)
        .await
        .err()
        .expect("construction must fail on a short key");
    assert!(matches!(
        err,
        SessionError::Crypto(CryptoError::InsecureKeySize {
            minimum: 32,
            actual: 16,
        })
    ));
}

#[tokio::test]
async fn ticker_is_silent_until_session_established() {
    let server = ServerStub::start().await;
    let config = server.config().with_ping_interval(Duration::from_millis(30));
    let (events, _rx) = recorder();
    let session = Session::new(config, events).await.unwrap();

    session.connect(b"token").await.unwrap();
    let (_, _) = server.recv_client_hello().await;

    // Several ticker periods pass without a ServerHello; nothing may be
    // sent in that window.
    let mut buf = [0u8; 64];
    let quiet = timeout(Duration::from_millis(200), server.socket.recv_from(&mut buf)).await;
    assert!(quiet.is_err(), "engine sent a datagram before establishment");

    session.disconnect().await;
}

#[tokio::test]
async fn ping_roundtrips_report_server_side_delta() {
    let server = ServerStub::start().await;
    let config = server.config().with_ping_interval(Duration::from_millis(50));
    let (events, mut rx) = recorder();
    let session = Session::new(config, events).await.unwrap();

    session.connect(b"token").await.unwrap();
    let session_id = [0xA1u8, 0xB2];
    let (client_addr, _) = server.complete_handshake(&[0xCA, 0xFE], &session_id).await;

    // Echo every ping as a pong stamped three milliseconds after the
    // client's own send stamp.
    let echo = tokio::spawn(async move {
        for _ in 0..3 {
            let (rec, _) = server.recv_record().await;
            assert_eq!(rec.record_type, record_type::PING);
            let body = server.open_bound_record(&rec, &session_id);
            let ping: Ping = server.codec.decode_ping(&body).unwrap();

            let pong = Pong {
                ping_sent_at: ping.sent_at,
                received_at: ping.sent_at + 3,
                sent_at: ping.sent_at + 5,
            };
            let body = server.codec.encode_pong(&pong).unwrap();
            server.send_sym(client_addr, record_type::PONG, &body).await;
        }
    });

    for _ in 0..3 {
        let rtt = timeout(RECV_TIMEOUT, rx.pings.recv())
            .await
            .expect("no ping result")
            .unwrap();
        assert_eq!(rtt, 3);
    }

    echo.await.unwrap();
    session.disconnect().await;
}

#[tokio::test]
async fn undersized_datagram_is_dropped_without_killing_the_session() {
    let server = ServerStub::start().await;
    let (events, mut rx) = recorder();
    let session = Session::new(server.config(), events).await.unwrap();

    session.connect(b"token").await.unwrap();
    let (client_addr, _) = server.complete_handshake(&[0x01], &[0xA1, 0xB2]).await;

    // One lone byte: below the minimum record size.
    server.socket.send_to(&[0xFF], client_addr).await.unwrap();

    // The session keeps dispatching afterwards.
    server.send_sym(client_addr, 42, b"still alive").await;
    let (record_type, payload) = timeout(RECV_TIMEOUT, rx.records.recv())
        .await
        .expect("record not delivered after junk datagram")
        .unwrap();
    assert_eq!(record_type, 42);
    assert_eq!(payload, b"still alive");

    session.disconnect().await;
}

#[tokio::test]
async fn oversized_datagram_is_dropped_without_killing_the_session() {
    let server = ServerStub::start().await;
    let config = server.config().with_read_buffer_size(128);
    let (events, mut rx) = recorder();
    let session = Session::new(config, events).await.unwrap();

    session.connect(b"token").await.unwrap();
    let (client_addr, _) = server.complete_handshake(&[0x01], &[0xA1, 0xB2]).await;

    server
        .socket
        .send_to(&[0xAAu8; 200], client_addr)
        .await
        .unwrap();

    server.send_sym(client_addr, 42, b"fits").await;
    let (record_type, payload) = timeout(RECV_TIMEOUT, rx.records.recv())
        .await
        .expect("record not delivered after oversized datagram")
        .unwrap();
    assert_eq!(record_type, 42);
    assert_eq!(payload, b"fits");

    session.disconnect().await;
}

#[tokio::test]
async fn disconnect_stops_pings_and_allows_a_fresh_handshake() {
    let server = ServerStub::start().await;
    let config = server.config().with_ping_interval(Duration::from_millis(25));
    let (events, _rx) = recorder();
    let session = Session::new(config, events).await.unwrap();

    session.connect(b"token-one").await.unwrap();
    let (_, first) = server.complete_handshake(&[0x01], &[0xA1, 0xB2]).await;

    // At least one ping makes it out while the session is live.
    let (rec, _) = server.recv_record().await;
    assert_eq!(rec.record_type, record_type::PING);

    session.disconnect().await;
    assert!(!session.is_established());

    // Sends now fail cleanly.
    assert!(matches!(
        session.send_to_server(24, b"late").await,
        Err(SessionError::NotEstablished)
    ));

    // Disconnect is idempotent.
    session.disconnect().await;

    // Drain anything that was in flight, then require silence.
    let mut buf = [0u8; 256];
    while timeout(Duration::from_millis(150), server.socket.recv_from(&mut buf))
        .await
        .is_ok()
    {}

    // A new connect starts a fresh handshake with a fresh random.
    session.connect(b"token-two").await.unwrap();
    let (second, _) = server.recv_client_hello().await;
    assert_eq!(second.random.len(), 32);
    assert_ne!(second.random, first.random);
    assert!(second.cookie.is_empty());

    session.disconnect().await;
}
