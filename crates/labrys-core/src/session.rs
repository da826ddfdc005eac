//! The encrypted UDP session engine.
//!
//! A [`Session`] owns one connected UDP socket and drives the
//! DTLS-inspired handshake from the client side:
//!
//! ```text
//! ClientHello₁ {random, key}            --asym-->  server
//! server  --sym-->  HelloVerify {cookie}
//! ClientHello₂ {cookie, random, key,
//!               token (sym-wrapped),
//!               timestamp}              --asym-->  server
//! server  --sym-->  ServerHello {session_id}
//! ```
//!
//! Both ClientHellos are sealed to the server's RSA key because they carry
//! the symmetric session key and the server has not yet authenticated the
//! sender. Everything the server sends, and every post-handshake record in
//! either direction, is encrypted under the client's symmetric key. The
//! cookie is opaque to the client; echoing it proves return-routability so
//! the server can stay stateless until ClientHello₂.
//!
//! Per connection cycle the engine runs three tasks: a reader that owns
//! socket reads and feeds an unbounded channel, a serial record handler
//! that drains it, and the ping scheduler. Reader and scheduler observe a
//! single watch-channel cancellation; the handler exits when the reader
//! drops the channel.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use labrys_crypto::{
    Aes256Cbc, AsymmetricCipher, HANDSHAKE_RANDOM_SIZE, RsaOaep, SessionKey, SymmetricCipher,
};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::{RecordError, SessionError};
use crate::record::{self, MIN_DATAGRAM_SIZE, Record, record_type};
use crate::wire::{BincodeCodec, Handshake, Ping, Pong, WireCodec};

/// Default ceiling on accepted datagram size, in bytes
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2048;

/// Default cadence of the latency probe
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Milliseconds since the Unix epoch
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Outbound events raised by the session engine.
///
/// Implementations must be total; the engine does not catch panics from
/// callbacks. `on_connected` is invoked inline by the record handler, so
/// it is guaranteed to happen before any `on_server_record` of the same
/// connection cycle. `on_ping_result` and `on_server_record` run on
/// detached tasks and carry no ordering guarantee between each other.
pub trait SessionEvents: Send + Sync + 'static {
    /// Fired exactly once per successful handshake
    fn on_connected(&self) {}

    /// Fired for every completed ping/pong roundtrip with the measured
    /// `received_at - ping_sent_at` in milliseconds
    fn on_ping_result(&self, rtt_ms: i64) {
        let _ = rtt_ms;
    }

    /// Fired for every decrypted non-control record
    fn on_server_record(&self, record_type: u8, payload: Vec<u8>) {
        let _ = (record_type, payload);
    }
}

/// Static session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// UDP endpoint of the game server
    pub server_addr: SocketAddr,
    /// Server's long-term RSA public key, PKCS#1 PEM bytes
    pub server_public_key: Vec<u8>,
    /// Client symmetric session key; must be exactly 32 bytes
    pub session_key: Vec<u8>,
    /// Largest datagram accepted off the socket
    pub read_buffer_size: usize,
    /// Cadence of the latency probe
    pub ping_interval: Duration,
}

impl SessionConfig {
    /// Configuration with default buffer size and ping cadence
    #[must_use]
    pub fn new(server_addr: SocketAddr, server_public_key: Vec<u8>, session_key: Vec<u8>) -> Self {
        Self {
            server_addr,
            server_public_key,
            session_key,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }

    /// Override the read buffer ceiling
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Override the ping cadence
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}

struct SessionInner {
    socket: UdpSocket,
    config: SessionConfig,
    symmetric: Arc<dyn SymmetricCipher>,
    asymmetric: Arc<dyn AsymmetricCipher>,
    codec: Arc<dyn WireCodec>,
    events: Arc<dyn SessionEvents>,
    session_key: SessionKey,
    auth_token: RwLock<Vec<u8>>,
    // Fixed from the first ClientHello through the successful ServerHello;
    // never regenerated on a HelloVerify retry.
    handshake_random: RwLock<Option<[u8; HANDSHAKE_RANDOM_SIZE]>>,
    // Assigned exactly once per connect cycle, by the record handler.
    session_id: RwLock<Option<Vec<u8>>>,
    running: AtomicBool,
}

/// Per-connection-cycle task state
#[derive(Default)]
struct Lifecycle {
    stop: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Client side of the encrypted UDP session.
///
/// Created once with static configuration; a lifetime of traffic runs
/// between [`Session::connect`] and [`Session::disconnect`], and the same
/// engine can be reconnected with a fresh token for the next game.
pub struct Session {
    inner: Arc<SessionInner>,
    lifecycle: Mutex<Lifecycle>,
}

impl Session {
    /// Create a session engine with the default cipher and codec suite
    /// (AES-256-CBC records, RSA-OAEP handshake envelopes, bincode bodies).
    ///
    /// # Errors
    ///
    /// Fails with `SessionError::Crypto(InsecureKeySize)` before any socket
    /// is opened if the symmetric key is shorter than 32 bytes, and with
    /// `SessionError::Io` if the socket cannot be bound or connected.
    pub async fn new(
        config: SessionConfig,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Self, SessionError> {
        Self::with_parts(
            config,
            Arc::new(Aes256Cbc::new()),
            Arc::new(RsaOaep::encrypt_only()),
            Arc::new(BincodeCodec),
            events,
        )
        .await
    }

    /// Create a session engine over explicit cipher and codec seams.
    ///
    /// # Errors
    ///
    /// Same contract as [`Session::new`].
    pub async fn with_parts(
        config: SessionConfig,
        symmetric: Arc<dyn SymmetricCipher>,
        asymmetric: Arc<dyn AsymmetricCipher>,
        codec: Arc<dyn WireCodec>,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Self, SessionError> {
        // Key validation comes first: a rejected key must not open a socket.
        let session_key = SessionKey::new(&config.session_key)?;

        let bind_addr = SocketAddr::new(
            if config.server_addr.is_ipv4() {
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            } else {
                IpAddr::V6(Ipv6Addr::UNSPECIFIED)
            },
            0,
        );
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(config.server_addr).await?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                socket,
                config,
                symmetric,
                asymmetric,
                codec,
                events,
                session_key,
                auth_token: RwLock::new(Vec::new()),
                handshake_random: RwLock::new(None),
                session_id: RwLock::new(None),
                running: AtomicBool::new(false),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Begin a connection cycle: send the first ClientHello and start the
    /// reader, record handler and ping scheduler.
    ///
    /// Completion of the handshake is observable only through
    /// [`SessionEvents::on_connected`]; there is no timeout here, so a
    /// caller that wants one wraps the wait itself. Calling `connect` on a
    /// live session tears the previous cycle down first.
    ///
    /// # Errors
    ///
    /// Returns encoding, encryption or socket errors from building and
    /// sending the first hello. Later problems are logged instead.
    pub async fn connect(&self, auth_token: &[u8]) -> Result<(), SessionError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown(&mut lifecycle).await;

        let inner = &self.inner;
        *lock_write(&inner.session_id) = None;
        *lock_write(&inner.auth_token) = auth_token.to_vec();

        let random = labrys_crypto::random::random_32()?;
        *lock_write(&inner.handshake_random) = Some(random);

        let hello = Handshake {
            random: random.to_vec(),
            key: inner.session_key.as_bytes().to_vec(),
            ..Handshake::default()
        };
        let body = inner.codec.encode_handshake(&hello)?;
        let sealed = inner
            .asymmetric
            .encrypt(&body, &inner.config.server_public_key)?;
        inner
            .socket
            .send(&record::encode(record_type::CLIENT_HELLO, &sealed))
            .await?;
        tracing::debug!(server = %inner.config.server_addr, "client hello sent");

        let (stop_tx, stop_rx) = watch::channel(false);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        inner.running.store(true, Ordering::SeqCst);

        lifecycle.tasks.push(tokio::spawn({
            let inner = Arc::clone(inner);
            let stop = stop_rx.clone();
            async move { inner.read_loop(raw_tx, stop).await }
        }));
        lifecycle.tasks.push(tokio::spawn({
            let inner = Arc::clone(inner);
            async move { inner.record_loop(raw_rx).await }
        }));
        lifecycle.tasks.push(tokio::spawn({
            let inner = Arc::clone(inner);
            async move { inner.ping_loop(stop_rx).await }
        }));
        lifecycle.stop = Some(stop_tx);

        Ok(())
    }

    /// Stop the connection cycle: cancel the reader and ping scheduler,
    /// wait for all tasks to drain, and clear the session identifier.
    ///
    /// Safe to call repeatedly; a disconnect on an idle session is a no-op.
    pub async fn disconnect(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("disconnect on idle session");
        }
        let mut lifecycle = self.lifecycle.lock().await;
        self.teardown(&mut lifecycle).await;
        *lock_write(&self.inner.session_id) = None;
        tracing::info!("disconnected");
    }

    /// Encrypt and send an application record.
    ///
    /// The session identifier is prepended inside the ciphertext, which
    /// binds the record to the session without revealing the id on the
    /// wire.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NotEstablished`] until the handshake has
    /// completed (or after a disconnect), and otherwise surfaces crypto and
    /// socket errors.
    pub async fn send_to_server(
        &self,
        record_type: u8,
        message: &[u8],
    ) -> Result<(), SessionError> {
        self.inner.seal_and_send(record_type, message).await
    }

    /// Whether the handshake has completed for the current cycle
    #[must_use]
    pub fn is_established(&self) -> bool {
        lock_read(&self.inner.session_id).is_some()
    }

    /// Local socket address
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    async fn teardown(&self, lifecycle: &mut Lifecycle) {
        self.inner.running.store(false, Ordering::SeqCst);
        // Dropping the watch sender cancels the reader and the ping
        // scheduler; the record handler follows once the reader releases
        // the channel.
        lifecycle.stop.take();
        for task in lifecycle.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl SessionInner {
    async fn read_loop(
        self: Arc<Self>,
        raw_records: mpsc::UnboundedSender<Vec<u8>>,
        mut stop: watch::Receiver<bool>,
    ) {
        // One extra byte so an oversized datagram is detected instead of
        // silently truncated.
        let limit = self.config.read_buffer_size;
        let mut buf = vec![0u8; limit + 1];

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                received = self.socket.recv(&mut buf) => match received {
                    Ok(n) if n > limit => {
                        tracing::warn!(
                            "dropping datagram: {}",
                            RecordError::ExceedsReadBuffer { actual: n, limit }
                        );
                    }
                    Ok(n) => {
                        if raw_records.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // UDP read errors are not fatal; disconnect is the
                        // only legitimate path out of this loop.
                        tracing::warn!("error reading from socket: {e}");
                    }
                },
            }
        }

        tracing::debug!("read loop terminated");
    }

    async fn record_loop(self: Arc<Self>, mut raw_records: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(payload) = raw_records.recv().await {
            self.handle_raw_record(&payload).await;
        }
        tracing::debug!("record handler terminated");
    }

    async fn handle_raw_record(&self, payload: &[u8]) {
        if payload.len() < MIN_DATAGRAM_SIZE {
            tracing::warn!(
                "dropping datagram: {}",
                RecordError::BelowMinimumSize {
                    actual: payload.len()
                }
            );
            return;
        }

        let rec = match record::decode(payload) {
            Ok(rec) => rec,
            Err(e) => {
                tracing::warn!("error parsing record: {e}");
                return;
            }
        };

        match rec.record_type {
            record_type::HELLO_VERIFY => {
                if let Err(e) = self.answer_hello_verify(&rec).await {
                    tracing::warn!("error handling hello verify: {e}");
                }
            }
            record_type::SERVER_HELLO => {
                if let Err(e) = self.accept_server_hello(&rec) {
                    tracing::warn!("error handling server hello: {e}");
                }
            }
            record_type::PONG => {
                if let Err(e) = self.handle_pong(&rec) {
                    tracing::warn!("error handling pong: {e}");
                }
            }
            other => self.handle_application_record(other, &rec),
        }
    }

    /// Answer a HelloVerify with the second ClientHello: echo the cookie
    /// and the original random, and carry the sym-wrapped auth token
    /// inside the asymmetric envelope.
    async fn answer_hello_verify(&self, rec: &Record) -> Result<(), SessionError> {
        let plaintext = self
            .symmetric
            .decrypt(&rec.body, self.session_key.as_bytes())?;
        let verify = self.codec.decode_handshake(&plaintext)?;

        let Some(random) = *lock_read(&self.handshake_random) else {
            tracing::warn!("hello verify with no handshake in flight");
            return Ok(());
        };
        let token = lock_read(&self.auth_token).clone();
        let wrapped_token = self.symmetric.encrypt(&token, self.session_key.as_bytes())?;

        let hello = Handshake {
            cookie: verify.cookie,
            random: random.to_vec(),
            key: self.session_key.as_bytes().to_vec(),
            token: wrapped_token,
            timestamp: now_millis(),
            ..Handshake::default()
        };
        let body = self.codec.encode_handshake(&hello)?;
        let sealed = self
            .asymmetric
            .encrypt(&body, &self.config.server_public_key)?;
        self.socket
            .send(&record::encode(record_type::CLIENT_HELLO, &sealed))
            .await?;
        tracing::debug!("cookie echoed, awaiting server hello");
        Ok(())
    }

    fn accept_server_hello(&self, rec: &Record) -> Result<(), SessionError> {
        let plaintext = self
            .symmetric
            .decrypt(&rec.body, self.session_key.as_bytes())?;
        let server_hello = self.codec.decode_handshake(&plaintext)?;

        {
            let mut session_id = lock_write(&self.session_id);
            if session_id.is_some() {
                tracing::debug!("duplicate server hello ignored");
                return Ok(());
            }
            *session_id = Some(server_hello.session_id.clone());
        }

        tracing::info!(
            session_id = %hex::encode(&server_hello.session_id),
            "session established"
        );
        // Invoked inline so it is ordered before every application record
        // of this cycle.
        self.events.on_connected();
        Ok(())
    }

    fn handle_pong(&self, rec: &Record) -> Result<(), SessionError> {
        let plaintext = self
            .symmetric
            .decrypt(&rec.body, self.session_key.as_bytes())?;
        let pong: Pong = self.codec.decode_pong(&plaintext)?;

        let rtt_ms = pong.received_at - pong.ping_sent_at;
        let events = Arc::clone(&self.events);
        tokio::spawn(async move { events.on_ping_result(rtt_ms) });
        Ok(())
    }

    fn handle_application_record(&self, record_type: u8, rec: &Record) {
        match self.symmetric.decrypt(&rec.body, self.session_key.as_bytes()) {
            Ok(plaintext) => {
                let events = Arc::clone(&self.events);
                // A slow callback must not stall the record channel.
                tokio::spawn(async move { events.on_server_record(record_type, plaintext) });
            }
            Err(e) => tracing::warn!(record_type, "error decrypting record: {e}"),
        }
    }

    async fn ping_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let period = self.config.ping_interval;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    // A tick before the handshake completes is a no-op.
                    if lock_read(&self.session_id).is_none() {
                        continue;
                    }
                    if let Err(e) = self.send_ping().await {
                        tracing::warn!("error sending ping: {e}");
                    }
                }
            }
        }

        tracing::debug!("ping scheduler terminated");
    }

    async fn send_ping(&self) -> Result<(), SessionError> {
        let ping = Ping {
            sent_at: now_millis(),
        };
        let payload = self.codec.encode_ping(&ping)?;
        self.seal_and_send(record_type::PING, &payload).await
    }

    async fn seal_and_send(&self, record_type: u8, message: &[u8]) -> Result<(), SessionError> {
        let mut plaintext = lock_read(&self.session_id)
            .clone()
            .ok_or(SessionError::NotEstablished)?;
        plaintext.extend_from_slice(message);

        let sealed = self
            .symmetric
            .encrypt(&plaintext, self.session_key.as_bytes())?;
        self.socket
            .send(&record::encode(record_type, &sealed))
            .await?;
        Ok(())
    }
}

// Poison-tolerant lock access: these locks guard plain data, so a
// poisoned guard is still usable.
fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
