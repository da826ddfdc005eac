//! The game-state reconciler.
//!
//! [`GameClient`] sits directly above the session engine: it serializes
//! move actions onto the wire, and collapses the stream of state snapshots
//! down to "the newest one wins". Versions are stamped by the server;
//! anything not strictly newer than the cache is dropped silently.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use labrys_core::{Session, SessionConfig, SessionError, SessionEvents};
use uuid::Uuid;

use crate::codec::{BincodeGameCodec, GameCodec};
use crate::error::GameError;
use crate::record_types;
use crate::state::{Action, Direction, GameState, Pos};

/// Seam over the session engine, so the reconciler can be exercised
/// without sockets.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Begin a connection cycle with the given auth token
    async fn connect(&self, auth_token: &[u8]) -> Result<(), SessionError>;

    /// End the connection cycle
    async fn disconnect(&self);

    /// Send one application record
    async fn send_record(&self, record_type: u8, payload: &[u8]) -> Result<(), SessionError>;
}

#[async_trait]
impl Connection for Session {
    async fn connect(&self, auth_token: &[u8]) -> Result<(), SessionError> {
        Session::connect(self, auth_token).await
    }

    async fn disconnect(&self) {
        Session::disconnect(self).await;
    }

    async fn send_record(&self, record_type: u8, payload: &[u8]) -> Result<(), SessionError> {
        self.send_to_server(record_type, payload).await
    }
}

/// Events raised by the reconciler.
///
/// `on_state_change` fires once per strictly-increasing snapshot version,
/// in version order. Listeners must not call back into the client from
/// inside these callbacks.
pub trait GameEvents: Send + Sync + 'static {
    /// The session handshake completed
    fn on_connected(&self) {}

    /// A newer snapshot replaced the cache
    fn on_state_change(&self, state: &GameState) {
        let _ = state;
    }

    /// The server declared the game over
    fn on_game_end(&self, state: &GameState) {
        let _ = state;
    }

    /// A ping/pong roundtrip completed
    fn on_ping_result(&self, rtt_ms: i64) {
        let _ = rtt_ms;
    }
}

/// Reconciler core: receives session events and owns the snapshot cache.
///
/// Split from [`GameClient`] so it can be handed to the session engine as
/// its event listener while the client keeps the sending half.
pub struct GameCore {
    player_id: Uuid,
    codec: Arc<dyn GameCodec>,
    events: Arc<dyn GameEvents>,
    // One guard around the snapshot and its version comparison.
    state: Mutex<Option<GameState>>,
}

impl GameCore {
    /// Create a reconciler core for the given player
    #[must_use]
    pub fn new(player_id: Uuid, codec: Arc<dyn GameCodec>, events: Arc<dyn GameEvents>) -> Self {
        Self {
            player_id,
            codec,
            events,
            state: Mutex::new(None),
        }
    }

    /// Clone of the cached snapshot, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<GameState> {
        self.lock_state().clone()
    }

    /// The local player's position in the cached snapshot
    #[must_use]
    pub fn player_position(&self) -> Option<Pos> {
        self.lock_state()
            .as_ref()
            .and_then(|state| state.player(self.player_id))
            .map(|player| player.pos)
    }

    fn apply_record(&self, record_type: u8, payload: &[u8]) {
        let state = match self.codec.decode_state(payload) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(record_type, "error decoding game state: {e}");
                return;
            }
        };

        if record_type == record_types::GAME_ENDED {
            self.events.on_game_end(&state);
            return;
        }

        let mut cached = self.lock_state();
        if cached
            .as_ref()
            .is_some_and(|current| state.version <= current.version)
        {
            tracing::debug!(version = state.version, "stale snapshot dropped");
            return;
        }
        let state = cached.insert(state);
        // Notified under the guard so versions reach the listener in order.
        self.events.on_state_change(state);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Option<GameState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionEvents for GameCore {
    fn on_connected(&self) {
        self.events.on_connected();
    }

    fn on_ping_result(&self, rtt_ms: i64) {
        self.events.on_ping_result(rtt_ms);
    }

    fn on_server_record(&self, record_type: u8, payload: Vec<u8>) {
        self.apply_record(record_type, &payload);
    }
}

/// The game client: move serialization over an established session, state
/// reconciliation underneath.
pub struct GameClient<C: Connection> {
    connection: Arc<C>,
    core: Arc<GameCore>,
}

impl GameClient<Session> {
    /// Build a client over a fresh session engine with the default cipher
    /// and codec suite.
    ///
    /// # Errors
    ///
    /// Propagates session construction failures (key validation, socket).
    pub async fn new(
        config: SessionConfig,
        player_id: Uuid,
        events: Arc<dyn GameEvents>,
    ) -> Result<Self, GameError> {
        let core = Arc::new(GameCore::new(
            player_id,
            Arc::new(BincodeGameCodec),
            events,
        ));
        let session = Session::new(config, core.clone() as Arc<dyn SessionEvents>).await?;
        Ok(Self {
            connection: Arc::new(session),
            core,
        })
    }
}

impl<C: Connection> GameClient<C> {
    /// Assemble a client from an existing connection and core
    #[must_use]
    pub fn from_parts(connection: Arc<C>, core: Arc<GameCore>) -> Self {
        Self { connection, core }
    }

    /// Start the session handshake with the given auth token
    ///
    /// # Errors
    ///
    /// Propagates hard connection failures; handshake completion itself is
    /// reported through [`GameEvents::on_connected`].
    pub async fn start(&self, auth_token: &[u8]) -> Result<(), GameError> {
        self.connection.connect(auth_token).await?;
        Ok(())
    }

    /// Tear the session down
    pub async fn stop(&self) {
        self.connection.disconnect().await;
    }

    /// Send a move for the local player.
    ///
    /// # Errors
    ///
    /// Fails with [`GameError::NoKnownState`] until a snapshot containing
    /// the local player has arrived; the move's `from` field is the
    /// position the client believes it occupies, and there is no honest
    /// value for it before that.
    pub async fn move_player(&self, direction: Direction) -> Result<(), GameError> {
        let from = self
            .core
            .player_position()
            .ok_or(GameError::NoKnownState)?;
        let action = Action {
            id: self.core.player_id,
            direction,
            from,
        };
        let payload = self.core.codec.encode_action(&action)?;
        self.connection
            .send_record(record_types::MOVE_ACTION, &payload)
            .await?;
        Ok(())
    }

    /// Ask the server to push the current state
    ///
    /// # Errors
    ///
    /// Propagates session errors.
    pub async fn request_state(&self) -> Result<(), GameError> {
        self.connection
            .send_record(record_types::STATE_REQUEST, &[])
            .await?;
        Ok(())
    }

    /// Clone of the cached snapshot, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<GameState> {
        self.core.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Cell, Maze, Player};
    use std::sync::Mutex as StdMutex;

    struct MockConnection {
        sent: StdMutex<Vec<(u8, Vec<u8>)>>,
    }

    impl MockConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(u8, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn connect(&self, _auth_token: &[u8]) -> Result<(), SessionError> {
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn send_record(&self, record_type: u8, payload: &[u8]) -> Result<(), SessionError> {
            self.sent.lock().unwrap().push((record_type, payload.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        versions: StdMutex<Vec<i64>>,
        ended: StdMutex<Vec<i64>>,
        pings: StdMutex<Vec<i64>>,
    }

    impl GameEvents for RecordingEvents {
        fn on_state_change(&self, state: &GameState) {
            self.versions.lock().unwrap().push(state.version);
        }

        fn on_game_end(&self, state: &GameState) {
            self.ended.lock().unwrap().push(state.version);
        }

        fn on_ping_result(&self, rtt_ms: i64) {
            self.pings.lock().unwrap().push(rtt_ms);
        }
    }

    fn snapshot(version: i64, players: Vec<Player>) -> Vec<u8> {
        let state = GameState {
            version,
            maze: Maze {
                grid: vec![vec![Cell::default(); 2]; 2],
            },
            players,
        };
        BincodeGameCodec.encode_state(&state).unwrap()
    }

    fn core_with_events(player_id: Uuid) -> (Arc<GameCore>, Arc<RecordingEvents>) {
        let events = Arc::new(RecordingEvents::default());
        let core = Arc::new(GameCore::new(
            player_id,
            Arc::new(BincodeGameCodec),
            events.clone(),
        ));
        (core, events)
    }

    #[test]
    fn stale_snapshots_are_dropped() {
        let (core, events) = core_with_events(Uuid::new_v4());

        for version in [1, 3, 2, 4] {
            core.apply_record(record_types::GAME_STATE, &snapshot(version, vec![]));
        }

        assert_eq!(*events.versions.lock().unwrap(), vec![1, 3, 4]);
        assert_eq!(core.snapshot().unwrap().version, 4);
    }

    #[test]
    fn equal_version_is_stale() {
        let (core, events) = core_with_events(Uuid::new_v4());

        core.apply_record(record_types::GAME_STATE, &snapshot(5, vec![]));
        core.apply_record(record_types::GAME_STATE, &snapshot(5, vec![]));

        assert_eq!(*events.versions.lock().unwrap(), vec![5]);
    }

    #[test]
    fn game_end_bypasses_the_version_gate() {
        let (core, events) = core_with_events(Uuid::new_v4());

        core.apply_record(record_types::GAME_STATE, &snapshot(9, vec![]));
        // An ended-game record older than the cache still reaches the
        // listener; it is a terminal signal, not a snapshot update.
        core.apply_record(record_types::GAME_ENDED, &snapshot(2, vec![]));

        assert_eq!(*events.ended.lock().unwrap(), vec![2]);
        assert_eq!(core.snapshot().unwrap().version, 9);
    }

    #[test]
    fn undecodable_snapshot_is_ignored() {
        let (core, events) = core_with_events(Uuid::new_v4());

        core.apply_record(record_types::GAME_STATE, &[0xFF; 5]);

        assert!(events.versions.lock().unwrap().is_empty());
        assert!(core.snapshot().is_none());
    }

    #[test]
    fn ping_results_are_forwarded() {
        let (core, events) = core_with_events(Uuid::new_v4());
        SessionEvents::on_ping_result(core.as_ref(), 12);
        assert_eq!(*events.pings.lock().unwrap(), vec![12]);
    }

    #[tokio::test]
    async fn move_before_any_state_is_rejected() {
        let player_id = Uuid::new_v4();
        let (core, _events) = core_with_events(player_id);
        let connection = MockConnection::new();
        let client = GameClient::from_parts(connection.clone(), core);

        assert!(matches!(
            client.move_player(Direction::North).await,
            Err(GameError::NoKnownState)
        ));
        assert!(connection.sent().is_empty());
    }

    #[tokio::test]
    async fn move_uses_the_cached_player_position() {
        let player_id = Uuid::new_v4();
        let (core, _events) = core_with_events(player_id);
        let connection = MockConnection::new();

        let players = vec![Player {
            id: player_id,
            pos: Pos { row: 2, col: 3 },
            reward: 0,
        }];
        core.apply_record(record_types::GAME_STATE, &snapshot(1, players));

        let client = GameClient::from_parts(connection.clone(), core);
        client.move_player(Direction::West).await.unwrap();

        let sent = connection.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, record_types::MOVE_ACTION);

        let action = BincodeGameCodec.decode_action(&sent[0].1).unwrap();
        assert_eq!(action.id, player_id);
        assert_eq!(action.direction, Direction::West);
        assert_eq!(action.from, Pos { row: 2, col: 3 });
    }

    #[tokio::test]
    async fn state_request_carries_an_empty_body() {
        let (core, _events) = core_with_events(Uuid::new_v4());
        let connection = MockConnection::new();
        let client = GameClient::from_parts(connection.clone(), core);

        client.request_state().await.unwrap();

        let sent = connection.sent();
        assert_eq!(sent, vec![(record_types::STATE_REQUEST, Vec::new())]);
    }
}
