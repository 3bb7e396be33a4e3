//! Room sessions
//!
//! One [`Session`] per actively synced room. Starting a session derives
//! the room keys from the password, opens the signaling relay, announces
//! presence, and then keeps the room replicated: discovering peers,
//! negotiating direct transports, running the mutual authentication
//! handshake, and exchanging document updates with everyone who proved
//! they hold the password.
//!
//! ```ignore
//! let connector = Arc::new(IrohConnector::bind().await?);
//! let session = Session::start(config, room_id, b"correct horse", connector).await?;
//!
//! let doc = session.doc();
//! doc.lock().await.doc().get_text("notes").insert(0, "hello")?;
//! session.commit().await;
//!
//! // ... later
//! session.stop().await;
//! ```
//!
//! Joining a room someone shared with you is two calls: redeem the code
//! with a [`crate::rendezvous::RendezvousClient`], then `Session::start`
//! with the room id and the password you were told out of band.

mod auth;
mod config;
mod error;
mod events;
mod runner;
mod transport;

pub use auth::{AuthExchange, AuthOutcome};
pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{SessionEvent, SessionStatus};
pub use transport::{PeerChannel, PeerConnector};

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cove_proto::{PeerId, RoomId};

use crate::rendezvous::{RendezvousClient, SignalChannel};
use crate::security::derive_room_keys;
use crate::sync::RoomDoc;

use runner::{Command, Runner};

/// Capacity of the application event queue.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// A running (or stopped) room session.
pub struct Session {
    room_id: RoomId,
    peer_id: PeerId,
    client: RendezvousClient,
    command_tx: mpsc::UnboundedSender<Command>,
    events_rx: Arc<RwLock<Option<mpsc::Receiver<SessionEvent>>>>,
    doc: Arc<Mutex<RoomDoc>>,
    status: Arc<RwLock<SessionStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start syncing a room.
    ///
    /// Derives keys (off-thread - PBKDF2 is deliberately slow), opens the
    /// signaling relay, announces presence once synchronously, and spawns
    /// the session task. Any setup failure is returned and nothing keeps
    /// running.
    pub async fn start(
        config: SessionConfig,
        room_id: RoomId,
        password: &[u8],
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Self, SessionError> {
        if password.is_empty() {
            return Err(SessionError::InvalidArgument(
                "password must not be empty".to_string(),
            ));
        }

        let client = RendezvousClient::new(&config.rendezvous_base_url, config.request_deadline())?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let status = Arc::new(RwLock::new(SessionStatus::Connecting));
        let _ = events_tx.try_send(SessionEvent::Status {
            status: SessionStatus::Connecting,
            last_error: None,
        });

        let password = password.to_vec();
        let iterations = config.pbkdf2_iterations;
        let keys = tokio::task::spawn_blocking(move || {
            derive_room_keys(&password, &room_id, iterations)
        })
        .await
        .map_err(|e| SessionError::Fatal(format!("key derivation task failed: {}", e)))?;

        let relay = SignalChannel::connect(
            client.authority(),
            &client.signal_path(&room_id),
            &room_id,
            config.request_deadline(),
        )
        .await?;
        let peer_id = relay.assigned_id;
        let initial_peers = relay.peers_at_join.clone();

        match client
            .announce(&room_id, peer_id, Some(connector.local_metadata()))
            .await
        {
            Ok(_) => {}
            // Non-fatal: the relay still works, announcements resume later.
            Err(SessionError::RateLimited) => {
                warn!(room = %room_id.short(), "rate limited on first announce");
            }
            Err(e) => return Err(e),
        }

        info!(room = %room_id.short(), peer = %peer_id.short(), "session connecting");

        let doc = Arc::new(Mutex::new(RoomDoc::new()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let runner = Runner::new(
            config,
            room_id,
            keys,
            client.clone(),
            connector,
            doc.clone(),
            events_tx,
            status.clone(),
            command_rx,
            relay,
        );
        let task = tokio::spawn(runner.run(initial_peers));

        Ok(Self {
            room_id,
            peer_id,
            client,
            command_tx,
            events_rx: Arc::new(RwLock::new(Some(events_rx))),
            doc,
            status,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Mint a one-time share code for this room at the rendezvous.
    pub async fn create_invite(
        &self,
    ) -> Result<cove_proto::api::InviteResponse, SessionError> {
        self.client.create_invite(&self.room_id).await
    }

    /// Our relay-assigned peer id for this session.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The shared room document. Edit under the lock, then [`Session::commit`]
    /// (or wait out the batch interval) to broadcast.
    pub fn doc(&self) -> Arc<Mutex<RoomDoc>> {
        self.doc.clone()
    }

    /// Take the event receiver. First caller wins; later calls get `None`.
    pub async fn events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        let mut rx = self.events_rx.write().await;
        rx.take()
    }

    /// Current top-level status.
    pub async fn status(&self) -> SessionStatus {
        *self.status.read().await
    }

    /// Broadcast pending local document changes without waiting for the
    /// batch interval.
    pub async fn commit(&self) {
        let _ = self.command_tx.send(Command::Commit);
    }

    /// Stop the session: cancel timers, close the relay and every
    /// transport (no trailing frames), drop the derived keys. Always
    /// lands in `Idle`.
    pub async fn stop(&self) {
        let _ = self.command_tx.send(Command::Stop);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
