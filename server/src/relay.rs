//! Signaling relay
//!
//! After the HTTP upgrade, each connection speaks newline-delimited JSON.
//! The relay assigns the connection a fresh `PeerId`, tells it who else is
//! in the room, announces the join to the others, and from then on only
//! forwards: every inbound frame with a `to` field goes to exactly that
//! peer, augmented with `from`. Malformed frames and frames without `to`
//! are dropped without comment. On disconnect the room hears `peer-left`.
//!
//! A room is the unit of serialization: registration, routing and
//! departure all run under the room registry lock, so each sender's frames
//! arrive in the order the relay observed them.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

use cove_proto::signal::ControlFrame;
use cove_proto::{PeerId, RoomId};

/// Upper bound on one signaling frame.
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Outbound queue handle for one relay client.
type ClientTx = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct RelayInner {
    rooms: HashMap<RoomId, HashMap<PeerId, ClientTx>>,
    connections_per_ip: HashMap<IpAddr, usize>,
}

/// Registry of all live signaling connections.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Mutex<RelayInner>>,
    max_connections_per_ip: usize,
}

impl Relay {
    pub fn new(max_connections_per_ip: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayInner::default())),
            max_connections_per_ip,
        }
    }

    /// Number of live connections in a room.
    pub async fn room_size(&self, room_id: &RoomId) -> usize {
        let inner = self.inner.lock().await;
        inner.rooms.get(room_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Reserve a connection slot for `ip`. Returns false when the per-IP
    /// simultaneous-connection cap is reached.
    pub async fn try_reserve(&self, ip: IpAddr) -> bool {
        let mut inner = self.inner.lock().await;
        let count = inner.connections_per_ip.entry(ip).or_insert(0);
        if *count >= self.max_connections_per_ip {
            return false;
        }
        *count += 1;
        true
    }

    /// Release a slot reserved with [`Relay::try_reserve`] when the
    /// connection never reached [`Relay::serve_connection`].
    pub async fn release(&self, ip: IpAddr) {
        let mut inner = self.inner.lock().await;
        if let Some(count) = inner.connections_per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.connections_per_ip.remove(&ip);
            }
        }
    }

    /// Run one upgraded connection until it closes.
    ///
    /// `leftover` is any bytes the HTTP reader consumed past the header
    /// end; they belong to the signaling stream.
    pub async fn serve_connection(
        &self,
        socket: TcpStream,
        room_id: RoomId,
        ip: IpAddr,
        leftover: Vec<u8>,
    ) {
        let peer_id = PeerId::random();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        // Register, snapshot the room, announce the join - one critical
        // section so concurrent joins observe a consistent order.
        {
            let mut inner = self.inner.lock().await;
            let room = inner.rooms.entry(room_id).or_default();
            let existing: Vec<PeerId> = room.keys().copied().collect();

            let hello = ControlFrame::Peers {
                peers: existing,
                you: peer_id,
            };
            let _ = tx.send(serde_json::to_string(&hello).expect("control frames serialize"));

            let joined = ControlFrame::PeerJoined { peer_id };
            let joined_line =
                serde_json::to_string(&joined).expect("control frames serialize");
            for other_tx in room.values() {
                let _ = other_tx.send(joined_line.clone());
            }

            room.insert(peer_id, tx);
        }

        info!(
            room = %room_id.short(),
            peer = %peer_id.short(),
            "signal: peer registered"
        );

        let (read_half, mut write_half) = socket.into_split();

        // Writer: drain the queue onto the socket, one frame per line.
        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        // Reader: route inbound frames until EOF or error.
        let mut reader = BufReader::new(read_half);
        let mut line = String::from_utf8(leftover).unwrap_or_default();
        loop {
            // A leftover chunk may already hold one or more complete lines.
            while let Some(pos) = line.find('\n') {
                let frame: String = line.drain(..=pos).collect();
                self.route(&room_id, peer_id, frame.trim_end()).await;
            }

            let before = line.len();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(peer = %peer_id.short(), error = %e, "signal: read failed");
                    break;
                }
            }
            if line.len() > MAX_FRAME_BYTES {
                warn!(peer = %peer_id.short(), "signal: oversized frame, closing");
                break;
            }
            if line.ends_with('\n') {
                let frame = std::mem::take(&mut line);
                self.route(&room_id, peer_id, frame.trim_end()).await;
            } else if line.len() == before {
                // read_line returned without progress or newline: EOF mid-line.
                break;
            }
        }

        self.unregister(&room_id, peer_id, ip).await;
        writer.abort();
    }

    /// Forward one frame to the peer named in its `to` field.
    async fn route(&self, room_id: &RoomId, from: PeerId, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let Ok(mut value) = serde_json::from_str::<Value>(raw) else {
            trace!(peer = %from.short(), "signal: dropping malformed frame");
            return;
        };
        let Some(to) = value
            .get("to")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<PeerId>().ok())
        else {
            trace!(peer = %from.short(), "signal: dropping frame without 'to'");
            return;
        };

        value["from"] = Value::String(from.to_string());
        let line = value.to_string();

        let inner = self.inner.lock().await;
        let Some(target) = inner.rooms.get(room_id).and_then(|r| r.get(&to)) else {
            trace!(
                peer = %from.short(),
                to = %to.short(),
                "signal: dropping frame to unknown peer"
            );
            return;
        };
        let _ = target.send(line);
    }

    async fn unregister(&self, room_id: &RoomId, peer_id: PeerId, ip: IpAddr) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.rooms.get_mut(room_id) {
            room.remove(&peer_id);
            let left = ControlFrame::PeerLeft { peer_id };
            let line = serde_json::to_string(&left).expect("control frames serialize");
            for tx in room.values() {
                let _ = tx.send(line.clone());
            }
            if room.is_empty() {
                inner.rooms.remove(room_id);
            }
        }
        if let Some(count) = inner.connections_per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.connections_per_ip.remove(&ip);
            }
        }
        info!(room = %room_id.short(), peer = %peer_id.short(), "signal: peer left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_honors_cap() {
        let relay = Relay::new(2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(relay.try_reserve(ip).await);
        assert!(relay.try_reserve(ip).await);
        assert!(!relay.try_reserve(ip).await);

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(relay.try_reserve(other).await);
    }

    #[tokio::test]
    async fn test_route_drops_unknown_target() {
        let relay = Relay::new(8);
        let room = RoomId::from_bytes([1; 16]);
        // No one registered: routing must be a silent no-op.
        relay
            .route(
                &room,
                PeerId::from_bytes([2; 16]),
                r#"{"type":"offer","to":"00000000-0000-0000-0000-000000000000"}"#,
            )
            .await;
        assert_eq!(relay.room_size(&room).await, 0);
    }
}
