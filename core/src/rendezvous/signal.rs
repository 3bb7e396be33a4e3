//! Signaling channel
//!
//! Upgrades a TCP connection to the relay protocol and exchanges
//! newline-delimited JSON frames. The server's first frame assigns our
//! relay id and lists who is already in the room; both are available as
//! soon as `connect` returns.
//!
//! The connection comes back in two halves - a sender and a frame queue -
//! so the session can poll the queue from its select loop while sending
//! from handler code. A background task feeds the queue; malformed frames
//! are skipped, matching the relay's own drop-silently rule.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use cove_proto::signal::{ControlFrame, SignalFrame, SIGNAL_PROTOCOL};
use cove_proto::{PeerId, RoomId};

use super::super::session::SessionError;

/// An open signaling channel, split for select-loop use.
pub struct SignalChannel {
    /// The id the relay assigned to this connection.
    pub assigned_id: PeerId,
    /// Ids already present in the room when we joined.
    pub peers_at_join: Vec<PeerId>,
    /// Write half.
    pub sender: SignalSender,
    /// Inbound frames; closes when the relay connection dies.
    pub frames: mpsc::UnboundedReceiver<SignalFrame>,
}

/// Write half of the signaling channel.
pub struct SignalSender {
    writer: tokio::net::tcp::OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

impl SignalSender {
    /// Send one frame line (already JSON-encoded, no newline).
    pub async fn send(&mut self, line: &str) -> Result<(), SessionError> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Transient(format!("relay send: {}", e)))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| SessionError::Transient(format!("relay send: {}", e)))?;
        Ok(())
    }

    /// Close without further frames.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

impl Drop for SignalSender {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl SignalChannel {
    /// Connect, upgrade, and wait for the relay's `peers` frame.
    pub async fn connect(
        authority: &str,
        signal_path: &str,
        room_id: &RoomId,
        deadline: Duration,
    ) -> Result<Self, SessionError> {
        tokio::time::timeout(deadline, Self::connect_inner(authority, signal_path, room_id))
            .await
            .map_err(|_| SessionError::Transient("signaling connect timed out".to_string()))?
    }

    async fn connect_inner(
        authority: &str,
        signal_path: &str,
        room_id: &RoomId,
    ) -> Result<Self, SessionError> {
        let mut socket = TcpStream::connect(authority)
            .await
            .map_err(|e| SessionError::Transient(format!("connect relay: {}", e)))?;

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: {}\r\n\r\n",
            signal_path, authority, SIGNAL_PROTOCOL
        );
        socket
            .write_all(request.as_bytes())
            .await
            .map_err(|e| SessionError::Transient(format!("send upgrade: {}", e)))?;

        // Read the upgrade response head byte-wise; frames follow it.
        let mut head = Vec::with_capacity(512);
        let mut byte = [0u8; 1];
        loop {
            let n = socket
                .read(&mut byte)
                .await
                .map_err(|e| SessionError::Transient(format!("read upgrade: {}", e)))?;
            if n == 0 {
                return Err(SessionError::Transient(
                    "relay closed during upgrade".to_string(),
                ));
            }
            head.push(byte[0]);
            if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
                break;
            }
            if head.len() > 8 * 1024 {
                return Err(SessionError::Transient(
                    "oversized upgrade response".to_string(),
                ));
            }
        }

        let head_text = String::from_utf8_lossy(&head);
        let status: u16 = head_text
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        match status {
            101 => {}
            429 => return Err(SessionError::RateLimited),
            other => {
                return Err(SessionError::Transient(format!(
                    "relay refused upgrade with status {}",
                    other
                )))
            }
        }

        let (read_half, writer) = socket.into_split();
        let (frames_tx, mut frames) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                match SignalFrame::decode(line.trim_end()) {
                    Some(frame) => {
                        if frames_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    None => trace!("skipping malformed signaling frame"),
                }
            }
            debug!("signaling reader finished");
        });

        let sender = SignalSender {
            writer,
            reader_task,
        };

        // The relay speaks first: a `peers` frame naming us.
        let (assigned_id, peers_at_join) = match frames.recv().await {
            Some(SignalFrame::Control(ControlFrame::Peers { peers, you })) => (you, peers),
            Some(other) => {
                return Err(SessionError::ProtocolViolation(format!(
                    "relay sent {:?} before peers frame",
                    other
                )));
            }
            None => {
                return Err(SessionError::Transient(
                    "relay closed before registration".to_string(),
                ));
            }
        };

        debug!(
            assigned = %assigned_id.short(),
            room = %room_id.short(),
            peers = peers_at_join.len(),
            "signaling channel open"
        );

        Ok(Self {
            assigned_id,
            peers_at_join,
            sender,
            frames,
        })
    }
}
