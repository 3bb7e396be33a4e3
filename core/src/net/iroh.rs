//! Iroh-backed peer channels
//!
//! Each session binds one iroh endpoint. The metadata published in
//! offers, answers and presence records is the endpoint id (hex) plus the
//! relay URL the endpoint is reachable through; the rendezvous never
//! interprets it. A transport is a single long-lived bidirectional QUIC
//! stream carrying one JSON frame per line.

use async_trait::async_trait;
use iroh::endpoint::Connection;
use iroh::{Endpoint, NodeAddr, RelayUrl, SecretKey, Watcher};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, trace, warn};

use crate::session::{PeerChannel, PeerConnector, SessionError};

/// ALPN for peer replication channels.
pub const PEER_ALPN: &[u8] = b"cove/peer/1";

/// Upper bound on one peer frame (snapshots ride in single frames).
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Connection metadata carried through the rendezvous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DialInfo {
    endpoint_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relay_url: Option<String>,
}

/// Production connector over an iroh endpoint.
pub struct IrohConnector {
    endpoint: Endpoint,
}

impl IrohConnector {
    /// Bind a fresh endpoint with a random key for this session.
    pub async fn bind() -> Result<Self, SessionError> {
        let mut key_bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut key_bytes);
        let secret_key = SecretKey::from_bytes(&key_bytes);
        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![PEER_ALPN.to_vec()])
            .bind()
            .await
            .map_err(|e| SessionError::Fatal(format!("failed to bind endpoint: {}", e)))?;
        Ok(Self { endpoint })
    }

    fn dial_info(&self) -> DialInfo {
        let mut watcher = self.endpoint.node_addr();
        let node_addr = watcher.get();
        DialInfo {
            endpoint_id: hex::encode(self.endpoint.node_id().as_bytes()),
            relay_url: node_addr.and_then(|addr| addr.relay_url).map(|url| url.to_string()),
        }
    }

    /// Shut the endpoint down. Existing channels die with it.
    pub async fn shutdown(&self) {
        self.endpoint.close().await;
    }
}

fn parse_dial_info(metadata: &str) -> Result<(iroh::NodeId, Option<RelayUrl>), SessionError> {
    let info: DialInfo = serde_json::from_str(metadata)
        .map_err(|_| SessionError::InvalidArgument("undecodable connection metadata".into()))?;
    let bytes = hex::decode(&info.endpoint_id)
        .map_err(|_| SessionError::InvalidArgument("bad endpoint id".into()))?;
    if bytes.len() != 32 {
        return Err(SessionError::InvalidArgument("bad endpoint id length".into()));
    }
    let mut id_bytes = [0u8; 32];
    id_bytes.copy_from_slice(&bytes);
    let node_id = iroh::NodeId::from_bytes(&id_bytes)
        .map_err(|_| SessionError::InvalidArgument("bad endpoint id".into()))?;
    let relay_url = match info.relay_url {
        Some(url) => Some(
            url.parse::<RelayUrl>()
                .map_err(|_| SessionError::InvalidArgument("bad relay URL".into()))?,
        ),
        None => None,
    };
    Ok((node_id, relay_url))
}

#[async_trait]
impl PeerConnector for IrohConnector {
    fn local_metadata(&self) -> String {
        serde_json::to_string(&self.dial_info()).expect("dial info serializes")
    }

    fn endpoint_of(&self, metadata: &str) -> Option<String> {
        serde_json::from_str::<DialInfo>(metadata)
            .ok()
            .map(|info| info.endpoint_id.to_ascii_lowercase())
    }

    async fn dial(&self, metadata: &str) -> Result<Box<dyn PeerChannel>, SessionError> {
        let (node_id, relay_url) = parse_dial_info(metadata)?;
        let addr = match relay_url {
            Some(relay) => NodeAddr::new(node_id).with_relay_url(relay),
            None => NodeAddr::from(node_id),
        };

        let conn = self
            .endpoint
            .connect(addr, PEER_ALPN)
            .await
            .map_err(|e| SessionError::Transient(format!("dial failed: {}", e)))?;
        let (send, recv) = conn
            .open_bi()
            .await
            .map_err(|e| SessionError::Transient(format!("open stream: {}", e)))?;

        debug!(remote = %hex::encode(&node_id.as_bytes()[..8]), "dialed peer");
        Ok(Box::new(IrohChannel {
            send,
            reader: BufReader::new(recv),
            buf: Vec::new(),
            _conn: conn,
        }))
    }

    async fn accept(&self) -> Option<(String, Box<dyn PeerChannel>)> {
        loop {
            let incoming = self.endpoint.accept().await?;
            let conn = match incoming.await {
                Ok(conn) => conn,
                Err(e) => {
                    debug!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            let remote: [u8; 32] = match conn.remote_node_id() {
                Ok(id) => *id.as_bytes(),
                Err(e) => {
                    debug!(error = %e, "failed to read remote endpoint id");
                    continue;
                }
            };
            let (send, recv) = match conn.accept_bi().await {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, remote = %hex::encode(&remote[..8]), "accept_bi failed");
                    continue;
                }
            };

            trace!(remote = %hex::encode(&remote[..8]), "accepted peer channel");
            let channel = IrohChannel {
                send,
                reader: BufReader::new(recv),
                buf: Vec::new(),
                _conn: conn,
            };
            return Some((hex::encode(remote), Box::new(channel)));
        }
    }
}

struct IrohChannel {
    send: iroh::endpoint::SendStream,
    reader: BufReader<iroh::endpoint::RecvStream>,
    /// Partial line carried across cancelled reads; `recv` is used inside
    /// `select!`, so the accumulator must outlive each call.
    buf: Vec<u8>,
    /// Keeps the QUIC connection alive for the stream's lifetime.
    _conn: Connection,
}

#[async_trait]
impl PeerChannel for IrohChannel {
    async fn send(&mut self, line: &str) -> Result<(), SessionError> {
        self.send
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Transient(format!("peer send: {}", e)))?;
        self.send
            .write_all(b"\n")
            .await
            .map_err(|e| SessionError::Transient(format!("peer send: {}", e)))?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        loop {
            if self.buf.last() == Some(&b'\n') {
                let line = String::from_utf8_lossy(&self.buf).trim_end().to_string();
                self.buf.clear();
                return Some(line);
            }
            if self.buf.len() > MAX_FRAME_BYTES {
                warn!("oversized peer frame, closing channel");
                return None;
            }
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.send.finish() {
            trace!(error = %e, "finish on closing stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_info_roundtrip() {
        let info = DialInfo {
            endpoint_id: hex::encode([7u8; 32]),
            relay_url: Some("https://relay.example/".into()),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("endpointId"));
        let back: DialInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.endpoint_id, info.endpoint_id);
    }

    #[test]
    fn test_parse_dial_info_rejects_garbage() {
        assert!(parse_dial_info("not json").is_err());
        assert!(parse_dial_info(r#"{"endpointId":"zz"}"#).is_err());
        assert!(parse_dial_info(r#"{"endpointId":"aabb"}"#).is_err());
    }
}
