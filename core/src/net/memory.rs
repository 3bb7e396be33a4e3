//! In-memory peer channels for tests
//!
//! A hub is a switchboard of connectors; dialing another connector's
//! token produces a linked pair of channels backed by queues. Ordering
//! and close semantics match the real transport, so session tests run
//! against identical behavior without touching the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::session::{PeerChannel, PeerConnector, SessionError};

type Inbound = (String, MemoryChannel);

/// Switchboard connecting [`MemoryConnector`]s to each other.
#[derive(Default)]
pub struct MemoryHub {
    registry: StdMutex<HashMap<String, mpsc::UnboundedSender<Inbound>>>,
    next_token: AtomicU64,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a connector attached to this hub.
    pub fn connector(self: &Arc<Self>) -> MemoryConnector {
        let token = format!("mem-{}", self.next_token.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .lock()
            .expect("hub registry lock")
            .insert(token.clone(), tx);
        MemoryConnector {
            hub: self.clone(),
            token,
            incoming: Mutex::new(rx),
        }
    }
}

/// Test connector speaking through a [`MemoryHub`].
pub struct MemoryConnector {
    hub: Arc<MemoryHub>,
    token: String,
    incoming: Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

impl MemoryConnector {
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl PeerConnector for MemoryConnector {
    fn local_metadata(&self) -> String {
        self.token.clone()
    }

    fn endpoint_of(&self, metadata: &str) -> Option<String> {
        Some(metadata.to_string())
    }

    async fn dial(&self, metadata: &str) -> Result<Box<dyn PeerChannel>, SessionError> {
        let target = {
            let registry = self.hub.registry.lock().expect("hub registry lock");
            registry.get(metadata).cloned()
        };
        let Some(target) = target else {
            return Err(SessionError::Transient(format!(
                "no such memory endpoint: {}",
                metadata
            )));
        };

        let (near, far) = channel_pair();
        target
            .send((self.token.clone(), far))
            .map_err(|_| SessionError::Transient("memory endpoint is gone".to_string()))?;
        Ok(Box::new(near))
    }

    async fn accept(&self) -> Option<(String, Box<dyn PeerChannel>)> {
        let mut incoming = self.incoming.lock().await;
        let (remote, channel) = incoming.recv().await?;
        Some((remote, Box::new(channel)))
    }
}

/// One end of an in-memory channel pair.
pub struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

fn channel_pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            tx: Some(a_tx),
            rx: b_rx,
        },
        MemoryChannel {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

#[async_trait]
impl PeerChannel for MemoryChannel {
    async fn send(&mut self, line: &str) -> Result<(), SessionError> {
        match &self.tx {
            Some(tx) => tx
                .send(line.to_string())
                .map_err(|_| SessionError::Transient("memory channel closed".to_string())),
            None => Err(SessionError::Transient("memory channel closed".to_string())),
        }
    }

    async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        // Dropping our sender ends the remote's recv stream.
        self.tx = None;
    }
}
