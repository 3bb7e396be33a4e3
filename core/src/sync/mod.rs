//! Room document
//!
//! Wraps a Loro CRDT document for one room. The session layer treats
//! every export as an opaque byte string; the only algebra it relies on is
//! that imports merge commutatively and idempotently.
//!
//! # Echo safety
//!
//! The update fan-out must never send a peer its own changes back. The
//! contract here makes that structural:
//!
//! - [`RoomDoc::local_delta`] returns only changes made since the last
//!   broadcast - these go to every authenticated peer.
//! - [`RoomDoc::absorb_remote`] first flushes any pending local delta,
//!   then imports the remote update and folds it into the broadcast
//!   watermark. Imported changes therefore never reappear in a later
//!   `local_delta`; the caller re-broadcasts the received bytes itself,
//!   skipping the peer they came from.

use std::borrow::Cow;

use loro::LoroDoc;
use tracing::trace;

/// Errors from the underlying CRDT library.
#[derive(Debug)]
pub enum DocError {
    Loro(String),
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocError::Loro(e) => write!(f, "document error: {}", e),
        }
    }
}

impl std::error::Error for DocError {}

/// The replicated document of one room.
pub struct RoomDoc {
    doc: LoroDoc,
    /// Version vector at the last broadcast (encoded).
    last_broadcast_version: Vec<u8>,
}

impl RoomDoc {
    pub fn new() -> Self {
        let doc = LoroDoc::new();
        let last_broadcast_version = doc.oplog_vv().encode();
        Self {
            doc,
            last_broadcast_version,
        }
    }

    /// The underlying Loro document, for application edits.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    /// Whether changes are waiting to be broadcast.
    pub fn is_dirty(&self) -> bool {
        self.doc.oplog_vv().encode() != self.last_broadcast_version
    }

    /// Export everything changed since the last broadcast and advance the
    /// watermark. `None` when there is nothing new.
    pub fn local_delta(&mut self) -> Result<Option<Vec<u8>>, DocError> {
        let current = self.doc.oplog_vv().encode();
        if current == self.last_broadcast_version {
            return Ok(None);
        }

        let from = loro::VersionVector::decode(&self.last_broadcast_version)
            .map_err(|e| DocError::Loro(e.to_string()))?;
        let delta = self
            .doc
            .export(loro::ExportMode::Updates {
                from: Cow::Borrowed(&from),
            })
            .map_err(|e| DocError::Loro(e.to_string()))?;

        self.last_broadcast_version = current;
        if delta.is_empty() {
            return Ok(None);
        }
        trace!(delta_size = delta.len(), "exported local delta");
        Ok(Some(delta))
    }

    /// Import a remote update (or snapshot - Loro merges either).
    ///
    /// Any pending local delta is flushed first and returned so the caller
    /// can broadcast it; the imported changes are folded into the
    /// watermark and will never surface as a local delta.
    pub fn absorb_remote(&mut self, update: &[u8]) -> Result<Option<Vec<u8>>, DocError> {
        let pending = self.local_delta()?;

        self.doc
            .import(update)
            .map_err(|e| DocError::Loro(e.to_string()))?;
        self.last_broadcast_version = self.doc.oplog_vv().encode();

        trace!(update_size = update.len(), "absorbed remote update");
        Ok(pending)
    }

    /// Full document snapshot for a joining peer.
    pub fn snapshot(&self) -> Result<Vec<u8>, DocError> {
        self.doc
            .export(loro::ExportMode::Snapshot)
            .map_err(|e| DocError::Loro(e.to_string()))
    }
}

impl Default for RoomDoc {
    fn default() -> Self {
        Self::new()
    }
}
