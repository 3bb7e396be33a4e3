//! Expiring key-value store for invites and presence
//!
//! The rendezvous keeps no durable state: invites live for 300 s or until
//! redeemed, presence records for 120 s past their last refresh. Expiry is
//! lazy - reads filter expired entries, and a sweep runs opportunistically
//! every [`Store::AUTO_SWEEP_OP_INTERVAL`] operations so abandoned rooms do
//! not accumulate.
//!
//! Every operation takes an explicit `now` so the TTL logic is testable
//! without sleeping.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use cove_proto::{PeerId, RoomId, ShareCode};

/// A pending invite: one share code bound to one room.
#[derive(Debug, Clone)]
pub struct InviteRecord {
    pub room_id: RoomId,
    pub created_at: Instant,
    pub created_by: IpAddr,
}

/// One peer's presence in a room.
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    pub peer_id: PeerId,
    pub sdp_offer: Option<String>,
    pub ice_candidates: Option<Vec<String>>,
    /// Refresh time against the injectable clock (drives expiry).
    pub last_seen: Instant,
    /// Refresh time in Unix milliseconds (reported to readers).
    pub last_seen_ms: u64,
}

/// In-memory expiring store backing the rendezvous.
#[derive(Debug)]
pub struct Store {
    invite_ttl: Duration,
    presence_ttl: Duration,
    invites: HashMap<ShareCode, InviteRecord>,
    rooms: HashMap<RoomId, HashMap<PeerId, PresenceRecord>>,
    op_counter: u64,
}

impl Store {
    /// Sweep expired entries after this many operations.
    const AUTO_SWEEP_OP_INTERVAL: u64 = 128;

    pub fn new(invite_ttl: Duration, presence_ttl: Duration) -> Self {
        Self {
            invite_ttl,
            presence_ttl,
            invites: HashMap::new(),
            rooms: HashMap::new(),
            op_counter: 0,
        }
    }

    /// Mint a fresh share code for `room_id`.
    ///
    /// The returned code is guaranteed distinct from every unexpired code:
    /// collisions regenerate. (At ~40 bits of entropy a collision is
    /// unlikely but the guarantee is cheap to keep.)
    pub fn create_invite(&mut self, room_id: RoomId, created_by: IpAddr, now: Instant) -> ShareCode {
        self.maybe_sweep(now);
        loop {
            let code = ShareCode::generate();
            match self.invites.get(&code) {
                Some(existing) if !self.invite_expired(existing, now) => continue,
                _ => {
                    self.invites.insert(
                        code.clone(),
                        InviteRecord {
                            room_id,
                            created_at: now,
                            created_by,
                        },
                    );
                    return code;
                }
            }
        }
    }

    /// Atomically read-and-delete an invite.
    ///
    /// Returns the bound room id, or `None` for unknown and expired codes
    /// alike. The removal happens before the caller can observe the value,
    /// so two concurrent redemptions see exactly one winner.
    pub fn redeem_invite(&mut self, code: &ShareCode, now: Instant) -> Option<RoomId> {
        self.maybe_sweep(now);
        let record = self.invites.remove(code)?;
        if self.invite_expired(&record, now) {
            return None;
        }
        Some(record.room_id)
    }

    /// Overwrite a peer's presence record. Idempotent refresh: only the
    /// timestamps (and any new connection metadata) change.
    pub fn announce(
        &mut self,
        room_id: RoomId,
        peer_id: PeerId,
        sdp_offer: Option<String>,
        ice_candidates: Option<Vec<String>>,
        now: Instant,
        now_ms: u64,
    ) {
        self.maybe_sweep(now);
        self.rooms.entry(room_id).or_default().insert(
            peer_id,
            PresenceRecord {
                peer_id,
                sdp_offer,
                ice_candidates,
                last_seen: now,
                last_seen_ms: now_ms,
            },
        );
    }

    /// All unexpired presence records for a room.
    ///
    /// Expired records are invisible here even when the sweep has not
    /// removed them yet.
    pub fn list_peers(&mut self, room_id: &RoomId, now: Instant) -> Vec<PresenceRecord> {
        self.maybe_sweep(now);
        let Some(peers) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        let mut records: Vec<PresenceRecord> = peers
            .values()
            .filter(|p| !self.presence_expired(p, now))
            .cloned()
            .collect();
        records.sort_by_key(|p| p.peer_id);
        records
    }

    /// Remove every expired invite and presence record.
    pub fn sweep(&mut self, now: Instant) {
        let invite_ttl = self.invite_ttl;
        self.invites
            .retain(|_, r| now.saturating_duration_since(r.created_at) <= invite_ttl);
        let presence_ttl = self.presence_ttl;
        for peers in self.rooms.values_mut() {
            peers.retain(|_, p| now.saturating_duration_since(p.last_seen) <= presence_ttl);
        }
        self.rooms.retain(|_, peers| !peers.is_empty());
    }

    /// Number of invites currently held (including not-yet-swept expired ones).
    pub fn invite_count(&self) -> usize {
        self.invites.len()
    }

    fn invite_expired(&self, record: &InviteRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.created_at) > self.invite_ttl
    }

    fn presence_expired(&self, record: &PresenceRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.last_seen) > self.presence_ttl
    }

    fn maybe_sweep(&mut self, now: Instant) {
        self.op_counter = self.op_counter.wrapping_add(1);
        if self.op_counter % Self::AUTO_SWEEP_OP_INTERVAL == 0 {
            self.sweep(now);
        }
    }
}
