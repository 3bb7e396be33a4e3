//! Session runner
//!
//! One logical task per room. Every state transition - discovery,
//! negotiation, authentication, replication fan-out, timers - happens on
//! this task; channel I/O and dialing run on helper tasks that feed
//! events back through one queue.
//!
//! The relay is a resumable accessory: when it drops mid-session the
//! runner reconnects with jittered exponential backoff and keeps every
//! authenticated transport running untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use cove_proto::peer::{decode_payload, PeerFrame};
use cove_proto::signal::{ControlFrame, NegotiationFrame, SignalFrame};
use cove_proto::{PeerId, RoomId};

use crate::rendezvous::{RendezvousClient, SignalChannel};
use crate::security::RoomKeys;
use crate::sync::RoomDoc;

use super::auth::AuthOutcome;
use super::config::SessionConfig;
use super::error::SessionError;
use super::events::{SessionEvent, SessionStatus};
use super::transport::{we_initiate, PeerChannel, PeerConnector, Transport, TransportState};

/// Commands from the session handle.
pub(crate) enum Command {
    /// Flush pending local document changes now.
    Commit,
    /// Tear everything down and go idle.
    Stop,
}

/// Events from helper tasks back into the runner.
enum Internal {
    /// A frame (or closure) from one peer channel.
    Channel { peer: PeerId, event: ChannelEvent },
    /// An inbound channel from the connector's accept loop.
    Inbound {
        remote_endpoint: String,
        channel: Box<dyn PeerChannel>,
    },
    /// Our dial to a peer finished.
    Dialed {
        peer: PeerId,
        channel: Box<dyn PeerChannel>,
    },
    DialFailed {
        peer: PeerId,
        error: String,
    },
}

enum ChannelEvent {
    Line(String),
    Closed,
}

pub(crate) struct Runner {
    config: SessionConfig,
    room_id: RoomId,
    keys: RoomKeys,
    client: RendezvousClient,
    connector: Arc<dyn PeerConnector>,
    doc: Arc<Mutex<RoomDoc>>,
    events: mpsc::Sender<SessionEvent>,
    status: Arc<RwLock<SessionStatus>>,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,

    /// Current relay connection, split for the select loop.
    relay_tx: Option<crate::rendezvous::SignalSender>,
    relay_rx: Option<mpsc::UnboundedReceiver<SignalFrame>>,
    /// Relay-assigned id; changes across reconnects.
    our_id: PeerId,

    transports: HashMap<PeerId, Transport>,
    channel_tasks: HashMap<PeerId, JoinHandle<()>>,
    accept_task: Option<JoinHandle<()>>,

    reconnect_at: Option<Instant>,
    reconnect_backoff: Duration,
    announce_paused_until: Option<Instant>,
    consecutive_rate_limits: u32,
}

/// Receive from an optional queue; pending forever when absent.
async fn opt_recv<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
impl Runner {
    pub(crate) fn new(
        config: SessionConfig,
        room_id: RoomId,
        keys: RoomKeys,
        client: RendezvousClient,
        connector: Arc<dyn PeerConnector>,
        doc: Arc<Mutex<RoomDoc>>,
        events: mpsc::Sender<SessionEvent>,
        status: Arc<RwLock<SessionStatus>>,
        commands: mpsc::UnboundedReceiver<Command>,
        relay: SignalChannel,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let reconnect_backoff = Duration::from_secs(config.reconnect_min_backoff_secs);
        Self {
            config,
            room_id,
            keys,
            client,
            connector,
            doc,
            events,
            status,
            commands,
            internal_tx,
            internal_rx,
            our_id: relay.assigned_id,
            relay_tx: Some(relay.sender),
            relay_rx: Some(relay.frames),
            transports: HashMap::new(),
            channel_tasks: HashMap::new(),
            accept_task: None,
            reconnect_at: None,
            reconnect_backoff,
            announce_paused_until: None,
            consecutive_rate_limits: 0,
        }
    }

    pub(crate) async fn run(mut self, initial_peers: Vec<PeerId>) {
        self.spawn_accept_loop();
        self.set_status(SessionStatus::Syncing, None).await;

        for peer in initial_peers {
            self.discover(peer).await;
        }

        if let Err(e) = self.run_inner().await {
            warn!(room = %self.room_id.short(), error = %e, "session failed");
            self.teardown_connections().await;
            self.set_status(SessionStatus::Error, Some(e.to_string())).await;
            // Only stop() can move us out of Error.
            loop {
                match self.commands.recv().await {
                    Some(Command::Stop) | None => break,
                    Some(Command::Commit) => {}
                }
            }
        }

        self.teardown_connections().await;
        self.set_status(SessionStatus::Idle, None).await;
        info!(room = %self.room_id.short(), "session stopped");
    }

    async fn run_inner(&mut self) -> Result<(), SessionError> {
        let mut announce = tokio::time::interval(self.config.announce_interval());
        let mut poll = tokio::time::interval(self.config.poll_interval());
        let mut batch = tokio::time::interval(self.config.batch_interval());
        let mut housekeeping = tokio::time::interval(Duration::from_millis(250));
        // The synchronous announce at start covers the first tick of each.
        announce.tick().await;
        poll.tick().await;
        batch.tick().await;
        housekeeping.tick().await;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Commit) => self.flush_local().await?,
                    Some(Command::Stop) | None => return Ok(()),
                },
                frame = opt_recv(&mut self.relay_rx) => match frame {
                    Some(frame) => self.on_relay_frame(frame).await,
                    None => self.on_relay_closed(),
                },
                event = self.internal_rx.recv() => {
                    // Never closed: we hold a sender ourselves.
                    if let Some(event) = event {
                        self.on_internal(event).await?;
                    }
                },
                _ = announce.tick() => self.announce(false).await,
                _ = poll.tick() => self.poll_presence().await,
                _ = batch.tick() => self.flush_local().await?,
                _ = housekeeping.tick() => self.tick(Instant::now()).await,
            }
        }
    }

    // ---- relay ----------------------------------------------------------

    async fn on_relay_frame(&mut self, frame: SignalFrame) {
        match frame {
            SignalFrame::Control(ControlFrame::PeerJoined { peer_id }) => {
                self.discover(peer_id).await;
            }
            SignalFrame::Control(ControlFrame::PeerLeft { peer_id }) => {
                // Presence on the relay is not the transport: only a
                // still-negotiating record is worthless without it.
                let negotiating = self
                    .transports
                    .get(&peer_id)
                    .map(|t| t.state == TransportState::Negotiating)
                    .unwrap_or(false);
                if negotiating {
                    self.close_transport(peer_id, "peer left during negotiation").await;
                }
            }
            SignalFrame::Control(ControlFrame::Peers { peers, .. }) => {
                for peer in peers {
                    self.discover(peer).await;
                }
            }
            SignalFrame::Relayed { from, body } => match NegotiationFrame::decode(&body) {
                Some(NegotiationFrame::Offer { metadata }) => {
                    self.on_offer(from, metadata).await;
                }
                Some(NegotiationFrame::Answer { metadata }) => {
                    self.on_answer(from, metadata).await;
                }
                Some(NegotiationFrame::Ice { .. }) => {
                    // The connector does its own path finding; candidates
                    // from other implementations are informational.
                    trace!(from = %from.short(), "ignoring ice candidate");
                }
                None => trace!(from = %from.short(), "dropping unknown relayed frame"),
            },
        }
    }

    fn on_relay_closed(&mut self) {
        if self.relay_rx.take().is_some() {
            self.relay_tx = None;
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
            let delay = self.reconnect_backoff + jitter;
            self.reconnect_at = Some(Instant::now() + delay);
            warn!(
                room = %self.room_id.short(),
                delay_ms = delay.as_millis() as u64,
                "relay connection lost; will reconnect"
            );
        }
    }

    async fn relay_send(&mut self, line: &str) {
        let Some(sender) = self.relay_tx.as_mut() else {
            trace!("relay down; dropping outbound signaling frame");
            return;
        };
        if sender.send(line).await.is_err() {
            self.on_relay_closed();
        }
    }

    async fn try_reconnect_relay(&mut self) {
        match SignalChannel::connect(
            self.client.authority(),
            &self.client.signal_path(&self.room_id),
            &self.room_id,
            self.config.request_deadline(),
        )
        .await
        {
            Ok(relay) => {
                info!(
                    room = %self.room_id.short(),
                    assigned = %relay.assigned_id.short(),
                    "relay reconnected; session resumes"
                );
                self.our_id = relay.assigned_id;
                self.relay_tx = Some(relay.sender);
                self.relay_rx = Some(relay.frames);
                self.reconnect_at = None;
                self.reconnect_backoff =
                    Duration::from_secs(self.config.reconnect_min_backoff_secs);
                // New relay id: refresh presence immediately, then treat
                // the room listing as plain discovery. Established
                // transports carry on; duplicates are filtered by
                // endpoint identity during negotiation.
                self.announce(true).await;
                for peer in relay.peers_at_join {
                    self.discover(peer).await;
                }
            }
            Err(e) => {
                let max = Duration::from_secs(self.config.reconnect_max_backoff_secs);
                self.reconnect_backoff = (self.reconnect_backoff * 2).min(max);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
                self.reconnect_at = Some(Instant::now() + self.reconnect_backoff + jitter);
                debug!(error = %e, backoff_s = self.reconnect_backoff.as_secs(), "relay reconnect failed");
            }
        }
    }

    // ---- rendezvous -----------------------------------------------------

    async fn announce(&mut self, force: bool) {
        if !force {
            if let Some(until) = self.announce_paused_until {
                if Instant::now() < until {
                    return;
                }
                self.announce_paused_until = None;
            }
        }

        let metadata = self.connector.local_metadata();
        match self
            .client
            .announce(&self.room_id, self.our_id, Some(metadata))
            .await
        {
            Ok(_) => {
                self.consecutive_rate_limits = 0;
                trace!(room = %self.room_id.short(), "presence announced");
            }
            Err(SessionError::RateLimited) => {
                self.consecutive_rate_limits += 1;
                if self.consecutive_rate_limits >= self.config.rate_limit_pause_after {
                    let pause = self.config.announce_interval() * 2;
                    self.announce_paused_until = Some(Instant::now() + pause);
                    self.consecutive_rate_limits = 0;
                    warn!(pause_s = pause.as_secs(), "rendezvous rate limit; pausing announcements");
                    self.emit(SessionEvent::RateLimited).await;
                }
            }
            Err(e) => debug!(error = %e, "announce failed; will retry"),
        }
    }

    async fn poll_presence(&mut self) {
        // Belt and braces next to the relay's push events. Without the
        // relay we could discover peers but not negotiate with them, so
        // skip the round-trip entirely.
        if self.relay_tx.is_none() {
            return;
        }
        match self.client.list_peers(&self.room_id).await {
            Ok(records) => {
                let our_endpoint = self.connector.endpoint_of(&self.connector.local_metadata());
                for record in records {
                    if record.peer_id == self.our_id {
                        continue;
                    }
                    // Presence outlives relay ids: a record may be our own
                    // pre-reconnect announcement, or a device we already
                    // hold a transport to under another id.
                    if let Some(metadata) = &record.sdp_offer {
                        if let Some(endpoint) = self.connector.endpoint_of(metadata) {
                            if our_endpoint.as_deref() == Some(endpoint.as_str())
                                || self.endpoint_already_open(&endpoint)
                            {
                                continue;
                            }
                        }
                    }
                    self.discover(record.peer_id).await;
                }
            }
            Err(e) => debug!(error = %e, "presence poll failed"),
        }
    }

    // ---- discovery & negotiation ---------------------------------------

    async fn discover(&mut self, peer: PeerId) {
        if peer == self.our_id || self.transports.contains_key(&peer) {
            return;
        }
        let deadline = Instant::now() + self.config.negotiation_budget();
        self.transports.insert(peer, Transport::new(peer, deadline));

        if we_initiate(&self.our_id, &peer) {
            debug!(peer = %peer.short(), "initiating transport");
            let offer = NegotiationFrame::Offer {
                metadata: self.connector.local_metadata(),
            }
            .encode_to(peer);
            self.relay_send(&offer).await;
        } else {
            debug!(peer = %peer.short(), "awaiting offer from lower peer");
        }
    }

    async fn on_offer(&mut self, from: PeerId, metadata: String) {
        if from == self.our_id {
            return;
        }
        // Lower id initiates; as the lower side we ignore offers and
        // expect an answer to ours instead.
        if we_initiate(&self.our_id, &from) {
            trace!(from = %from.short(), "ignoring offer from higher peer");
            return;
        }
        let Some(endpoint) = self.connector.endpoint_of(&metadata) else {
            trace!(from = %from.short(), "offer with undecodable metadata");
            return;
        };
        // Relay hiccups hand out fresh relay ids; the endpoint identity
        // tells us this device is already connected.
        if self.endpoint_already_open(&endpoint) {
            trace!(from = %from.short(), "offer from already-connected endpoint");
            return;
        }

        let deadline = Instant::now() + self.config.negotiation_budget();
        let transport = self
            .transports
            .entry(from)
            .or_insert_with(|| Transport::new(from, deadline));
        if transport.state != TransportState::Negotiating {
            return;
        }
        transport.remote_endpoint = Some(endpoint);

        let answer = NegotiationFrame::Answer {
            metadata: self.connector.local_metadata(),
        }
        .encode_to(from);
        self.relay_send(&answer).await;
        debug!(peer = %from.short(), "answered offer; awaiting inbound channel");
    }

    async fn on_answer(&mut self, from: PeerId, metadata: String) {
        let Some(endpoint) = self.connector.endpoint_of(&metadata) else {
            return;
        };
        if self.endpoint_already_open(&endpoint) {
            // Simultaneous-initiation leftovers: drop the nascent record.
            self.transports
                .retain(|id, t| !(*id == from && t.state == TransportState::Negotiating));
            return;
        }
        let Some(transport) = self.transports.get_mut(&from) else {
            trace!(from = %from.short(), "answer without a pending offer");
            return;
        };
        if transport.state != TransportState::Negotiating || !we_initiate(&self.our_id, &from) {
            return;
        }
        transport.remote_endpoint = Some(endpoint);

        let connector = self.connector.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            match connector.dial(&metadata).await {
                Ok(channel) => {
                    let _ = internal_tx.send(Internal::Dialed {
                        peer: from,
                        channel,
                    });
                }
                Err(e) => {
                    let _ = internal_tx.send(Internal::DialFailed {
                        peer: from,
                        error: e.to_string(),
                    });
                }
            }
        });
    }

    fn endpoint_already_open(&self, endpoint: &str) -> bool {
        self.transports.values().any(|t| {
            t.state == TransportState::Open && t.remote_endpoint.as_deref() == Some(endpoint)
        })
    }

    fn spawn_accept_loop(&mut self) {
        let connector = self.connector.clone();
        let internal_tx = self.internal_tx.clone();
        self.accept_task = Some(tokio::spawn(async move {
            while let Some((remote_endpoint, channel)) = connector.accept().await {
                if internal_tx
                    .send(Internal::Inbound {
                        remote_endpoint,
                        channel,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    async fn on_internal(&mut self, event: Internal) -> Result<(), SessionError> {
        match event {
            Internal::Channel { peer, event } => match event {
                ChannelEvent::Line(line) => self.on_channel_line(peer, line).await?,
                ChannelEvent::Closed => {
                    if self.transports.contains_key(&peer) {
                        self.close_transport(peer, "channel closed").await;
                    }
                }
            },
            Internal::Dialed { peer, channel } => {
                self.attach_channel(peer, channel).await;
            }
            Internal::DialFailed { peer, error } => {
                debug!(peer = %peer.short(), error = %error, "dial failed");
                self.close_transport(peer, "dial failed").await;
            }
            Internal::Inbound {
                remote_endpoint,
                channel,
            } => {
                self.on_inbound_channel(remote_endpoint, channel).await;
            }
        }
        Ok(())
    }

    async fn on_inbound_channel(
        &mut self,
        remote_endpoint: String,
        mut channel: Box<dyn PeerChannel>,
    ) {
        let matched = self
            .transports
            .values()
            .find(|t| {
                t.state == TransportState::Negotiating
                    && t.remote_endpoint.as_deref() == Some(remote_endpoint.as_str())
            })
            .map(|t| t.peer_id);

        match matched {
            Some(peer) => self.attach_channel(peer, channel).await,
            None => {
                debug!(
                    endpoint = %&remote_endpoint[..remote_endpoint.len().min(8)],
                    "inbound channel from unknown endpoint"
                );
                channel.close().await;
            }
        }
    }

    async fn attach_channel(&mut self, peer: PeerId, mut channel: Box<dyn PeerChannel>) {
        let auth_deadline = Instant::now() + self.config.auth_response_budget();
        let Some(transport) = self.transports.get_mut(&peer) else {
            channel.close().await;
            return;
        };
        if transport.state != TransportState::Negotiating {
            debug!(peer = %peer.short(), "duplicate channel; closing the newcomer");
            channel.close().await;
            return;
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        transport.outbound = Some(out_tx);
        transport.state = TransportState::Open;
        transport.auth_deadline = Some(auth_deadline);

        // The channel is open: both sides fire their challenge.
        transport.send_frame(&transport.auth.opening_frame());

        let task = spawn_channel_task(peer, channel, out_rx, self.internal_tx.clone());
        self.channel_tasks.insert(peer, task);
        debug!(peer = %peer.short(), "transport open; authenticating");
    }

    // ---- authentication & replication -----------------------------------

    async fn on_channel_line(&mut self, peer: PeerId, line: String) -> Result<(), SessionError> {
        let authenticated = match self.transports.get(&peer) {
            Some(transport) => transport.is_authenticated(),
            None => return Ok(()),
        };

        let frame = match PeerFrame::decode(&line) {
            Ok(frame) => frame,
            Err(_) => {
                self.close_transport(peer, "undecodable frame").await;
                return Ok(());
            }
        };

        if authenticated {
            return self.on_replication_frame(peer, frame).await;
        }

        let outcome = {
            let Some(transport) = self.transports.get_mut(&peer) else {
                return Ok(());
            };
            let outcome = transport.auth.on_frame(&frame, &self.keys.auth);
            if let AuthOutcome::Continue {
                send,
                authenticated,
            } = &outcome
            {
                for out in send {
                    transport.send_frame(out);
                }
                if transport.auth.remote_verified() {
                    transport.auth_deadline = None;
                }
                if *authenticated {
                    // Kick off replication the moment both bits are set.
                    transport.send_frame(&PeerFrame::SyncRequest);
                }
            }
            outcome
        };

        match outcome {
            AuthOutcome::Violation(why) => {
                self.close_transport(peer, why).await;
            }
            AuthOutcome::Continue {
                authenticated: true,
                ..
            } => {
                info!(peer = %peer.short(), room = %self.room_id.short(), "peer authenticated");
                self.emit(SessionEvent::PeerConnected { peer_id: peer }).await;
            }
            AuthOutcome::Continue { .. } => {}
        }
        Ok(())
    }

    async fn on_replication_frame(
        &mut self,
        peer: PeerId,
        frame: PeerFrame,
    ) -> Result<(), SessionError> {
        match frame {
            PeerFrame::SyncRequest => {
                let snapshot = {
                    let doc = self.doc.lock().await;
                    doc.snapshot()?
                };
                if let Some(transport) = self.transports.get(&peer) {
                    transport.send_frame(&PeerFrame::sync_response(&snapshot));
                }
                Ok(())
            }
            PeerFrame::SyncResponse { update } | PeerFrame::Update { update } => {
                let Ok(bytes) = decode_payload(&update) else {
                    self.close_transport(peer, "undecodable update payload").await;
                    return Ok(());
                };
                self.apply_remote(peer, bytes).await
            }
            // Auth frames after authentication are as out-of-order as
            // data frames before it.
            _ => {
                self.close_transport(peer, "auth frame after authentication").await;
                Ok(())
            }
        }
    }

    async fn apply_remote(&mut self, origin: PeerId, bytes: Vec<u8>) -> Result<(), SessionError> {
        let absorbed = {
            let mut doc = self.doc.lock().await;
            doc.absorb_remote(&bytes)
        };
        let pending = match absorbed {
            Ok(pending) => pending,
            Err(e) => {
                // Bad bytes are the sender's problem, not the session's.
                debug!(origin = %origin.short(), error = %e, "update failed to merge");
                self.close_transport(origin, "unmergeable update").await;
                return Ok(());
            }
        };

        // Flushed local changes go to everyone; the remote update goes to
        // everyone except where it came from. That origin filter is what
        // keeps two live peers from ping-ponging the same update forever.
        if let Some(delta) = pending {
            self.broadcast(&PeerFrame::update(&delta), None);
        }
        self.broadcast(&PeerFrame::update(&bytes), Some(origin));

        self.emit(SessionEvent::DocUpdated { origin }).await;
        Ok(())
    }

    async fn flush_local(&mut self) -> Result<(), SessionError> {
        let delta = {
            let mut doc = self.doc.lock().await;
            doc.local_delta()?
        };
        if let Some(delta) = delta {
            trace!(size = delta.len(), "broadcasting local changes");
            self.broadcast(&PeerFrame::update(&delta), None);
        }
        Ok(())
    }

    /// Send a frame to every authenticated transport except `skip`.
    fn broadcast(&self, frame: &PeerFrame, skip: Option<PeerId>) {
        for transport in self.transports.values() {
            if Some(transport.peer_id) == skip || !transport.is_authenticated() {
                continue;
            }
            transport.send_frame(frame);
        }
    }

    // ---- lifecycle -------------------------------------------------------

    async fn close_transport(&mut self, peer: PeerId, reason: &str) {
        if let Some(transport) = self.transports.remove(&peer) {
            debug!(peer = %peer.short(), reason = reason, "closing transport");
            let was_authenticated = transport.is_authenticated();
            // Dropping the record drops the outbound queue; the channel
            // task closes the channel without trailing frames and exits.
            drop(transport);
            self.channel_tasks.remove(&peer);
            if was_authenticated {
                self.emit(SessionEvent::PeerDisconnected { peer_id: peer }).await;
            }
        }
    }

    async fn tick(&mut self, now: Instant) {
        if let Some(at) = self.reconnect_at {
            if now >= at {
                self.try_reconnect_relay().await;
            }
        }

        let mut expired: Vec<(PeerId, &'static str)> = Vec::new();
        for transport in self.transports.values() {
            if transport.state == TransportState::Negotiating && now >= transport.deadline {
                expired.push((transport.peer_id, "negotiation budget exhausted"));
            } else if transport.state == TransportState::Open && !transport.is_authenticated() {
                if let Some(auth_deadline) = transport.auth_deadline {
                    if now >= auth_deadline {
                        expired.push((transport.peer_id, "auth response overdue"));
                        continue;
                    }
                }
                if now >= transport.deadline {
                    expired.push((transport.peer_id, "authentication budget exhausted"));
                }
            }
        }
        for (peer, reason) in expired {
            self.close_transport(peer, reason).await;
        }
    }

    async fn teardown_connections(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        // Dropping the records drops every outbound queue; the channel
        // tasks close their channels silently and exit on their own.
        self.transports.clear();
        self.channel_tasks.clear();
        if let Some(sender) = self.relay_tx.take() {
            sender.close().await;
        }
        self.relay_rx = None;
    }

    async fn set_status(&self, status: SessionStatus, last_error: Option<String>) {
        {
            let mut current = self.status.write().await;
            *current = status;
        }
        self.emit(SessionEvent::Status { status, last_error }).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.try_send(event).is_err() {
            trace!("event queue full or gone; dropping event");
        }
    }
}

/// Pump one peer channel: outbound queue → channel, channel → runner.
fn spawn_channel_task(
    peer: PeerId,
    mut channel: Box<dyn PeerChannel>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    internal_tx: mpsc::UnboundedSender<Internal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                line = out_rx.recv() => match line {
                    Some(line) => {
                        if channel.send(&line).await.is_err() {
                            break;
                        }
                    }
                    // Transport evicted: close without trailing frames.
                    None => {
                        channel.close().await;
                        return;
                    }
                },
                inbound = channel.recv() => match inbound {
                    Some(line) => {
                        let event = Internal::Channel {
                            peer,
                            event: ChannelEvent::Line(line),
                        };
                        if internal_tx.send(event).is_err() {
                            return;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = internal_tx.send(Internal::Channel {
            peer,
            event: ChannelEvent::Closed,
        });
    })
}
