//! The connector-side channel state machine.
//!
//! A [`ConnectorChannel`] owns one outbound session to a peer: it dials the
//! transport, runs the Hello → Welcome identity handshake, then keeps the
//! session alive with Ping/Pong probes while relaying application frames to
//! its consumer. All of that happens on a single driver task; the handle the
//! caller keeps is only for sending, closing, and inspecting state.
//!
//! `open` resolves as soon as the transport connect does; the handshake
//! continues in the background, and readiness is observed through
//! [`ChannelEvent::Connected`], not through `open` returning.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use actor_link_proto::identity::KEY_SEPARATOR;
use actor_link_proto::{encode_frame, ActorIdentity, FrameHeader, OpCode};
use actor_link_transport::{
    Connector, ConnectorEvent, TcpConnector, TransportError,
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::event::ChannelEvent;
use crate::keepalive::KeepAliveTracker;

/// Lifecycle of a channel. `Closed` is terminal: a channel is single-use,
/// and reconnecting means constructing a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    New,
    Connecting,
    Handshaking,
    Active,
    Closed,
}

/// State shared between the driver task and the caller-facing handle.
///
/// `remote` is only ever `Some` while `handshaked` is true; the driver
/// clears them together so readers always observe a consistent pair.
#[derive(Debug)]
struct Shared {
    state: ChannelState,
    connected: bool,
    handshaked: bool,
    remote: Option<ActorIdentity>,
}

/// A connector-side (outbound) peer channel.
///
/// Generic over the transport so tests can drive the state machine with an
/// in-memory [`Connector`]; production code uses the [`TcpConnector`]
/// default.
pub struct ConnectorChannel<C: Connector = TcpConnector> {
    local: ActorIdentity,
    endpoint: SocketAddr,
    config: ChannelConfig,
    connector: Arc<C>,
    shared: Arc<Mutex<Shared>>,
    tracker: Arc<KeepAliveTracker>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl<C: Connector> ConnectorChannel<C> {
    pub fn new(
        local: ActorIdentity,
        endpoint: SocketAddr,
        connector: C,
        config: ChannelConfig,
    ) -> Self {
        let tracker = Arc::new(KeepAliveTracker::new(config.keepalive_interval));
        Self {
            local,
            endpoint,
            config,
            connector: Arc::new(connector),
            shared: Arc::new(Mutex::new(Shared {
                state: ChannelState::New,
                connected: false,
                handshaked: false,
                remote: None,
            })),
            tracker,
            shutdown: Mutex::new(None),
        }
    }

    /// Open the channel with the configured connect timeout.
    pub async fn open(&self) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, ChannelError> {
        self.open_with_timeout(self.config.connect_timeout).await
    }

    /// Open the channel, bounding the transport connect by `timeout`.
    ///
    /// Returns the channel's event stream as soon as the connect resolves;
    /// the handshake runs on a background driver task and success surfaces
    /// as [`ChannelEvent::Connected`]. A connect *timeout* is logged and
    /// closes the channel; the stream is still returned, it just never
    /// yields. Any other connect failure is returned as an error.
    pub async fn open_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, ChannelError> {
        {
            let mut shared = self.lock_shared();
            if shared.state != ChannelState::New {
                return Err(ChannelError::Closed);
            }
            shared.state = ChannelState::Connecting;
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport_events = match self.connector.connect(timeout).await {
            Ok(events) => events,
            Err(TransportError::ConnectTimeout) => {
                warn!(endpoint = %self.endpoint, "connect timed out, closing channel");
                self.lock_shared().state = ChannelState::Closed;
                return Ok(event_rx);
            }
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, "connect failed");
                self.lock_shared().state = ChannelState::Closed;
                return Err(ChannelError::Transport(e));
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        {
            // Locked in the same order close() uses (shutdown slot, then
            // shared state), so a concurrent close either lands before this
            // block and we bail out here, or it finds the shutdown sender
            // installed and signals the driver. It can never slip between
            // the state commit and the sender becoming visible.
            let mut shutdown_slot = self.lock_shutdown();
            let mut shared = self.lock_shared();
            if shared.state == ChannelState::Closed {
                // close() raced the connect; honor it.
                drop(shared);
                drop(shutdown_slot);
                self.connector.disconnect();
                return Ok(event_rx);
            }
            shared.state = ChannelState::Handshaking;
            shared.connected = true;
            *shutdown_slot = Some(shutdown_tx);
        }

        let driver = Driver {
            local: self.local.clone(),
            endpoint: self.endpoint,
            config: self.config.clone(),
            connector: self.connector.clone(),
            shared: self.shared.clone(),
            tracker: self.tracker.clone(),
            events: event_tx,
        };
        tokio::spawn(driver.run(transport_events, shutdown_rx));

        Ok(event_rx)
    }

    /// Close the channel. Idempotent and callable from any thread or task,
    /// including from within an event handler.
    ///
    /// Teardown itself happens on the driver task; this only signals it.
    pub fn close(&self) {
        // Hold the shutdown slot while touching shared state, mirroring the
        // lock order in open_with_timeout: with the slot empty, open cannot
        // spawn a driver until the state below is marked Closed.
        let mut shutdown_slot = self.lock_shutdown();
        if let Some(tx) = shutdown_slot.take() {
            let _ = tx.send(());
            return;
        }
        // No driver to signal: either never opened, or already torn down.
        let mut shared = self.lock_shared();
        if shared.state != ChannelState::Closed {
            debug!(endpoint = %self.endpoint, "closing channel before open completed");
            shared.state = ChannelState::Closed;
        }
    }

    // --- sending ------------------------------------------------------

    /// Send an already-framed message to the named actor instance.
    ///
    /// Fails fast with [`ChannelError::NotConnected`] when no handshaked
    /// session exists, and with [`ChannelError::AddressMismatch`] when
    /// `type#name` is not the peer's key. No bytes reach the transport in
    /// either case.
    pub fn send(
        &self,
        actor_type: &str,
        actor_name: &str,
        frame: Bytes,
    ) -> Result<(), ChannelError> {
        self.check_address(actor_type, Some(actor_name))?;
        self.connector.send(frame, None)?;
        self.tracker.on_data_sent();
        Ok(())
    }

    /// Send to any instance of `actor_type`; only the type is checked
    /// against the peer.
    pub fn send_to_type(&self, actor_type: &str, frame: Bytes) -> Result<(), ChannelError> {
        self.check_address(actor_type, None)?;
        self.connector.send(frame, None)?;
        self.tracker.on_data_sent();
        Ok(())
    }

    /// Like [`send`](Self::send), additionally returning a receiver that
    /// resolves once the bytes have reached the socket. The receiver yields
    /// an error from the writer, or closes unresolved if the connection goes
    /// down first.
    pub fn send_with_completion(
        &self,
        actor_type: &str,
        actor_name: &str,
        frame: Bytes,
    ) -> Result<oneshot::Receiver<actor_link_transport::Result<()>>, ChannelError> {
        self.check_address(actor_type, Some(actor_name))?;
        let (tx, rx) = oneshot::channel();
        self.connector.send(frame, Some(tx))?;
        self.tracker.on_data_sent();
        Ok(rx)
    }

    /// Completion-notified variant of [`send_to_type`](Self::send_to_type).
    pub fn send_to_type_with_completion(
        &self,
        actor_type: &str,
        frame: Bytes,
    ) -> Result<oneshot::Receiver<actor_link_transport::Result<()>>, ChannelError> {
        self.check_address(actor_type, None)?;
        let (tx, rx) = oneshot::channel();
        self.connector.send(frame, Some(tx))?;
        self.tracker.on_data_sent();
        Ok(rx)
    }

    // --- properties ---------------------------------------------------

    /// True when the transport is connected and the handshake completed.
    pub fn active(&self) -> bool {
        let shared = self.lock_shared();
        shared.connected && shared.handshaked
    }

    pub fn is_handshaked(&self) -> bool {
        self.lock_shared().handshaked
    }

    pub fn state(&self) -> ChannelState {
        self.lock_shared().state
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn local_identity(&self) -> &ActorIdentity {
        &self.local
    }

    /// The peer's asserted identity, while handshaked.
    pub fn remote_identity(&self) -> Option<ActorIdentity> {
        self.lock_shared().remote.clone()
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.config.keepalive_interval
    }

    pub fn keepalive_timeout(&self) -> Duration {
        self.config.keepalive_timeout
    }

    // --- internals ----------------------------------------------------

    /// Validate a send against the handshaked peer. Runs under the shared
    /// lock so the `(handshaked, remote)` pair is read consistently.
    fn check_address(
        &self,
        actor_type: &str,
        actor_name: Option<&str>,
    ) -> Result<(), ChannelError> {
        let shared = self.lock_shared();
        if !(shared.connected && shared.handshaked) {
            return Err(ChannelError::NotConnected);
        }
        let remote = shared.remote.as_ref().ok_or(ChannelError::NotConnected)?;

        match actor_name {
            Some(name) => {
                let requested = format!("{actor_type}{KEY_SEPARATOR}{name}");
                if requested != remote.key() {
                    return Err(ChannelError::AddressMismatch {
                        requested,
                        remote: remote.key(),
                    });
                }
            }
            None => {
                if actor_type != remote.actor_type {
                    return Err(ChannelError::AddressMismatch {
                        requested: actor_type.to_string(),
                        remote: remote.key(),
                    });
                }
            }
        }
        Ok(())
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_shutdown(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.shutdown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Why a driver is tearing the channel down.
enum CloseReason {
    LocalClose,
    HandshakeTimeout,
    HandshakeRejected(&'static str),
    KeepAliveTimeout,
    PeerDisconnected,
    Transport(TransportError),
    Internal(String),
}

/// The background task that owns a session: handshake, inbound dispatch,
/// keep-alive timers, teardown. One driver exists per successful connect,
/// and it emits `Disconnected` exactly once, on its way out.
struct Driver<C: Connector> {
    local: ActorIdentity,
    endpoint: SocketAddr,
    config: ChannelConfig,
    connector: Arc<C>,
    shared: Arc<Mutex<Shared>>,
    tracker: Arc<KeepAliveTracker>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl<C: Connector> Driver<C> {
    async fn run(
        self,
        mut transport: mpsc::UnboundedReceiver<ConnectorEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let reason = match self.handshake(&mut transport, &mut shutdown).await {
            Ok(remote) => self.steady(remote, &mut transport, &mut shutdown).await,
            Err(reason) => reason,
        };
        self.teardown(reason);
    }

    /// Send Hello, then wait (bounded) for the first inbound frame and
    /// validate it as a Welcome carrying a usable identity.
    ///
    /// The first frame is consumed here rather than by the steady-state
    /// dispatcher, so a Welcome can never be misread as application traffic.
    async fn handshake(
        &self,
        transport: &mut mpsc::UnboundedReceiver<ConnectorEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<ActorIdentity, CloseReason> {
        let payload = self
            .local
            .encode()
            .map_err(|e| CloseReason::Internal(e.to_string()))?;
        self.connector
            .send(encode_frame(OpCode::Hello, &payload), None)
            .map_err(CloseReason::Transport)?;
        self.tracker.on_data_sent();
        debug!(endpoint = %self.endpoint, local = %self.local, "hello sent, awaiting welcome");

        let deadline = Instant::now() + self.config.handshake_timeout;
        let buf = tokio::select! {
            event = transport.recv() => match event {
                Some(ConnectorEvent::Data(buf)) => buf,
                Some(ConnectorEvent::Disconnected) | None => {
                    return Err(CloseReason::PeerDisconnected);
                }
            },
            _ = sleep_until(deadline) => return Err(CloseReason::HandshakeTimeout),
            _ = &mut *shutdown => return Err(CloseReason::LocalClose),
        };
        self.tracker.on_data_received();

        let Some(header) = FrameHeader::decode(&buf) else {
            return Err(CloseReason::HandshakeRejected("undecodable frame header"));
        };
        if header.opcode != OpCode::Welcome {
            return Err(CloseReason::HandshakeRejected("first frame was not a welcome"));
        }
        let remote = match ActorIdentity::decode(header.payload(&buf)) {
            Ok(id) if id.is_empty() => {
                return Err(CloseReason::HandshakeRejected("peer identity is empty"));
            }
            Ok(id) => id,
            Err(_) => {
                return Err(CloseReason::HandshakeRejected("undecodable peer identity"));
            }
        };

        {
            let mut shared = lock_shared(&self.shared);
            shared.remote = Some(remote.clone());
            shared.handshaked = true;
            shared.state = ChannelState::Active;
        }
        self.tracker.start();
        info!(endpoint = %self.endpoint, remote = %remote, "handshake complete");
        let _ = self.events.send(ChannelEvent::Connected {
            endpoint: self.endpoint,
            remote: remote.clone(),
        });
        Ok(remote)
    }

    /// Steady state: one select loop over inbound frames, the keep-alive
    /// ticker, the (optional) pong deadline, and the close signal. Because
    /// everything runs on this one task, tick handling can never overlap
    /// with itself or with dispatch.
    async fn steady(
        &self,
        remote: ActorIdentity,
        transport: &mut mpsc::UnboundedReceiver<ConnectorEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> CloseReason {
        // Pinging ourselves through in-process wiring would measure nothing.
        let loopback = self.local == remote;
        if loopback {
            debug!(identity = %self.local, "loopback peer, keep-alive suppressed");
        }

        let mut tick = interval_at(
            Instant::now() + self.config.keepalive_interval,
            self.config.keepalive_interval,
        );
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Armed after each Ping, disarmed by the matching Pong.
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let deadline = pong_deadline;
            tokio::select! {
                event = transport.recv() => match event {
                    Some(ConnectorEvent::Data(buf)) => {
                        self.tracker.on_data_received();
                        if let Err(reason) = self.dispatch(buf, &remote, &mut pong_deadline) {
                            return reason;
                        }
                    }
                    Some(ConnectorEvent::Disconnected) | None => {
                        return CloseReason::PeerDisconnected;
                    }
                },
                _ = tick.tick() => {
                    if loopback {
                        continue;
                    }
                    // One probe in flight at a time: re-arming the deadline
                    // on every tick would keep pushing it past the next tick
                    // and an unresponsive peer would never be declared dead.
                    if pong_deadline.is_none() && self.tracker.should_send_keepalive() {
                        trace!(endpoint = %self.endpoint, "sending keep-alive ping");
                        if let Err(e) = self.connector.send(encode_frame(OpCode::Ping, &[]), None) {
                            return CloseReason::Transport(e);
                        }
                        pong_deadline = Some(Instant::now() + self.config.keepalive_timeout);
                        self.tracker.reset();
                    }
                }
                _ = pong_overdue(deadline) => return CloseReason::KeepAliveTimeout,
                _ = &mut *shutdown => return CloseReason::LocalClose,
            }
        }
    }

    /// Route one inbound frame: answer Pings, absorb Pongs, deliver
    /// everything else to the consumer with its header intact.
    fn dispatch(
        &self,
        buf: Bytes,
        remote: &ActorIdentity,
        pong_deadline: &mut Option<Instant>,
    ) -> Result<(), CloseReason> {
        match FrameHeader::decode(&buf) {
            Some(header) if header.opcode == OpCode::Ping => {
                trace!(endpoint = %self.endpoint, "ping received, answering");
                self.connector
                    .send(encode_frame(OpCode::Pong, &[]), None)
                    .map_err(CloseReason::Transport)?;
                self.tracker.on_data_sent();
            }
            Some(header) if header.opcode == OpCode::Pong => {
                trace!(endpoint = %self.endpoint, "pong received");
                *pong_deadline = None;
            }
            _ => {
                let _ = self.events.send(ChannelEvent::Data {
                    endpoint: self.endpoint,
                    remote: remote.clone(),
                    frame: buf,
                });
            }
        }
        Ok(())
    }

    /// Tear the session down: stop the tracker, drop the transport, emit
    /// `Disconnected` carrying the last known peer, then clear the identity
    /// state. The emit happens before the clear so observers of the event
    /// can still read who the peer was.
    fn teardown(&self, reason: CloseReason) {
        match &reason {
            CloseReason::LocalClose => {
                debug!(endpoint = %self.endpoint, "channel closed locally");
            }
            CloseReason::HandshakeTimeout => {
                warn!(endpoint = %self.endpoint, "handshake timed out");
            }
            CloseReason::HandshakeRejected(why) => {
                warn!(endpoint = %self.endpoint, why = %why, "handshake rejected");
            }
            CloseReason::KeepAliveTimeout => {
                warn!(
                    endpoint = %self.endpoint,
                    quiet_for = ?self.tracker.last_received_elapsed(),
                    "keep-alive timed out, peer presumed dead"
                );
            }
            CloseReason::PeerDisconnected => {
                info!(endpoint = %self.endpoint, "peer disconnected");
            }
            CloseReason::Transport(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "transport failure");
            }
            CloseReason::Internal(e) => {
                error!(endpoint = %self.endpoint, error = %e, "internal channel failure");
            }
        }

        self.tracker.stop();
        self.connector.disconnect();

        let remote = {
            let mut shared = lock_shared(&self.shared);
            shared.state = ChannelState::Closed;
            shared.connected = false;
            shared.remote.clone()
        };

        let _ = self.events.send(ChannelEvent::Disconnected {
            endpoint: self.endpoint,
            remote,
        });

        let mut shared = lock_shared(&self.shared);
        shared.handshaked = false;
        shared.remote = None;
    }
}

/// Resolves when an armed pong deadline passes; pends forever while
/// disarmed.
async fn pong_overdue(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
