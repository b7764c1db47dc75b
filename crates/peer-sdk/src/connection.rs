//! A live connection to one peer: transport tasks, answer correlation and
//! the teardown gate shared by every procedure.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use diam_protocol::dict::{avp as code, command, result_code};
use diam_protocol::{Avp, AvpData, DiameterCodec, DisconnectCause, Message};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Framed;

use crate::ids::IdGenerator;
use crate::registry::StateMachine;
use crate::settings::Settings;
use crate::signal::Signal;
use crate::types::{
    CloseReason, Error, HandshakeState, PeerCapabilities, WatchdogReport, WatchdogState,
};

const OUTBOUND_QUEUE: usize = 64;

/// Per-connection knobs decided by the [`Client`](crate::Client).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionOptions {
    pub origin_state_id: u32,
    pub answer_timeout: Duration,
    pub max_message_bytes: usize,
}

// ── Answer correlation ───────────────────────────────────────────────

/// Pending exchanges keyed by hop-by-hop identifier.
#[derive(Default)]
pub(crate) struct Correlator {
    waiting: Mutex<HashMap<u32, oneshot::Sender<Message>>>,
}

impl Correlator {
    /// Wait for the answer to `hop_by_hop`.  Registering again replaces the
    /// previous waiter, which is how retransmissions keep a single slot.
    pub(crate) fn register(&self, hop_by_hop: u32) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(hop_by_hop, tx);
        rx
    }

    /// Hand `answer` to its waiter, or give it back if nobody is waiting.
    pub(crate) fn complete(&self, answer: Message) -> Result<(), Message> {
        let waiter = self.waiting.lock().remove(&answer.hop_by_hop());
        match waiter {
            Some(tx) => tx.send(answer),
            None => Err(answer),
        }
    }

    pub(crate) fn cancel(&self, hop_by_hop: u32) {
        self.waiting.lock().remove(&hop_by_hop);
    }

    fn clear(&self) {
        self.waiting.lock().clear();
    }
}

/// One correlator per procedure so a stray DWA can never satisfy a CER.
#[derive(Default)]
pub(crate) struct Pending {
    pub handshake: Correlator,
    pub watchdog: Correlator,
    pub requests: Correlator,
}

impl Pending {
    fn for_answer(&self, msg: &Message) -> &Correlator {
        match msg.command_code() {
            command::CAPABILITIES_EXCHANGE => &self.handshake,
            command::DEVICE_WATCHDOG => &self.watchdog,
            _ => &self.requests,
        }
    }

    fn clear(&self) {
        self.handshake.clear();
        self.watchdog.clear();
        self.requests.clear();
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Handle to an established connection.  Cheap to clone.
///
/// The connection stays up until [`close`](Self::close), a peer DPR, a
/// transport failure or watchdog expiry; dropping handles does not close it.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Shared>,
}

struct Shared {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    machine: Arc<StateMachine>,
    outbound: mpsc::Sender<Message>,
    ids: IdGenerator,
    pending: Pending,
    options: ConnectionOptions,
    handshake_state: Mutex<HandshakeState>,
    watchdog_state: Mutex<WatchdogState>,
    handshake: Signal<PeerCapabilities>,
    closed: Signal<CloseReason>,
    reports: watch::Sender<Option<WatchdogReport>>,
}

impl Connection {
    /// Frame `stream` and start the reader and writer tasks.
    pub(crate) fn spawn<S>(
        stream: S,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        machine: Arc<StateMachine>,
        options: ConnectionOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (reports, _) = watch::channel(None);
        let conn = Self {
            inner: Arc::new(Shared {
                peer_addr,
                local_addr,
                machine,
                outbound: outbound_tx,
                ids: IdGenerator::new(),
                pending: Pending::default(),
                options,
                handshake_state: Mutex::new(HandshakeState::Init),
                watchdog_state: Mutex::new(WatchdogState::Inactive),
                handshake: Signal::new(),
                closed: Signal::new(),
                reports,
            }),
        };

        let framed = Framed::new(stream, DiameterCodec::new(options.max_message_bytes));
        let (sink, stream) = framed.split();
        tokio::spawn(write_loop(conn.clone(), sink, outbound_rx));
        tokio::spawn(read_loop(conn.clone(), stream));

        tracing::debug!(
            peer = %peer_addr,
            local = %local_addr,
            origin_state_id = options.origin_state_id,
            "transport up"
        );
        conn
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// The Origin-State-Id this connection advertises.
    pub fn origin_state_id(&self) -> u32 {
        self.inner.options.origin_state_id
    }

    pub fn settings(&self) -> &Arc<Settings> {
        self.inner.machine.settings()
    }

    pub fn state_machine(&self) -> &Arc<StateMachine> {
        &self.inner.machine
    }

    /// Capabilities from the peer's CEA, once established.
    pub fn peer(&self) -> Option<PeerCapabilities> {
        self.inner.handshake.get()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        *self.inner.handshake_state.lock()
    }

    pub fn watchdog_state(&self) -> WatchdogState {
        *self.inner.watchdog_state.lock()
    }

    // ── Notifications ────────────────────────────────────────────────

    pub fn on_handshake_complete(&self) -> Signal<PeerCapabilities> {
        self.inner.handshake.clone()
    }

    /// Fires exactly once, whatever brings the connection down.
    pub fn on_close(&self) -> Signal<CloseReason> {
        self.inner.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_fired()
    }

    /// Latest successful watchdog exchange.  `None` until the first one.
    pub fn watchdog_reports(&self) -> watch::Receiver<Option<WatchdogReport>> {
        self.inner.reports.subscribe()
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Queue `msg` as is.  Requests should be [`stamp`](Self::stamp)ed first.
    pub async fn send(&self, msg: Message) -> Result<(), Error> {
        if let Some(reason) = self.inner.closed.get() {
            return Err(Error::Closed(reason));
        }
        tracing::trace!(peer = %self.inner.peer_addr, msg = %msg, "queue");
        self.inner
            .outbound
            .send(msg)
            .await
            .map_err(|_| Error::Closed(self.close_reason()))
    }

    /// Give a request fresh hop-by-hop and end-to-end identifiers.
    pub fn stamp(&self, msg: &mut Message) {
        msg.header.hop_by_hop = self.inner.ids.next_hop_by_hop();
        msg.header.end_to_end = self.inner.ids.next_end_to_end();
    }

    /// Send an application request and wait for its answer.
    ///
    /// Identifiers are assigned here.  Waits up to the client's answer
    /// timeout; a close while waiting returns [`Error::Closed`].
    pub async fn send_request(&self, mut msg: Message) -> Result<Message, Error> {
        if !msg.is_request() {
            return Err(Error::Config(format!("{} is not a request", msg.name())));
        }
        self.stamp(&mut msg);
        let hop_by_hop = msg.hop_by_hop();
        let rx = self.inner.pending.requests.register(hop_by_hop);
        if let Err(e) = self.send(msg).await {
            self.inner.pending.requests.cancel(hop_by_hop);
            return Err(e);
        }

        let timeout = self.inner.options.answer_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(Error::Closed(self.close_reason())),
            Err(_) => {
                self.inner.pending.requests.cancel(hop_by_hop);
                Err(Error::RequestTimeout(timeout))
            }
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Close the transport.  Idempotent.
    pub fn close(&self) {
        self.shutdown(CloseReason::Local);
    }

    /// Graceful shutdown: send a DPR, wait for the DPA, then close.
    ///
    /// The connection is closed even when the peer never answers.
    pub async fn disconnect(&self, cause: DisconnectCause) -> Result<(), Error> {
        let mut dpr = Message::request(command::DISCONNECT_PEER, 0);
        dpr.avps.extend(self.settings().identity_avps());
        dpr.push(Avp::mandatory(
            code::DISCONNECT_CAUSE,
            AvpData::Integer32(cause.code()),
        ));
        tracing::info!(peer = %self.inner.peer_addr, cause = %cause, "disconnecting");

        let result = self.send_request(dpr).await;
        self.shutdown(CloseReason::Local);
        let dpa = result?;
        match dpa.result_code() {
            Some(rc) if result_code::is_success(rc) => Ok(()),
            Some(rc) => Err(Error::FailedResultCode {
                code: rc,
                avps: dpa.avps,
            }),
            None => Err(diam_protocol::ParseError::MissingResultCode.into()),
        }
    }

    /// First caller wins; later calls return `false` and change nothing.
    pub(crate) fn shutdown(&self, reason: CloseReason) -> bool {
        if !self.inner.closed.fire(reason.clone()) {
            return false;
        }
        // Dropping the waiters wakes every procedure with a closed error.
        self.inner.pending.clear();
        *self.inner.watchdog_state.lock() = WatchdogState::Closed;
        match &reason {
            CloseReason::Local | CloseReason::PeerDisconnect(_) => {
                tracing::info!(peer = %self.inner.peer_addr, reason = %reason, "connection closed");
            }
            _ => {
                tracing::warn!(peer = %self.inner.peer_addr, reason = %reason, "connection closed");
            }
        }
        true
    }

    fn close_reason(&self) -> CloseReason {
        self.inner.closed.get().unwrap_or(CloseReason::Local)
    }

    // ── Procedure plumbing ───────────────────────────────────────────

    pub(crate) fn pending(&self) -> &Pending {
        &self.inner.pending
    }

    pub(crate) fn set_handshake_state(&self, state: HandshakeState) {
        *self.inner.handshake_state.lock() = state;
    }

    /// Ignored once closed: `Closed` is terminal.
    pub(crate) fn set_watchdog_state(&self, state: WatchdogState) {
        let mut current = self.inner.watchdog_state.lock();
        if *current != WatchdogState::Closed {
            *current = state;
        }
    }

    /// Mark the handshake done and fire both handshake signals.
    pub(crate) fn mark_established(&self, caps: PeerCapabilities) {
        self.set_handshake_state(HandshakeState::Established);
        self.inner.machine.mark_established(&caps);
        self.inner.handshake.fire(caps);
    }

    pub(crate) fn publish_report(&self, report: WatchdogReport) {
        self.inner.reports.send_replace(Some(report));
    }

    fn route(&self, msg: Message) {
        tracing::debug!(peer = %self.inner.peer_addr, msg = %msg, "received");
        if msg.is_request() {
            self.dispatch(msg);
            return;
        }
        if let Err(unclaimed) = self.inner.pending.for_answer(&msg).complete(msg) {
            self.dispatch(unclaimed);
        }
    }

    fn dispatch(&self, msg: Message) {
        let conn = self.clone();
        tokio::spawn(async move {
            let machine = Arc::clone(&conn.inner.machine);
            if let Some(answer) = machine.dispatch(&conn, msg).await {
                if let Err(e) = conn.send(answer).await {
                    tracing::debug!(peer = %conn.inner.peer_addr, error = %e, "answer not sent");
                }
            }
        });
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.inner.peer_addr)
            .field("local_addr", &self.inner.local_addr)
            .field("origin_state_id", &self.inner.options.origin_state_id)
            .field("handshake_state", &self.handshake_state())
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

// ── Transport tasks ──────────────────────────────────────────────────

async fn write_loop<S>(
    conn: Connection,
    mut sink: SplitSink<Framed<S, DiameterCodec>, Message>,
    mut outbound: mpsc::Receiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let closed = conn.on_close();
    loop {
        tokio::select! {
            biased;
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = sink.send(msg).await {
                    conn.shutdown(CloseReason::Transport(e.to_string()));
                    break;
                }
            }
            _ = closed.wait() => {
                // Flush what was queued before the close, e.g. a DPA.
                while let Ok(msg) = outbound.try_recv() {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = sink.close().await;
}

async fn read_loop<S>(conn: Connection, mut stream: SplitStream<Framed<S, DiameterCodec>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let closed = conn.on_close();
    loop {
        let next = tokio::select! {
            _ = closed.wait() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(msg)) => conn.route(msg),
            Some(Err(e)) => {
                conn.shutdown(CloseReason::Transport(e.to_string()));
                break;
            }
            None => {
                conn.shutdown(CloseReason::Eof);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlator_hands_answer_to_waiter() {
        let c = Correlator::default();
        let mut rx = c.register(7);
        let mut answer = Message::request(command::DEVICE_WATCHDOG, 0).answer(2001);
        answer.header.hop_by_hop = 7;
        assert!(c.complete(answer).is_ok());
        assert_eq!(rx.try_recv().unwrap().hop_by_hop(), 7);
    }

    #[test]
    fn correlator_returns_unclaimed_answers() {
        let c = Correlator::default();
        let _rx = c.register(1);
        let mut answer = Message::request(command::DEVICE_WATCHDOG, 0).answer(2001);
        answer.header.hop_by_hop = 2;
        assert!(c.complete(answer).is_err());
    }

    #[test]
    fn reregistering_replaces_the_waiter() {
        let c = Correlator::default();
        let mut first = c.register(5);
        let mut second = c.register(5);
        assert!(first.try_recv().is_err());
        let mut answer = Message::request(command::CAPABILITIES_EXCHANGE, 0).answer(2001);
        answer.header.hop_by_hop = 5;
        c.complete(answer).unwrap();
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn pending_routes_by_command() {
        let p = Pending::default();
        let mut rx = p.watchdog.register(9);
        let mut cea = Message::request(command::CAPABILITIES_EXCHANGE, 0).answer(2001);
        cea.header.hop_by_hop = 9;
        assert!(p.for_answer(&cea).complete(cea.clone()).is_err());
        let mut dwa = Message::request(command::DEVICE_WATCHDOG, 0).answer(2001);
        dwa.header.hop_by_hop = 9;
        p.for_answer(&dwa).complete(dwa).unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
