//! Command dispatch table and the [`StateMachine`] that owns it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use diam_protocol::dict::{self, avp as code, command, result_code};
use diam_protocol::{Avp, DisconnectRequest, Message, WatchdogRequest};
use parking_lot::RwLock;

use crate::connection::Connection;
use crate::settings::Settings;
use crate::signal::Signal;
use crate::types::{CloseReason, PeerCapabilities};

/// Implement this trait to handle inbound messages for a command.
///
/// Requests should return the answer to send back; answers that reach a
/// handler were not claimed by any pending exchange and the return value is
/// ignored.
///
/// # Example
///
/// ```rust,no_run
/// use diam_peer_sdk::{Connection, Handler};
/// use diam_peer_sdk::protocol::Message;
///
/// struct Accounting;
///
/// #[async_trait::async_trait]
/// impl Handler for Accounting {
///     async fn handle(&self, conn: &Connection, msg: Message) -> Option<Message> {
///         Some(conn.settings().answer(&msg, 2001))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, conn: &Connection, msg: Message) -> Option<Message>;
}

/// Dispatch key: command code plus the request bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub code: u32,
    pub request: bool,
}

impl CommandKey {
    pub fn request(code: u32) -> Self {
        Self {
            code,
            request: true,
        }
    }

    pub fn answer(code: u32) -> Self {
        Self {
            code,
            request: false,
        }
    }

    pub fn of(msg: &Message) -> Self {
        Self {
            code: msg.command_code(),
            request: msg.is_request(),
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&dict::command_name(self.code, self.request))
    }
}

/// The client-side peer state machine.
///
/// Holds the node [`Settings`], a command → handler table shared by every
/// connection dialed through it, and a handshake signal that fires when the
/// first of those connections is established.  DWR and DPR handlers are
/// registered on construction; [`handle`](Self::handle) can replace them.
pub struct StateMachine {
    settings: Arc<Settings>,
    handlers: RwLock<HashMap<CommandKey, Arc<dyn Handler>>>,
    handshake: Signal<PeerCapabilities>,
}

impl StateMachine {
    pub fn new(settings: impl Into<Arc<Settings>>) -> Self {
        let sm = Self {
            settings: settings.into(),
            handlers: RwLock::new(HashMap::new()),
            handshake: Signal::new(),
        };
        sm.handle(CommandKey::request(command::DEVICE_WATCHDOG), WatchdogResponder);
        sm.handle(CommandKey::request(command::DISCONNECT_PEER), DisconnectResponder);
        sm
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Register (or replace) the handler for `key`.
    pub fn handle<H: Handler>(&self, key: CommandKey, handler: H) -> &Self {
        self.handle_arc(key, Arc::new(handler))
    }

    pub fn handle_arc(&self, key: CommandKey, handler: Arc<dyn Handler>) -> &Self {
        self.handlers.write().insert(key, handler);
        self
    }

    pub fn has_handler(&self, key: CommandKey) -> bool {
        self.handlers.read().contains_key(&key)
    }

    /// Fires with the peer's capabilities when the first connection through
    /// this state machine completes its handshake.
    pub fn on_handshake_complete(&self) -> Signal<PeerCapabilities> {
        self.handshake.clone()
    }

    pub(crate) fn mark_established(&self, caps: &PeerCapabilities) {
        self.handshake.fire(caps.clone());
    }

    /// Run the handler for `msg`.  Unknown requests get a 3001 answer with
    /// the `E` bit set.
    pub(crate) async fn dispatch(&self, conn: &Connection, msg: Message) -> Option<Message> {
        let key = CommandKey::of(&msg);
        let handler = self.handlers.read().get(&key).cloned();
        match handler {
            Some(h) => h.handle(conn, msg).await,
            None if msg.is_request() => {
                tracing::warn!(
                    peer = %conn.peer_addr(),
                    command = %key,
                    "no handler registered, answering COMMAND_UNSUPPORTED"
                );
                let mut answer = self.settings.answer(&msg, result_code::COMMAND_UNSUPPORTED);
                answer.set_error();
                Some(answer)
            }
            None => {
                tracing::debug!(
                    peer = %conn.peer_addr(),
                    command = %key,
                    hop_by_hop = msg.hop_by_hop(),
                    "dropping unsolicited answer"
                );
                None
            }
        }
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.handlers.read().keys().map(|k| k.to_string()).collect();
        keys.sort();
        f.debug_struct("StateMachine")
            .field("origin_host", &self.settings.origin_host)
            .field("handlers", &keys)
            .finish()
    }
}

// ── Built-in handlers ────────────────────────────────────────────────

/// Answers the peer's DWR with our identity and Origin-State-Id.
struct WatchdogResponder;

#[async_trait::async_trait]
impl Handler for WatchdogResponder {
    async fn handle(&self, conn: &Connection, msg: Message) -> Option<Message> {
        let settings = conn.settings();
        let answer = match WatchdogRequest::parse(&msg) {
            Ok(dwr) => {
                tracing::debug!(peer = %conn.peer_addr(), origin_host = %dwr.origin_host, "answering DWR");
                settings
                    .answer(&msg, result_code::SUCCESS)
                    .with(Avp::mandatory(code::ORIGIN_STATE_ID, conn.origin_state_id()))
            }
            Err(e) => {
                tracing::warn!(peer = %conn.peer_addr(), error = %e, "malformed DWR");
                settings.answer(&msg, result_code::MISSING_AVP)
            }
        };
        Some(answer)
    }
}

/// Answers a DPR, then tears the connection down.
struct DisconnectResponder;

#[async_trait::async_trait]
impl Handler for DisconnectResponder {
    async fn handle(&self, conn: &Connection, msg: Message) -> Option<Message> {
        let cause = match DisconnectRequest::parse(&msg) {
            Ok(dpr) => dpr.cause,
            Err(e) => {
                tracing::warn!(peer = %conn.peer_addr(), error = %e, "malformed DPR");
                return Some(conn.settings().answer(&msg, result_code::MISSING_AVP));
            }
        };
        tracing::info!(peer = %conn.peer_addr(), cause = %cause, "peer requested disconnect");
        let dpa = conn.settings().answer(&msg, result_code::SUCCESS);
        // The writer flushes queued messages before closing the socket.
        if let Err(e) = conn.send(dpa).await {
            tracing::debug!(peer = %conn.peer_addr(), error = %e, "DPA not sent");
        }
        conn.shutdown(CloseReason::PeerDisconnect(cause));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl Handler for Echo {
        async fn handle(&self, _conn: &Connection, msg: Message) -> Option<Message> {
            Some(msg.answer(result_code::SUCCESS))
        }
    }

    #[test]
    fn builtin_handlers_are_registered() {
        let sm = StateMachine::new(Settings::default());
        assert!(sm.has_handler(CommandKey::request(command::DEVICE_WATCHDOG)));
        assert!(sm.has_handler(CommandKey::request(command::DISCONNECT_PEER)));
        assert!(!sm.has_handler(CommandKey::answer(command::DEVICE_WATCHDOG)));
    }

    #[test]
    fn handle_registers_and_replaces() {
        let sm = StateMachine::new(Settings::default());
        sm.handle(CommandKey::request(272), Echo)
            .handle(CommandKey::request(command::DEVICE_WATCHDOG), Echo);
        assert!(sm.has_handler(CommandKey::request(272)));
        assert_eq!(sm.handlers.read().len(), 3);
    }

    #[test]
    fn command_key_display() {
        assert_eq!(CommandKey::request(command::CAPABILITIES_EXCHANGE).to_string(), "CER");
        assert_eq!(CommandKey::answer(272).to_string(), "272A");
    }

    #[test]
    fn handshake_signal_fires_once() {
        let sm = StateMachine::new(Settings::default());
        let signal = sm.on_handshake_complete();
        assert!(!signal.is_fired());
        let caps = PeerCapabilities {
            origin_host: "server".into(),
            origin_realm: "realm".into(),
            result_code: result_code::SUCCESS,
            origin_state_id: 1,
            host_ip_addresses: vec![],
            vendor_id: None,
            product_name: None,
            applications: Default::default(),
        };
        sm.mark_established(&caps);
        let mut other = caps.clone();
        other.origin_host = "second".into();
        sm.mark_established(&other);
        assert_eq!(signal.get().map(|c| c.origin_host), Some("server".to_string()));
    }
}
