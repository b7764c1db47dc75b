//! Mini peer: an in-process Diameter server on an ephemeral port that
//! answers through a test-supplied closure, records everything it receives
//! and can push requests to the client.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use diam_peer_sdk::protocol::dict::{avp as code, command, result_code};
use diam_peer_sdk::protocol::{Avp, DiameterCodec, Message};
use diam_peer_sdk::{ClientBuilder, Settings, StateMachine};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;

pub const SERVER_HOST: &str = "server.example.org";
pub const REALM: &str = "example.org";
pub const CLIENT_HOST: &str = "client.example.org";

/// Called for every inbound message with the number of messages seen so far
/// for the same command and direction (1-based).  `None` means stay silent.
pub type Responder = Arc<dyn Fn(&Message, u32) -> Option<Message> + Send + Sync>;

pub struct MiniPeer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Message>>>,
    inject: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

impl MiniPeer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Message, u32) -> Option<Message> + Send + Sync + 'static,
    {
        Self::start_with(None, Arc::new(responder)).await
    }

    pub async fn start_tls<F>(acceptor: TlsAcceptor, responder: F) -> Self
    where
        F: Fn(&Message, u32) -> Option<Message> + Send + Sync + 'static,
    {
        Self::start_with(Some(acceptor), Arc::new(responder)).await
    }

    async fn start_with(acceptor: Option<TlsAcceptor>, responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (inject_tx, inject_rx) = mpsc::channel(16);

        let log = received.clone();
        let task = tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            match acceptor {
                Some(acceptor) => {
                    if let Ok(tls) = acceptor.accept(tcp).await {
                        serve(tls, responder, log, inject_rx).await;
                    }
                }
                None => serve(tcp, responder, log, inject_rx).await,
            }
        });

        Self {
            addr,
            received,
            inject: inject_tx,
            task,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// How many messages named `name` (`"CER"`, `"DWA"`, ...) arrived.
    pub fn count(&self, name: &str) -> usize {
        self.received.lock().iter().filter(|m| m.name() == name).count()
    }

    /// Push a message to the client.
    pub async fn inject(&self, msg: Message) {
        self.inject.send(msg).await.unwrap();
    }

    /// Poll until a received message matches, or panic after 2 s.
    pub async fn wait_for(&self, pred: impl Fn(&Message) -> bool) -> Message {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(m) = self.received.lock().iter().find(|m| pred(m)).cloned() {
                return m;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "peer never received the expected message; got {:?}",
                self.received().iter().map(|m| m.name()).collect::<Vec<_>>()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Drop the transport so the client sees EOF.
    pub fn hang_up(&self) {
        self.task.abort();
    }
}

impl Drop for MiniPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(
    stream: S,
    responder: Responder,
    received: Arc<Mutex<Vec<Message>>>,
    mut inject: mpsc::Receiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, DiameterCodec::default());
    let mut seen: HashMap<(u32, bool), u32> = HashMap::new();
    loop {
        tokio::select! {
            next = framed.next() => {
                let Some(Ok(msg)) = next else { return };
                received.lock().push(msg.clone());
                let n = seen.entry((msg.command_code(), msg.is_request())).or_default();
                *n += 1;
                if let Some(reply) = responder(&msg, *n) {
                    if framed.send(reply).await.is_err() {
                        return;
                    }
                }
            }
            Some(msg) = inject.recv() => {
                if framed.send(msg).await.is_err() {
                    return;
                }
            }
        }
    }
}

// ── Canned answers ───────────────────────────────────────────────────

fn is_application(avp: &Avp) -> bool {
    matches!(
        avp.code,
        code::AUTH_APPLICATION_ID | code::ACCT_APPLICATION_ID | code::VENDOR_SPECIFIC_APPLICATION_ID
    )
}

/// CEA echoing the CER's Origin-State-Id and applications.
pub fn cea(cer: &Message, rc: u32) -> Message {
    let mut a = cer
        .answer(rc)
        .with(Avp::identity(code::ORIGIN_HOST, SERVER_HOST))
        .with(Avp::identity(code::ORIGIN_REALM, REALM));
    if let Some(osid) = cer.find(code::ORIGIN_STATE_ID) {
        a.push(osid.clone());
    }
    a.avps.extend(cer.avps.iter().filter(|avp| is_application(avp)).cloned());
    a
}

/// DWA echoing the DWR's Origin-State-Id.
pub fn dwa(dwr: &Message, rc: u32) -> Message {
    let mut a = dwr
        .answer(rc)
        .with(Avp::identity(code::ORIGIN_HOST, SERVER_HOST))
        .with(Avp::identity(code::ORIGIN_REALM, REALM));
    if let Some(osid) = dwr.find(code::ORIGIN_STATE_ID) {
        a.push(osid.clone());
    }
    a
}

pub fn dpa(dpr: &Message) -> Message {
    dpr.answer(result_code::SUCCESS)
        .with(Avp::identity(code::ORIGIN_HOST, SERVER_HOST))
        .with(Avp::identity(code::ORIGIN_REALM, REALM))
}

/// A well-behaved peer: answers CER, DWR and DPR with success.
pub fn compliant(msg: &Message, _n: u32) -> Option<Message> {
    if !msg.is_request() {
        return None;
    }
    match msg.command_code() {
        command::CAPABILITIES_EXCHANGE => Some(cea(msg, result_code::SUCCESS)),
        command::DEVICE_WATCHDOG => Some(dwa(msg, result_code::SUCCESS)),
        command::DISCONNECT_PEER => Some(dpa(msg)),
        _ => None,
    }
}

/// A request from the peer side, with fixed identifiers.
pub fn peer_request(command_code: u32, application_id: u32, hop_by_hop: u32) -> Message {
    let mut m = Message::request(command_code, application_id)
        .with(Avp::identity(code::ORIGIN_HOST, SERVER_HOST))
        .with(Avp::identity(code::ORIGIN_REALM, REALM));
    m.header.hop_by_hop = hop_by_hop;
    m.header.end_to_end = hop_by_hop;
    m
}

pub fn settings() -> Settings {
    Settings::builder(CLIENT_HOST, REALM)
        .acct_application_id(3)
        .build()
}

pub fn state_machine() -> Arc<StateMachine> {
    Arc::new(StateMachine::new(settings()))
}

/// Builder with the watchdog off so tests only see the traffic they drive.
pub fn quiet_client(sm: Arc<StateMachine>) -> ClientBuilder {
    ClientBuilder::new().handler(sm).enable_watchdog(false)
}

/// Await `fut` or panic after `ms` milliseconds.
pub async fn within<T>(ms: u64, fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_millis(ms), fut)
        .await
        .expect("timed out")
}
