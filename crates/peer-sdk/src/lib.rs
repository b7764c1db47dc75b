//! `diam-peer-sdk`: client-side Diameter peer connections.
//!
//! A "peer" is the remote Diameter node this process dials.  This crate
//! owns everything between "I have an address" and "I have an established,
//! supervised connection": the Capabilities-Exchange handshake, the
//! Device-Watchdog, retransmission, disconnect handling and the
//! notifications applications wait on.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your application                                         │
//! │                                                           │
//! │   let settings = Settings::builder("me", "realm")         │
//! │       .acct_application_id(3)                             │
//! │       .build();                                           │
//! │   let sm = Arc::new(StateMachine::new(settings));         │
//! │   sm.handle(CommandKey::request(271), Accounting);        │
//! │                                                           │
//! │   let conn = Client::builder()                            │
//! │       .handler(sm.clone())                                │
//! │       .max_retransmits(3)                                 │
//! │       .build()?                                           │
//! │       .dial("peer:3868")                                  │
//! │       .await?;                                            │
//! │   conn.on_close().wait().await;                           │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow (hard-coded by the SDK)
//!
//! 1. Check a [`StateMachine`] is set and at least one application is
//!    advertised (no I/O yet)
//! 2. Open TCP, optionally wrap in TLS
//! 3. Send CER; resend the same CER on silence up to `max_retransmits`
//! 4. Validate the CEA: structure, Result-Code, echoed Origin-State-Id
//! 5. Established: fire the handshake signals, start the watchdog
//! 6. Main loop:
//!    - Answers complete the pending exchange with the same hop-by-hop id
//!    - Requests go to the handler registered for their command
//!    - DWR and DPR are answered by built-in handlers
//! 7. On close (local, DPR, EOF, transport error, watchdog expiry): fire
//!    the close signal once and drop every pending exchange

pub mod builder;
pub mod client;
pub mod connection;
mod handshake;
pub mod ids;
pub mod registry;
pub mod retransmit;
pub mod settings;
pub mod signal;
pub mod tls;
pub mod types;
mod watchdog;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ClientBuilder;
pub use client::Client;
pub use connection::Connection;
pub use registry::{CommandKey, Handler, StateMachine};
pub use retransmit::RetransmitPolicy;
pub use settings::{Settings, SettingsBuilder};
pub use signal::Signal;
pub use tls::TlsCredentials;
pub use types::{
    CloseReason, Error, HandshakeState, PeerCapabilities, WatchdogReport, WatchdogState,
};

// Re-export the wire model so applications never need to import
// diam-protocol directly.
pub use diam_protocol as protocol;
pub use diam_protocol::{DisconnectCause, Message, ParseError};
