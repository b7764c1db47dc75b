//! Dialing: open the transport, run the capabilities exchange, start the
//! watchdog.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use diam_protocol::Applications;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::connection::{Connection, ConnectionOptions};
use crate::handshake::{self, Advertised};
use crate::ids;
use crate::registry::StateMachine;
use crate::retransmit::RetransmitPolicy;
use crate::tls::TlsCredentials;
use crate::types::{CloseReason, Error};
use crate::watchdog;

/// A configured Diameter client.  One client can dial many peers.
///
/// Create via [`ClientBuilder`](crate::builder::ClientBuilder).
pub struct Client {
    pub(crate) handler: Option<Arc<StateMachine>>,
    pub(crate) applications: Applications,
    pub(crate) supported_vendor_ids: Vec<u32>,
    pub(crate) retransmit: RetransmitPolicy,
    pub(crate) enable_watchdog: bool,
    pub(crate) watchdog_interval: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) answer_timeout: Duration,
    pub(crate) max_message_bytes: usize,
}

impl Client {
    /// Start a new builder.
    pub fn builder() -> crate::builder::ClientBuilder {
        crate::builder::ClientBuilder::new()
    }

    /// Connect over TCP and complete the capabilities exchange.
    ///
    /// Returns an established connection or an error, never both; on error
    /// nothing is left open.
    pub async fn dial(&self, addr: &str) -> Result<Connection, Error> {
        let (machine, advertised) = self.prepare()?;
        tracing::info!(peer = %addr, "dialing");

        let stream = self.within_connect_timeout(TcpStream::connect(addr)).await?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        self.establish(stream, peer_addr, local_addr, machine, advertised)
            .await
    }

    /// Like [`dial`](Self::dial), with the transport wrapped in TLS.
    pub async fn dial_tls(&self, addr: &str, tls: &TlsCredentials) -> Result<Connection, Error> {
        let (machine, advertised) = self.prepare()?;
        let server_name = tls.server_name(addr)?;
        let connector = tls.connector()?;
        tracing::info!(peer = %addr, "dialing (tls)");

        let tcp = self.within_connect_timeout(TcpStream::connect(addr)).await?;
        let peer_addr = tcp.peer_addr()?;
        let local_addr = tcp.local_addr()?;
        let stream = self
            .within_connect_timeout(connector.connect(server_name, tcp))
            .await
            .map_err(tls_error)?;
        self.establish(stream, peer_addr, local_addr, machine, advertised)
            .await
    }

    /// Preconditions checked before any I/O.
    fn prepare(&self) -> Result<(Arc<StateMachine>, Advertised), Error> {
        let machine = self.handler.clone().ok_or(Error::MissingStateMachine)?;
        let advertised = Advertised::resolve(
            machine.settings(),
            &self.applications,
            &self.supported_vendor_ids,
        )?;
        Ok((machine, advertised))
    }

    async fn within_connect_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = io::Result<T>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.connect_timeout, fut).await {
            Ok(res) => res.map_err(Error::Io),
            Err(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.connect_timeout),
            ))),
        }
    }

    async fn establish<S>(
        &self,
        stream: S,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        machine: Arc<StateMachine>,
        advertised: Advertised,
    ) -> Result<Connection, Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let origin_state_id = machine
            .settings()
            .origin_state_id
            .unwrap_or_else(ids::next_origin_state_id);
        let conn = Connection::spawn(
            stream,
            peer_addr,
            local_addr,
            machine,
            ConnectionOptions {
                origin_state_id,
                answer_timeout: self.answer_timeout,
                max_message_bytes: self.max_message_bytes,
            },
        );

        match handshake::run(&conn, &advertised, self.retransmit).await {
            Ok(_) => {
                if self.enable_watchdog {
                    watchdog::spawn(conn.clone(), self.watchdog_interval, self.retransmit);
                }
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "handshake failed");
                conn.shutdown(CloseReason::HandshakeFailed);
                Err(e)
            }
        }
    }
}

impl Default for Client {
    /// A client with default timings and no handler.
    fn default() -> Self {
        crate::builder::ClientBuilder::new().into_client()
    }
}

/// Surface the rustls error when the handshake failed at the TLS layer.
fn tls_error(err: Error) -> Error {
    let Error::Io(io) = err else { return err };
    if let Some(tls) = io.get_ref().and_then(|e| e.downcast_ref::<rustls::Error>()) {
        return Error::Tls(tls.clone());
    }
    Error::Io(io)
}
