//! The upstream relay. Speaks the obfuscated SOCKS5 variant to the ingress and
//! dials every destination itself.

use crate::cipher::{Cipher, Pass};
use crate::connect::{Connector, TcpConnector, Timeouts, within};
use crate::duplex;
use crate::server::SessionHandler;
use crate::socks5::auth::{NEGOTIATION_REJECTED, build_negotiation_reply, parse_negotiation};
use crate::socks5::commands::{ConnectRequest, build_connect_reply, parse_connect_request};
use crate::socks5::frame::{read_connect, read_negotiation, write_frame};
use crate::socks5::protocol::{ProtocolError, ReplyCode};
use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::info;

/// Relay holds everything an ingress session needs on the server side
pub struct Relay<C = TcpConnector> {
    cipher: Arc<dyn Cipher>,
    connector: C,
    timeouts: Timeouts,
}

/// Relay implementation block
impl Relay<TcpConnector> {
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self {
            cipher,
            connector: TcpConnector,
            timeouts: Timeouts::default(),
        }
    }
}

impl<C: Connector> Relay<C> {
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// with_connector swaps the dialer used for destinations
    pub fn with_connector<D: Connector>(self, connector: D) -> Relay<D> {
        Relay {
            cipher: self.cipher,
            connector,
            timeouts: self.timeouts,
        }
    }

    async fn run_session(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let cipher = self.cipher.as_ref();
        let (inbound, outbound) = (Pass::Decode(cipher), Pass::Encode(cipher));

        let request = within(self.timeouts.handshake, accept_handshake(&mut stream, cipher))
            .await
            .context("[ERR] ingress handshake failed")?;

        let target = request.target();
        let session = format!("{peer_addr} -> {target}");

        // Connect to target, then tell the ingress how it went
        let destination = match within(self.timeouts.dial, self.connector.connect(&target)).await {
            Ok(destination) => {
                let reply = build_connect_reply(ReplyCode::Succeeded);
                write_frame(&mut stream, &reply, outbound).await?;
                destination
            }
            Err(e) => {
                let reply_code = ReplyCode::from_io_error(&e);
                write_frame(&mut stream, &build_connect_reply(reply_code), outbound).await?;
                return Err(anyhow!("[ERR] failed to connect to {target}: {e}"));
            }
        };

        info!("[{}] connected", session);

        duplex::relay(stream, destination, inbound, outbound)
            .await
            .log(&session);
        Ok(())
    }
}

impl<C: Connector> SessionHandler for Relay<C> {
    fn handle(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send {
        self.run_session(stream, peer_addr)
    }
}

/// accept_handshake runs negotiation and reads the CONNECT request, decoding
/// everything read and encoding everything written. Rejections with a
/// canonical SOCKS5 answer get that answer before the error is returned.
async fn accept_handshake(
    stream: &mut TcpStream,
    cipher: &dyn Cipher,
) -> Result<ConnectRequest, ProtocolError> {
    let (inbound, outbound) = (Pass::Decode(cipher), Pass::Encode(cipher));

    let frame = read_negotiation(stream, inbound).await?;
    let reply = parse_negotiation(&frame).and_then(|request| build_negotiation_reply(&request));
    let reply = match reply {
        Ok(reply) => reply,
        Err(ProtocolError::NoAcceptableMethod) => {
            write_frame(stream, &NEGOTIATION_REJECTED, outbound).await?;
            return Err(ProtocolError::NoAcceptableMethod);
        }
        Err(e) => return Err(e),
    };
    write_frame(stream, &reply, outbound).await?;

    let request = read_connect(stream, inbound)
        .await
        .and_then(|frame| parse_connect_request(&frame));
    match request {
        Ok(request) => Ok(request),
        Err(e) => {
            if let Some(reply_code) = ReplyCode::failure_for(&e) {
                write_frame(stream, &build_connect_reply(reply_code), outbound).await?;
            }
            Err(e)
        }
    }
}
