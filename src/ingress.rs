//! The local SOCKS5 listener. Plain SOCKS5 toward the client; destinations are
//! dialed directly, discarded, or reached through the upstream relay.

use crate::cipher::{Cipher, Pass};
use crate::connect::{Connector, TcpConnector, Timeouts, within};
use crate::duplex;
use crate::routing::{Route, Router};
use crate::server::SessionHandler;
use crate::socks5::auth::{build_negotiation_reply, parse_negotiation, parse_negotiation_reply};
use crate::socks5::commands::{
    ConnectRequest, build_connect_reply, parse_connect_reply, parse_connect_request,
};
use crate::socks5::frame::{read_connect, read_method_reply, read_negotiation, write_frame};
use crate::socks5::protocol::{ProtocolError, ReplyCode};
use anyhow::{Context, Result, bail};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Handshake is what the client sent, kept verbatim for replay to the relay
#[derive(Debug)]
pub struct Handshake {
    pub negotiation: Vec<u8>,
    pub request_frame: Vec<u8>,
    pub request: ConnectRequest,
}

/// Ingress holds everything a client session needs
pub struct Ingress<C = TcpConnector> {
    relay_addr: String,
    cipher: Arc<dyn Cipher>,
    router: Router,
    connector: C,
    timeouts: Timeouts,
}

/// Ingress implementation block
impl Ingress<TcpConnector> {
    /// new builds an ingress forwarding to `relay_addr` with the default
    /// allow-list
    pub fn new(relay_addr: impl Into<String>, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            cipher,
            router: Router::default(),
            connector: TcpConnector,
            timeouts: Timeouts::default(),
        }
    }
}

impl<C: Connector> Ingress<C> {
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// with_connector swaps the dialer used for destinations and the relay
    pub fn with_connector<D: Connector>(self, connector: D) -> Ingress<D> {
        Ingress {
            relay_addr: self.relay_addr,
            cipher: self.cipher,
            router: self.router,
            connector,
            timeouts: self.timeouts,
        }
    }

    /// run_session walks one client from handshake to close
    async fn run_session(&self, mut client: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let handshake = within(self.timeouts.handshake, accept_handshake(&mut client))
            .await
            .context("[ERR] client handshake failed")?;

        let target = handshake.request.target();
        let session = format!("{peer_addr} -> {target}");

        match self.router.classify(&handshake.request.host()) {
            Route::Discard => {
                warn!("[{}] discarded", session);
                Ok(())
            }
            Route::Direct => {
                info!("[{}] direct", session);

                let outbound = self
                    .dial(&target)
                    .await
                    .with_context(|| format!("[ERR] failed to connect to {target}"))?;

                duplex::relay(client, outbound, Pass::Plain, Pass::Plain)
                    .await
                    .log(&session);
                Ok(())
            }
            Route::Relay => {
                info!("[{}] via relay {}", session, self.relay_addr);

                let relay_addr = &self.relay_addr;
                let mut upstream = self
                    .dial(relay_addr)
                    .await
                    .with_context(|| format!("[ERR] failed to connect to relay {relay_addr}"))?;

                within(self.timeouts.handshake, self.replay_handshake(&mut upstream, &handshake))
                    .await
                    .with_context(|| format!("[ERR] relay handshake for {target} failed"))?;

                let cipher = self.cipher.as_ref();
                duplex::relay(client, upstream, Pass::Encode(cipher), Pass::Decode(cipher))
                    .await
                    .log(&session);
                Ok(())
            }
        }
    }

    async fn dial(&self, target: &str) -> std::io::Result<TcpStream> {
        within(self.timeouts.dial, self.connector.connect(target)).await
    }

    /// replay_handshake repeats the client's two frames to the relay, encoded,
    /// and checks that the relay accepted both
    async fn replay_handshake(
        &self,
        upstream: &mut TcpStream,
        handshake: &Handshake,
    ) -> Result<()> {
        let cipher = self.cipher.as_ref();

        write_frame(upstream, &handshake.negotiation, Pass::Encode(cipher)).await?;
        let reply = read_method_reply(upstream, Pass::Decode(cipher)).await?;
        parse_negotiation_reply(&reply).context("[ERR] relay rejected negotiation")?;

        write_frame(upstream, &handshake.request_frame, Pass::Encode(cipher)).await?;
        let reply = read_connect(upstream, Pass::Decode(cipher)).await?;
        let status = parse_connect_reply(&reply)?;
        if status != ReplyCode::Succeeded as u8 {
            bail!("[ERR] relay refused the request with status {status:#04x}");
        }

        debug!("relay accepted {}", handshake.request.target());
        Ok(())
    }
}

impl<C: Connector> SessionHandler for Ingress<C> {
    fn handle(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send {
        self.run_session(stream, peer_addr)
    }
}

/// accept_handshake runs negotiation and the CONNECT request with the client.
/// Both frames are answered with success as soon as they parse; a frame that
/// doesn't parse closes the connection without a reply.
pub async fn accept_handshake(client: &mut TcpStream) -> Result<Handshake, ProtocolError> {
    let negotiation = read_negotiation(client, Pass::Plain).await?;
    let reply = build_negotiation_reply(&parse_negotiation(&negotiation)?)?;
    write_frame(client, &reply, Pass::Plain).await?;

    let request_frame = read_connect(client, Pass::Plain).await?;
    let request = parse_connect_request(&request_frame)?;
    write_frame(client, &build_connect_reply(ReplyCode::Succeeded), Pass::Plain).await?;

    Ok(Handshake {
        negotiation,
        request_frame,
        request,
    })
}
