use anyhow::{Result, anyhow, bail};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

/// Pause after a failed accept (EMFILE and friends persist)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// SessionHandler drives one accepted connection from handshake to close
pub trait SessionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Server accepts connections and hands each one to its handler on a task of
/// its own
pub struct Server<H> {
    pub listen_addr: String,
    handler: Arc<H>,
    listener: Option<TcpListener>,
}

/// Server implementation block
impl<H: SessionHandler> Server<H> {
    /// new is a constructor for the Server type
    pub fn new(listen_addr: impl Into<String>, handler: H) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            handler: Arc::new(handler),
            listener: None,
        }
    }

    /// bind to the listen address and return the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("[ERR] {} is already bound", self.listen_addr);
        }

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|e| anyhow!("[ERR] failed to bind {}: {e}", self.listen_addr))?;
        let addr = listener.local_addr()?;

        info!("listening on {}", addr);

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run serves incoming connections forever. It only returns if binding
    /// fails; accept errors and session errors are logged and skipped.
    pub async fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("[ERR] listener missing after bind"))?;

        loop {
            // Accept incoming connection
            let (inbound, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);

            // Spawn async task
            tokio::spawn(async move {
                info!("new client: {}", peer_addr);

                if let Err(e) = handler.handle(inbound, peer_addr).await {
                    error!("[{}] session error: {:#}", peer_addr, e);
                }
            });
        }
    }
}
