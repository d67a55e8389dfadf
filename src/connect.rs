use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connector opens the outbound leg of a session: a destination, or the
/// upstream relay
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, target: &str) -> impl Future<Output = io::Result<TcpStream>> + Send;
}

/// TcpConnector resolves and dials "host:port" targets
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, target: &str) -> impl Future<Output = io::Result<TcpStream>> + Send {
        TcpStream::connect(target.to_string())
    }
}

/// Timeouts bound how long a session may take to get going. Once bytes are
/// being relayed no deadline applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    /// Per outbound dial
    pub dial: Option<Duration>,
    /// For the whole SOCKS5 handshake on one hop
    pub handshake: Option<Duration>,
}

/// within runs `fut` under an optional deadline, failing with
/// `io::ErrorKind::TimedOut` when it elapses
pub async fn within<F, T, E>(limit: Option<Duration>, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<io::Error>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed").into()),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn deadline_elapses() {
        let result: io::Result<()> = within(Some(Duration::from_millis(20)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn no_deadline_waits() {
        let result: io::Result<u8> = within(None, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn dials_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = within(Some(Duration::from_secs(5)), TcpConnector.connect(&addr.to_string()))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }
}
