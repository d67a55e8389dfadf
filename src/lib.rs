//! A split-routing SOCKS5 proxy
//!
//! Two halves share this library:
//!
//! - **ingress**: a local SOCKS5 listener. Allow-listed destinations are
//!   dialed directly; everything else is tunnelled to the relay by replaying
//!   the client's handshake over an obfuscated connection.
//! - **relay**: the remote end. Accepts the obfuscated SOCKS5 variant and
//!   dials destinations itself.
//!
//! - Features:
//!     - CONNECT
//!     - No Authentication
//!     - Substring allow-list routing: direct, relay or discard
//!     - Shift or permutation byte substitution on the relay hop
//!     - Optional dial and handshake deadlines
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! The relay hop is obfuscated, not encrypted: the substitution tables are
//! derived from a passphrase sum and provide no confidentiality or integrity.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use splitsocks::{Ingress, Method, Server, TableCipher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cipher = Arc::new(TableCipher::new(Method::Permutation, "passphrase")?);
//!     let ingress = Ingress::new("relay.example.net:8388", cipher);
//!     let mut server = Server::new("127.0.0.1:1080", ingress);
//!     server.run().await
//! }
//! ```

pub mod cipher;
pub mod connect;
pub mod duplex;
pub mod ingress;
pub mod relay;
pub mod routing;
pub mod server;
pub mod socks5;

// Re-export main types at crate root for convenience
pub use cipher::{Cipher, CipherError, Method, Pass, TableCipher};
pub use connect::{Connector, TcpConnector, Timeouts};
pub use ingress::Ingress;
pub use relay::Relay;
pub use routing::{Route, Router};
pub use server::{Server, SessionHandler};
