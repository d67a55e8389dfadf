//! SOCKS5 (RFC 1928) framing shared by both hops: method negotiation and the
//! CONNECT request, plus their replies.

pub mod address;
pub mod auth;
pub mod commands;
pub mod frame;
pub mod protocol;

pub use address::Address;
pub use auth::{NegotiationRequest, build_negotiation_reply, parse_negotiation};
pub use commands::{ConnectRequest, build_connect_reply, parse_connect_request};
pub use protocol::{ProtocolError, ReplyCode};
