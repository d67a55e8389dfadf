use crate::socks5::address::Address;
use crate::socks5::protocol::{AddressType, Command, ProtocolError, RSV, ReplyCode, Version};

/// ConnectRequest is a parsed SOCKS5 CONNECT request
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    address: Address,
    port: u16,
}

/// ConnectRequest implementation block
impl ConnectRequest {
    /// new builds a request, rejecting domains that don't fit a length octet
    pub fn new(address: Address, port: u16) -> Result<Self, ProtocolError> {
        if let Address::DomainName(domain) = &address {
            if domain.len() > u8::MAX as usize {
                return Err(ProtocolError::MalformedRequest("domain longer than 255 bytes"));
            }
        }

        Ok(Self { address, port })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// host is the routing key for this request
    pub fn host(&self) -> String {
        self.address.host()
    }

    /// target formats the destination as a dialable "host:port" string
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// encode produces the wire form of the request
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![Version::SOCKS5 as u8, Command::Connect as u8, RSV];
        self.address.write_to(&mut frame);
        frame.extend_from_slice(&self.port.to_be_bytes());
        frame
    }
}

/// parse_connect_request parses a complete request frame. Only CONNECT is
/// accepted.
pub fn parse_connect_request(frame: &[u8]) -> Result<ConnectRequest, ProtocolError> {
    let (command, address, port) = parse_frame(frame)?;

    match Command::from_byte(command) {
        Some(Command::Connect) => ConnectRequest::new(address, port),
        _ => Err(ProtocolError::UnsupportedCommand(command)),
    }
}

/// build_connect_reply builds a reply carrying `status`. The bound address is
/// not meaningful to either hop, so it is zero-filled.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn build_connect_reply(status: ReplyCode) -> Vec<u8> {
    let mut reply = vec![
        Version::SOCKS5 as u8,
        status as u8,
        RSV,
        AddressType::IPv4 as u8,
    ];
    reply.extend_from_slice(&[0, 0, 0, 0]);
    reply.extend_from_slice(&0u16.to_be_bytes());
    reply
}

/// parse_connect_reply validates a reply received from an upstream server and
/// returns its status byte
pub fn parse_connect_reply(frame: &[u8]) -> Result<u8, ProtocolError> {
    let (status, _, _) = parse_frame(frame)?;
    Ok(status)
}

/// parse_frame splits a request or reply frame into its second byte (command
/// or status), address and port
fn parse_frame(frame: &[u8]) -> Result<(u8, Address, u16), ProtocolError> {
    if frame.len() < 4 {
        return Err(ProtocolError::MalformedRequest("request frame too short"));
    }

    // Ensure version is 0x05 -> SOCKS5
    if frame[0] != Version::SOCKS5 as u8 {
        return Err(ProtocolError::UnsupportedVersion(frame[0]));
    }

    // Not checking RSV (RESERVED) -> 0x00
    let mut offset = 3;
    let (address, port) = Address::parse(frame, &mut offset)?;

    if offset != frame.len() {
        return Err(ProtocolError::MalformedRequest("trailing bytes after port"));
    }

    Ok((frame[1], address, port))
}
