use crate::socks5::protocol::{AddressType, ProtocolError};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Address represents a network address or domain to be used as the
/// SOCKS5 target address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4(Ipv4Addr),
    DomainName(String),
    IPv6(Ipv6Addr),
}

/// Address implementation block
impl Address {
    /// address_type returns the ATYP byte describing this address
    pub fn address_type(&self) -> AddressType {
        match self {
            Address::IPv4(_) => AddressType::IPv4,
            Address::DomainName(_) => AddressType::DomainName,
            Address::IPv6(_) => AddressType::IPv6,
        }
    }

    /// host returns the bare host string used for routing decisions
    pub fn host(&self) -> String {
        match self {
            Address::IPv4(ip) => ip.to_string(),
            Address::DomainName(domain) => domain.clone(),
            Address::IPv6(ip) => ip.to_string(),
        }
    }

    /// write_to appends ATYP and the address bytes to a frame
    pub(crate) fn write_to(&self, frame: &mut Vec<u8>) {
        frame.push(self.address_type() as u8);
        match self {
            Address::IPv4(ip) => frame.extend_from_slice(&ip.octets()),
            Address::DomainName(domain) => {
                // Length is a single octet on the wire
                frame.push(domain.len() as u8);
                frame.extend_from_slice(domain.as_bytes());
            }
            Address::IPv6(ip) => frame.extend_from_slice(&ip.octets()),
        }
    }

    /// parse reads ATYP, the address and the port from `data`, starting at
    /// `offset`, and advances `offset` past the port
    pub fn parse(data: &[u8], offset: &mut usize) -> Result<(Self, u16), ProtocolError> {
        let atyp = *data
            .get(*offset)
            .ok_or(ProtocolError::MalformedRequest("missing address type"))?;
        *offset += 1;

        let address = match AddressType::from_byte(atyp) {
            Some(AddressType::IPv4) => {
                let octets: [u8; 4] = take(data, offset, 4)?
                    .try_into()
                    .map_err(|_| ProtocolError::MalformedRequest("invalid IPv4 bytes"))?;
                Address::IPv4(Ipv4Addr::from(octets))
            }
            Some(AddressType::DomainName) => {
                // First octet in DomainName contains the number of
                // octets to follow
                let len = take(data, offset, 1)?[0] as usize;
                let domain = take(data, offset, len)?;
                let domain = String::from_utf8(domain.to_vec())
                    .map_err(|_| ProtocolError::MalformedRequest("domain is not valid UTF-8"))?;
                Address::DomainName(domain)
            }
            Some(AddressType::IPv6) => {
                let octets: [u8; 16] = take(data, offset, 16)?
                    .try_into()
                    .map_err(|_| ProtocolError::MalformedRequest("invalid IPv6 bytes"))?;
                Address::IPv6(Ipv6Addr::from(octets))
            }
            None => return Err(ProtocolError::UnsupportedAddressType(atyp)),
        };

        // Grab port -> BigEndian (network order)
        let port = take(data, offset, 2)?;
        let port = u16::from_be_bytes([port[0], port[1]]);

        Ok((address, port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::IPv4(ip) => write!(f, "{ip}"),
            Address::DomainName(domain) => write!(f, "{domain}"),
            // Bracketed so that "host:port" stays dialable
            Address::IPv6(ip) => write!(f, "[{ip}]"),
        }
    }
}

/// take returns the next `len` bytes of `data` and advances `offset`
fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], ProtocolError> {
    let end = *offset + len;
    if end > data.len() {
        return Err(ProtocolError::MalformedRequest("truncated address"));
    }

    let bytes = &data[*offset..end];
    *offset = end;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_with_port() {
        let data = [0x01, 10, 0, 0, 1, 0x1f, 0x90];
        let mut offset = 0;
        let (addr, port) = Address::parse(&data, &mut offset).unwrap();

        assert_eq!(addr, Address::IPv4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(port, 8080);
        assert_eq!(offset, data.len());
    }

    #[test]
    fn ipv6_displays_bracketed() {
        let addr = Address::IPv6(Ipv6Addr::LOCALHOST);
        assert_eq!(addr.to_string(), "[::1]");
        assert_eq!(addr.host(), "::1");
    }

    #[test]
    fn rejects_truncated_domain() {
        // Claims 11 octets, carries 3
        let data = [0x03, 11, b'e', b'x', b'a'];
        let mut offset = 0;
        assert!(matches!(
            Address::parse(&data, &mut offset),
            Err(ProtocolError::MalformedRequest(_))
        ));
    }

    #[test]
    fn rejects_unknown_address_type() {
        let data = [0x02, 0, 0];
        let mut offset = 0;
        assert!(matches!(
            Address::parse(&data, &mut offset),
            Err(ProtocolError::UnsupportedAddressType(0x02))
        ));
    }
}
