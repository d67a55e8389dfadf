use crate::socks5::protocol::{AuthMethod, ProtocolError, Version};

/// NegotiationRequest is the client's method selection message
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRequest {
    pub methods: Vec<u8>,
}

/// Reply sent before closing when none of the offered methods is usable
pub const NEGOTIATION_REJECTED: [u8; 2] = [Version::SOCKS5 as u8, AuthMethod::NoAcceptable as u8];

/// parse_negotiation parses a complete method selection frame
pub fn parse_negotiation(frame: &[u8]) -> Result<NegotiationRequest, ProtocolError> {
    if frame.len() < 2 {
        return Err(ProtocolError::MalformedRequest("negotiation frame too short"));
    }

    // Ensure version is 0x05 -> SOCKS5
    if frame[0] != Version::SOCKS5 as u8 {
        return Err(ProtocolError::UnsupportedVersion(frame[0]));
    }

    let n_methods = frame[1] as usize;
    if frame.len() != 2 + n_methods {
        return Err(ProtocolError::MalformedRequest(
            "method count does not match frame length",
        ));
    }

    Ok(NegotiationRequest {
        methods: frame[2..].to_vec(),
    })
}

/// build_negotiation_reply selects a method for the request and returns the
/// reply frame
///
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
pub fn build_negotiation_reply(request: &NegotiationRequest) -> Result<[u8; 2], ProtocolError> {
    match select_auth_method(&request.methods) {
        AuthMethod::NoAcceptable => Err(ProtocolError::NoAcceptableMethod),
        method => Ok([Version::SOCKS5 as u8, method as u8]),
    }
}

/// parse_negotiation_reply validates a method selection reply received from
/// an upstream server and returns the selected method byte
pub fn parse_negotiation_reply(frame: &[u8]) -> Result<u8, ProtocolError> {
    match frame {
        [version, _] if *version != Version::SOCKS5 as u8 => {
            Err(ProtocolError::UnsupportedVersion(*version))
        }
        [_, method] if *method == AuthMethod::NoAuth as u8 => Ok(*method),
        [_, _] => Err(ProtocolError::NoAcceptableMethod),
        _ => Err(ProtocolError::MalformedRequest("negotiation reply must be 2 bytes")),
    }
}

/// select_auth_method takes the methods offered by the socks client and
/// returns the first preferred method among them
fn select_auth_method(client_methods: &[u8]) -> AuthMethod {
    // Preferred auth method order
    const PREFERRED_METHODS: &[AuthMethod] = &[AuthMethod::NoAuth];

    // Iterate through preferences in order. If there's a match
    // return it
    for &preferred in PREFERRED_METHODS {
        if client_methods.contains(&(preferred as u8)) {
            return preferred;
        }
    }

    AuthMethod::NoAcceptable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_no_auth_when_offered() {
        let request = parse_negotiation(&[0x05, 0x02, 0x02, 0x00]).unwrap();
        assert_eq!(request.methods, vec![0x02, 0x00]);
        assert_eq!(build_negotiation_reply(&request).unwrap(), [0x05, 0x00]);
    }

    #[test]
    fn rejects_when_no_auth_missing() {
        let request = parse_negotiation(&[0x05, 0x01, 0x02]).unwrap();
        assert!(matches!(
            build_negotiation_reply(&request),
            Err(ProtocolError::NoAcceptableMethod)
        ));
    }

    #[test]
    fn rejects_socks4() {
        assert!(matches!(
            parse_negotiation(&[0x04, 0x01, 0x00]),
            Err(ProtocolError::UnsupportedVersion(0x04))
        ));
    }

    #[test]
    fn rejects_short_method_list() {
        assert!(matches!(
            parse_negotiation(&[0x05, 0x03, 0x00]),
            Err(ProtocolError::MalformedRequest(_))
        ));
    }

    #[test]
    fn upstream_reply_must_pick_no_auth() {
        assert_eq!(parse_negotiation_reply(&[0x05, 0x00]).unwrap(), 0x00);
        assert!(parse_negotiation_reply(&NEGOTIATION_REJECTED).is_err());
        assert!(parse_negotiation_reply(&[0x05]).is_err());
    }
}
