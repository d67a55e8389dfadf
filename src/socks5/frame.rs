use crate::cipher::Pass;
use crate::socks5::protocol::{AddressType, ProtocolError, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// read_negotiation reads exactly one method selection frame, applying `pass`
/// to the bytes as they arrive. The returned bytes are the transformed frame.
pub async fn read_negotiation<S>(stream: &mut S, pass: Pass<'_>) -> Result<Vec<u8>, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    // VER, NMETHODS
    let mut frame = vec![0u8; 2];
    read_chunk(stream, &mut frame, pass).await?;
    check_version(frame[0])?;

    let n_methods = frame[1] as usize;
    read_tail(stream, &mut frame, n_methods, pass).await?;

    Ok(frame)
}

/// read_method_reply reads the 2 byte VER, METHOD answer to a negotiation
pub async fn read_method_reply<S>(stream: &mut S, pass: Pass<'_>) -> Result<[u8; 2], ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut reply = [0u8; 2];
    read_chunk(stream, &mut reply, pass).await?;
    Ok(reply)
}

/// read_connect reads exactly one request or reply frame. Both share the
/// VER, CMD/REP, RSV, ATYP, ADDR, PORT layout.
pub async fn read_connect<S>(stream: &mut S, pass: Pass<'_>) -> Result<Vec<u8>, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; 4];
    read_chunk(stream, &mut frame, pass).await?;
    check_version(frame[0])?;

    // Address length, followed by the 2 byte port
    let remaining = match AddressType::from_byte(frame[3]) {
        Some(AddressType::IPv4) => 4 + 2,
        Some(AddressType::IPv6) => 16 + 2,
        Some(AddressType::DomainName) => {
            read_tail(stream, &mut frame, 1, pass).await?;
            frame[4] as usize + 2
        }
        None => return Err(ProtocolError::UnsupportedAddressType(frame[3])),
    };
    read_tail(stream, &mut frame, remaining, pass).await?;

    Ok(frame)
}

/// write_frame applies `pass` to a copy of `frame` and writes it out whole
pub async fn write_frame<S>(
    stream: &mut S,
    frame: &[u8],
    pass: Pass<'_>,
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let mut out = frame.to_vec();
    pass.apply(&mut out);
    stream.write_all(&out).await?;
    Ok(())
}

fn check_version(version: u8) -> Result<(), ProtocolError> {
    if version != Version::SOCKS5 as u8 {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    Ok(())
}

/// read_tail grows `frame` by `len` bytes read from the stream
async fn read_tail<S>(
    stream: &mut S,
    frame: &mut Vec<u8>,
    len: usize,
    pass: Pass<'_>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let start = frame.len();
    frame.resize(start + len, 0);
    read_chunk(stream, &mut frame[start..], pass).await
}

async fn read_chunk<S>(
    stream: &mut S,
    chunk: &mut [u8],
    pass: Pass<'_>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(chunk).await {
        Ok(_) => {
            pass.apply(chunk);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::MalformedRequest("connection closed mid-frame"))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{Method, TableCipher};
    use crate::socks5::address::Address;
    use crate::socks5::commands::{ConnectRequest, parse_connect_request};

    #[tokio::test]
    async fn reads_one_negotiation_frame_and_no_more() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x05, 0x01, 0x00, 0xAA]).await.unwrap();

        let frame = read_negotiation(&mut server, Pass::Plain).await.unwrap();
        assert_eq!(frame, vec![0x05, 0x01, 0x00]);

        // The trailing byte belongs to the next frame
        let mut next = [0u8; 1];
        server.read_exact(&mut next).await.unwrap();
        assert_eq!(next, [0xAA]);
    }

    #[tokio::test]
    async fn decodes_an_obfuscated_request() {
        let cipher = TableCipher::new(Method::Permutation, "relay-secret").unwrap();
        let request =
            ConnectRequest::new(Address::DomainName("example.com".to_string()), 443).unwrap();

        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, &request.encode(), Pass::Encode(&cipher))
            .await
            .unwrap();

        let frame = read_connect(&mut server, Pass::Decode(&cipher)).await.unwrap();
        assert_eq!(frame, request.encode());
        assert_eq!(parse_connect_request(&frame).unwrap(), request);
    }

    #[tokio::test]
    async fn bad_version_is_rejected_before_reading_on() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x04, 0x01]).await.unwrap();

        assert!(matches!(
            read_negotiation(&mut server, Pass::Plain).await,
            Err(ProtocolError::UnsupportedVersion(0x04))
        ));
    }

    #[tokio::test]
    async fn eof_mid_frame_is_malformed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x05, 0x01, 0x00, 0x01, 127]).await.unwrap();
        drop(client);

        assert!(matches!(
            read_connect(&mut server, Pass::Plain).await,
            Err(ProtocolError::MalformedRequest(_))
        ));
    }
}
