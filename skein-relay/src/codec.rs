use async_trait::async_trait;
use futures::prelude::*;
use libp2p::swarm::StreamProtocol;
use skein_types::constants::MAX_MESSAGE_SIZE;
use std::io;

use crate::protocol::{ACK_BYTE, PROTOCOL_VERSION};

/// One encoded protocol message as carried on a stream.
///
/// The payload is opaque at this layer; it is decoded by the receiving
/// service so a bad payload can be attributed to the sending peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(pub Vec<u8>);

/// Acknowledgement that a frame reached the receiving service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Length-prefixed codec for direct messages over libp2p request-response.
///
/// Request wire format: `[4-byte BE length][1-byte protocol version][payload]`
///
/// The length prefix covers the version byte + payload (i.e. `1 + payload.len()`).
/// The response is the single byte [`ACK_BYTE`].
#[derive(Debug, Clone, Default)]
pub struct SkeinCodec;

#[async_trait]
impl libp2p::request_response::Codec for SkeinCodec {
    type Protocol = StreamProtocol;
    type Request = Frame;
    type Response = Ack;

    async fn read_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut buf = [0u8; 1];
        io.read_exact(&mut buf).await?;
        if buf[0] != ACK_BYTE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected acknowledgement byte {:#04x}", buf[0]),
            ));
        }
        Ok(Ack)
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &req).await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        _res: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        io.write_all(&[ACK_BYTE]).await?;
        io.flush().await
    }
}

/// Read a versioned, length-prefixed frame from an async reader.
pub async fn read_frame<T>(io: &mut T) -> io::Result<Frame>
where
    T: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE + 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "message too large: {} bytes (max {})",
                len - 1,
                MAX_MESSAGE_SIZE
            ),
        ));
    }

    if len < 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame too short: missing protocol version byte",
        ));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;

    // First byte is the protocol version.
    let version = buf[0];
    if version != PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "protocol version mismatch: peer sent v{}, we run v{}",
                version, PROTOCOL_VERSION
            ),
        ));
    }

    buf.remove(0);
    Ok(Frame(buf))
}

/// Write a versioned, length-prefixed frame to an async writer.
pub async fn write_frame<T>(io: &mut T, frame: &Frame) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    if frame.0.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "message too large: {} bytes (max {})",
                frame.0.len(),
                MAX_MESSAGE_SIZE
            ),
        ));
    }

    // Length = 1 (version byte) + payload length.
    let len = ((1 + frame.0.len()) as u32).to_be_bytes();
    io.write_all(&len).await?;
    io.write_all(&[PROTOCOL_VERSION]).await?;
    io.write_all(&frame.0).await?;
    io.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use libp2p::request_response::Codec;

    fn protocol() -> StreamProtocol {
        StreamProtocol::new("/skein/test/1.0.0")
    }

    async fn write_to_vec(frame: &Frame) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_frame(&mut cursor, frame).await.expect("write failed");
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_frame_layout() {
        let bytes = write_to_vec(&Frame(vec![9, 8, 7])).await;
        assert_eq!(bytes, vec![0, 0, 0, 4, PROTOCOL_VERSION, 9, 8, 7]);
    }

    #[tokio::test]
    async fn test_read_back_written_frame() {
        let frame = Frame(vec![1, 2, 3, 4, 5]);
        let bytes = write_to_vec(&frame).await;
        let read = read_frame(&mut Cursor::new(bytes)).await.expect("read failed");
        assert_eq!(read, frame);
    }

    #[tokio::test]
    async fn test_consecutive_frames_on_one_stream() {
        let mut bytes = write_to_vec(&Frame(vec![1])).await;
        bytes.extend(write_to_vec(&Frame(vec![2, 2])).await);
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor).await.unwrap(), Frame(vec![1]));
        assert_eq!(read_frame(&mut cursor).await.unwrap(), Frame(vec![2, 2]));
    }

    #[tokio::test]
    async fn test_version_mismatch_detected() {
        let mut bytes = write_to_vec(&Frame(vec![1, 2])).await;
        bytes[4] = PROTOCOL_VERSION + 1;
        let err = read_frame(&mut Cursor::new(bytes)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("version mismatch"));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let bytes = write_to_vec(&Frame(vec![1, 2, 3, 4])).await;
        let err = read_frame(&mut Cursor::new(bytes[..6].to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_zero_length_rejected() {
        let err = read_frame(&mut Cursor::new(vec![0, 0, 0, 0]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let len = ((MAX_MESSAGE_SIZE + 2) as u32).to_be_bytes();
        let err = read_frame(&mut Cursor::new(len.to_vec())).await.unwrap_err();
        assert!(err.to_string().contains("message too large"));
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let mut cursor = Cursor::new(Vec::new());
        let frame = Frame(vec![0u8; MAX_MESSAGE_SIZE + 1]);
        assert!(write_frame(&mut cursor, &frame).await.is_err());
        assert!(cursor.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_ack_roundtrip() {
        let mut codec = SkeinCodec;
        let mut cursor = Cursor::new(Vec::new());
        codec
            .write_response(&protocol(), &mut cursor, Ack)
            .await
            .unwrap();
        let bytes = cursor.into_inner();
        assert_eq!(bytes, vec![ACK_BYTE]);
        let ack = codec
            .read_response(&protocol(), &mut Cursor::new(bytes))
            .await
            .unwrap();
        assert_eq!(ack, Ack);
    }

    #[tokio::test]
    async fn test_bad_ack_rejected() {
        let mut codec = SkeinCodec;
        let err = codec
            .read_response(&protocol(), &mut Cursor::new(vec![0xff]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
