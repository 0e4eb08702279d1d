//! Length-prefixed framing over TCP plus bind/connect helpers.
//!
//! Every frame is a 4-byte little-endian payload length followed by the
//! payload itself, in both directions.

use std::marker::Unpin;
use std::net::SocketAddr;

use crate::utils::PlasmaError;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{self, Duration};

/// Size of the length prefix in bytes.
pub(crate) const FRAME_HEADER_LEN: usize = 4;

/// Receives one frame from `conn_read`, using `read_buf` as storage for
/// partial reads. Keeps reading until the whole declared length arrived, so
/// arbitrary TCP segmentation is tolerated. Bytes beyond the frame stay in
/// `read_buf` for the next call.
///
/// Fails if the peer closes early or declares a payload above `max_len`.
pub(crate) async fn read_frame<Conn>(
    read_buf: &mut BytesMut,
    conn_read: &mut Conn,
    max_len: usize,
) -> Result<Bytes, PlasmaError>
where
    Conn: AsyncReadExt + Unpin,
{
    while read_buf.len() < FRAME_HEADER_LEN {
        if conn_read.read_buf(read_buf).await? == 0 {
            return Err(PlasmaError::msg(
                "connection closed before frame header",
            ));
        }
    }
    let mut header = [0u8; FRAME_HEADER_LEN];
    header.copy_from_slice(&read_buf[..FRAME_HEADER_LEN]);
    let frame_len = u32::from_le_bytes(header) as usize;
    if frame_len > max_len {
        return Err(PlasmaError::msg(format!(
            "frame length {} exceeds limit {}",
            frame_len, max_len
        )));
    }

    let frame_end = FRAME_HEADER_LEN + frame_len;
    if read_buf.capacity() < frame_end {
        read_buf.reserve(frame_end - read_buf.len());
    }
    while read_buf.len() < frame_end {
        if conn_read.read_buf(read_buf).await? == 0 {
            return Err(PlasmaError::msg(format!(
                "connection closed after {} of {} frame bytes",
                read_buf.len() - FRAME_HEADER_LEN,
                frame_len
            )));
        }
    }

    let mut frame = read_buf.split_to(frame_end);
    frame.advance(FRAME_HEADER_LEN);
    Ok(frame.freeze())
}

/// Sends `payload` as one frame to `conn_write` and flushes it.
pub(crate) async fn write_frame<Conn>(
    conn_write: &mut Conn,
    payload: &[u8],
) -> Result<(), PlasmaError>
where
    Conn: AsyncWriteExt + Unpin,
{
    let frame_len = u32::try_from(payload.len())?;
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u32_le(frame_len);
    frame.put_slice(payload);
    conn_write.write_all(&frame).await?;
    conn_write.flush().await?;
    Ok(())
}

fn new_socket(addr: &SocketAddr) -> Result<TcpSocket, PlasmaError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    Ok(socket)
}

/// Binds a listener at `bind_addr`, retrying up to `retries` times with
/// `interval` in between.
pub(crate) async fn tcp_bind_with_retry(
    bind_addr: SocketAddr,
    mut retries: u8,
    interval: Duration,
) -> Result<TcpListener, PlasmaError> {
    loop {
        let attempt = new_socket(&bind_addr).and_then(|socket| {
            socket.bind(bind_addr)?;
            Ok(socket.listen(1024)?)
        });
        match attempt {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                if retries == 0 {
                    return Err(e);
                }
                retries -= 1;
                time::sleep(interval).await;
            }
        }
    }
}

/// Connects to `conn_addr`, retrying up to `retries` times with `interval`
/// in between.
pub(crate) async fn tcp_connect_with_retry(
    conn_addr: SocketAddr,
    mut retries: u8,
    interval: Duration,
) -> Result<TcpStream, PlasmaError> {
    loop {
        let socket = new_socket(&conn_addr)?;
        match socket.connect(conn_addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => {
                if retries == 0 {
                    return Err(err.into());
                }
                retries -= 1;
                time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod framing_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_split_frame() -> Result<(), PlasmaError> {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            // header and payload trickle in over several writes
            client.write_all(&[5, 0]).await?;
            time::sleep(Duration::from_millis(20)).await;
            client.write_all(&[0, 0, b'h', b'e']).await?;
            time::sleep(Duration::from_millis(20)).await;
            client.write_all(b"llo").await?;
            Ok::<_, PlasmaError>(client)
        });
        let mut read_buf = BytesMut::new();
        let frame = read_frame(&mut read_buf, &mut server, 1024).await?;
        assert_eq!(&frame[..], b"hello");
        assert!(read_buf.is_empty());
        writer.await??;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_back_to_back_frames() -> Result<(), PlasmaError> {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_frame(&mut client, b"first").await?;
        write_frame(&mut client, b"").await?;
        write_frame(&mut client, b"third,with,commas").await?;
        let mut read_buf = BytesMut::new();
        let frame = read_frame(&mut read_buf, &mut server, 1024).await?;
        assert_eq!(&frame[..], b"first");
        let frame = read_frame(&mut read_buf, &mut server, 1024).await?;
        assert!(frame.is_empty());
        let frame = read_frame(&mut read_buf, &mut server, 1024).await?;
        assert_eq!(&frame[..], b"third,with,commas");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_rejects_oversized() -> Result<(), PlasmaError> {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&u32::MAX.to_le_bytes()).await?;
        let mut read_buf = BytesMut::new();
        assert!(read_frame(&mut read_buf, &mut server, 1024).await.is_err());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_truncated_frame() -> Result<(), PlasmaError> {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[10, 0, 0, 0, b'a', b'b']).await?;
        drop(client);
        let mut read_buf = BytesMut::new();
        assert!(read_frame(&mut read_buf, &mut server, 1024).await.is_err());
        Ok(())
    }
}
