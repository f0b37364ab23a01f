//! Length-prefixed framing over a loopback TCP stream.
//!
//! A frame is a 4-byte big-endian length followed by that many payload
//! bytes. A single socket read never has to line up with a message.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::{Error, Result};

pub const RECV_BUFFER_SIZE: usize = 0x4000;
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub fn worker_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "Frame of {} bytes exceeds limit of {} bytes",
            payload.len(), MAX_FRAME_LEN
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Protocol("Connection closed inside a frame header".to_string()));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "Frame of {} bytes exceeds limit of {} bytes",
            len, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            Error::Protocol(format!("Connection closed inside a {}-byte frame", len))
        }
        _ => Error::Io(e),
    })?;
    Ok(Some(payload))
}

/// One request/response cycle's worth of socket.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    read_timeout: Duration,
}

impl Connection {
    pub async fn connect(addr: SocketAddr, read_timeout: Duration) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, read_timeout))
    }

    pub fn from_stream(stream: TcpStream, read_timeout: Duration) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle on worker connection: {}", e);
        }
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::with_capacity(RECV_BUFFER_SIZE, reader),
            writer,
            read_timeout,
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        write_frame(&mut self.writer, payload).await
    }

    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(self.read_timeout, read_frame(&mut self.reader)).await {
            Ok(frame) => frame,
            Err(_) => Err(Error::WorkerTimeout(self.read_timeout)),
        }
    }
}
