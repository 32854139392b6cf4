//! Shared transport: the single physical duplex stream.
//!
//! Knows how to frame and unframe protocol messages and nothing about
//! sessions. Exactly one reader and one writer exist per process; both are
//! handed to the root connection.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Encoder, FramedRead};
use tracing::info;

use dapmux_core::Frame;
use dapmux_core::protocol::FrameCodec;

/// Frame-level reader over the inbound half.
pub type FrameReader<R> = FramedRead<R, FrameCodec>;

/// Frame-level writer over the outbound half.
pub struct FrameWriter<W> {
    inner: W,
    codec: FrameCodec,
    buf: BytesMut,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W, codec: FrameCodec) -> Self {
        Self {
            inner,
            codec,
            buf: BytesMut::new(),
        }
    }

    /// Encode and write one frame, flushing so it leaves the process
    /// before the next one is accepted.
    pub async fn write_frame(&mut self, frame: Frame) -> dapmux_core::Result<()> {
        self.buf.clear();
        self.codec.encode(frame, &mut self.buf)?;
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write bytes that already carry their framing header.
    pub async fn write_encoded(&mut self, wire: &[u8]) -> io::Result<()> {
        self.inner.write_all(wire).await?;
        self.inner.flush().await
    }

    pub const fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

/// The process-wide duplex stream, split into frame reader and writer.
pub struct SharedTransport<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R, W> SharedTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, max_frame_bytes: usize) -> Self {
        Self {
            reader: FramedRead::new(reader, FrameCodec::new(max_frame_bytes)),
            writer: FrameWriter::new(writer, FrameCodec::new(max_frame_bytes)),
        }
    }

    pub fn into_parts(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}

impl SharedTransport<OwnedReadHalf, OwnedWriteHalf> {
    /// Use an accepted socket for both directions.
    pub fn tcp(stream: TcpStream, max_frame_bytes: usize) -> Self {
        let (read, write) = stream.into_split();
        Self::new(read, write, max_frame_bytes)
    }
}

impl SharedTransport<Stdin, Stdout> {
    /// Use the process's standard input and output.
    pub fn stdio(max_frame_bytes: usize) -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), max_frame_bytes)
    }
}

/// Listen on `host:port` and accept exactly one connection.
pub async fn accept_one(host: &str, port: u16) -> io::Result<TcpStream> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "Waiting for debug client connection");
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    info!(peer = %peer, "Debug client connected");
    Ok(stream)
}
