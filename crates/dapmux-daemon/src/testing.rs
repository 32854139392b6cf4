//! In-memory transport harness.
//!
//! [`duplex_transport`] returns a shared transport for the multiplexer and
//! a [`FrontEnd`] that plays the debug client on the other end of the pipe.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_stream::StreamExt as _;
use tokio_util::codec::FramedRead;

use dapmux_core::protocol::{DEFAULT_MAX_FRAME_BYTES, FrameCodec, parse_frame};
use dapmux_core::{Frame, Message, SessionId};

use crate::transport::{FrameWriter, SharedTransport};

/// How long [`FrontEnd`] waits for a frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

const PIPE_CAPACITY: usize = 256 * 1024;

pub type DuplexTransport = SharedTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Client side of an in-memory transport.
pub struct FrontEnd {
    reader: FramedRead<ReadHalf<DuplexStream>, FrameCodec>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
}

/// Build a connected transport / front-end pair.
pub fn duplex_transport() -> (DuplexTransport, FrontEnd) {
    duplex_transport_with_limit(DEFAULT_MAX_FRAME_BYTES)
}

/// Like [`duplex_transport`], but the multiplexer side enforces
/// `max_frame_bytes`. The front end keeps the default limit.
pub fn duplex_transport_with_limit(max_frame_bytes: usize) -> (DuplexTransport, FrontEnd) {
    let (server, client) = tokio::io::duplex(PIPE_CAPACITY);
    let (server_read, server_write) = tokio::io::split(server);
    let (client_read, client_write) = tokio::io::split(client);

    let transport = SharedTransport::new(server_read, server_write, max_frame_bytes);
    let front_end = FrontEnd {
        reader: FramedRead::new(client_read, FrameCodec::default()),
        writer: FrameWriter::new(client_write, FrameCodec::default()),
    };
    (transport, front_end)
}

impl FrontEnd {
    /// Send a message tagged for `session_id`.
    pub async fn send(&mut self, session_id: &SessionId, message: Message) -> dapmux_core::Result<()> {
        self.writer
            .write_frame(Frame::tagged(session_id, message))
            .await
    }

    /// Send an arbitrary JSON value as one frame.
    pub async fn send_value(&mut self, value: Value) -> dapmux_core::Result<()> {
        let body = serde_json::to_vec(&value)?;
        let mut wire = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        wire.extend_from_slice(&body);
        self.write_bytes(&wire).await
    }

    /// Write raw bytes to the transport.
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> dapmux_core::Result<()> {
        let inner = self.writer.get_mut();
        inner.write_all(bytes).await?;
        inner.flush().await?;
        Ok(())
    }

    /// Next frame body as raw JSON, or `None` on timeout or EOF.
    pub async fn next_value(&mut self) -> Option<Value> {
        let body = tokio::time::timeout(RECV_TIMEOUT, self.reader.next())
            .await
            .ok()??
            .ok()?;
        serde_json::from_slice(&body).ok()
    }

    /// Next frame, or `None` on timeout or EOF.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let body = tokio::time::timeout(RECV_TIMEOUT, self.reader.next())
            .await
            .ok()??
            .ok()?;
        parse_frame(&body).ok()
    }
}
