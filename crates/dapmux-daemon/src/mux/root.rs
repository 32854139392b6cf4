//! Root multiplexed connection.
//!
//! The only component that touches the shared transport. Inbound frames are
//! read by a single task and dispatched by session id; outbound frames are
//! queued and written by a single task, one whole frame at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, warn};

use dapmux_core::config::MuxConfig;
use dapmux_core::protocol::{FrameCodec, parse_frame};
use dapmux_core::{Frame, Message, SessionId};

use super::types::{MuxError, MuxStats};
use crate::transport::{FrameReader, FrameWriter, SharedTransport};

/// Background tasks driving the shared transport.
pub struct MuxTasks {
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

impl MuxTasks {
    /// Wait until the inbound stream ends. Returns `false` if the reader
    /// task panicked or was cancelled instead of finishing.
    pub async fn closed(&mut self) -> bool {
        match (&mut self.reader).await {
            Ok(()) => true,
            Err(e) if e.is_cancelled() => {
                warn!("Transport reader task cancelled");
                false
            }
            Err(e) => {
                error!(error = %e, "Transport reader task failed");
                false
            }
        }
    }

    pub fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Routes frames between the shared transport and per-session views.
pub struct RootConnection {
    /// Inbound senders keyed by session id; one per registered view.
    routes: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Message>>>,
    /// Encoded frames, drained by the writer task.
    outbound: mpsc::Sender<Bytes>,
    /// Encoder for outbound frames; carries the frame size limit.
    codec: FrameCodec,
    /// Set once the inbound stream has ended. Only flipped while holding
    /// the `routes` write guard.
    closed: AtomicBool,
    frames_routed: AtomicU64,
    frames_dropped: AtomicU64,
}

impl RootConnection {
    /// Take ownership of the transport and start the reader and writer tasks.
    pub fn init<R, W>(transport: SharedTransport<R, W>, config: &MuxConfig) -> (Arc<Self>, MuxTasks)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = transport.into_parts();
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));

        let root = Arc::new(Self {
            routes: RwLock::new(HashMap::new()),
            outbound,
            codec: writer.codec().clone(),
            closed: AtomicBool::new(false),
            frames_routed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        });

        let tasks = MuxTasks {
            reader: tokio::spawn(Arc::clone(&root).read_loop(reader)),
            writer: tokio::spawn(write_loop(outbound_rx, writer)),
        };
        (root, tasks)
    }

    /// Associate a session id with a view's inbound channel. Fails once the
    /// transport has closed.
    pub(crate) async fn register_child(
        &self,
        session_id: SessionId,
        inbound: mpsc::UnboundedSender<Message>,
    ) -> Result<(), MuxError> {
        let mut routes = self.routes.write().await;
        if self.is_closed() {
            return Err(MuxError::TransportClosed);
        }
        if routes.contains_key(&session_id) {
            return Err(MuxError::DuplicateSession { session_id });
        }
        routes.insert(session_id.clone(), inbound);
        drop(routes);

        info!(session_id = %session_id, "Session route registered");
        Ok(())
    }

    /// Remove a session's route. Returns whether a route was removed.
    pub async fn unregister_child(&self, session_id: &SessionId) -> bool {
        let removed = self.routes.write().await.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Session route unregistered");
        } else {
            debug!(session_id = %session_id, "Session route already absent");
        }
        removed
    }

    /// Stamp `message` with `session_id` and queue it for the transport.
    /// Frames leave in the order this method is called.
    ///
    /// The frame is encoded here, so a frame the transport cannot carry
    /// (e.g. one over the size limit) fails this call and nothing is queued.
    pub async fn send_raw(&self, session_id: &SessionId, message: Message) -> Result<(), MuxError> {
        if self.is_closed() {
            return Err(MuxError::TransportClosed);
        }

        let mut wire = BytesMut::new();
        self.codec
            .clone()
            .encode(Frame::tagged(session_id, message), &mut wire)
            .map_err(|e| {
                warn!(session_id = %session_id, error = %e, "Rejecting outbound frame");
                MuxError::FrameRejected {
                    session_id: session_id.clone(),
                    reason: e.to_string(),
                }
            })?;

        self.outbound
            .send(wire.freeze())
            .await
            .map_err(|_| MuxError::TransportClosed)
    }

    /// Deliver one inbound frame to its session. Returns whether it was
    /// delivered.
    pub async fn dispatch(&self, frame: Frame) -> bool {
        let (session_id, message) = frame.untag();
        let routes = self.routes.read().await;

        let Some(inbound) = routes.get(&session_id) else {
            drop(routes);
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                session_id = %session_id,
                seq = message.seq,
                "Dropping frame for unregistered session"
            );
            return false;
        };

        if inbound.send(message).is_err() {
            drop(routes);
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(session_id = %session_id, "Dropping frame, session consumer gone");
            return false;
        }

        self.frames_routed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Whether the peer has closed the transport.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn is_registered(&self, session_id: &SessionId) -> bool {
        self.routes.read().await.contains_key(session_id)
    }

    /// All registered session ids.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.routes.read().await.keys().cloned().collect()
    }

    pub async fn stats(&self) -> MuxStats {
        MuxStats {
            session_count: self.routes.read().await.len(),
            frames_routed: self.frames_routed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }

    async fn read_loop<R>(self: Arc<Self>, mut reader: FrameReader<R>)
    where
        R: AsyncRead + Unpin,
    {
        while let Some(next) = reader.next().await {
            match next {
                Ok(body) => match parse_frame(&body) {
                    Ok(frame) => {
                        self.dispatch(frame).await;
                    }
                    Err(e) => {
                        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "Dropping unparseable frame");
                    }
                },
                Err(e) => {
                    error!(error = %e, "Transport read failed");
                    break;
                }
            }
        }

        // Closing every inbound channel lets session consumers observe EOF.
        let released = {
            let mut routes = self.routes.write().await;
            self.closed.store(true, Ordering::Release);
            let count = routes.len();
            routes.clear();
            count
        };
        info!(sessions = released, "Transport inbound stream closed");
    }
}

async fn write_loop<W>(mut outbound: mpsc::Receiver<Bytes>, mut writer: FrameWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(wire) = outbound.recv().await {
        if let Err(e) = writer.write_encoded(&wire).await {
            error!(error = %e, "Transport write failed");
            break;
        }
    }
    debug!("Transport writer stopped");
}
