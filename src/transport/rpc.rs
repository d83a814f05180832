//! Framed request/response client running over a single byte stream
//!
//! One background task per connection owns the stream. It writes queued
//! frames, sends keepalives and routes inbound frames: responses and errors
//! to the waiting request, fire-and-forget messages to the events sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use link_shared::codec::{self, FrameDecoder};
use link_shared::{Frame, FrameKind};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

use super::error::TransportError;
use super::traits::{TransportClient, TransportEvents, TransportStream};

type Reply = Result<Bytes, TransportError>;
type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Reply>>>>;

enum Outbound {
    Frame(Frame),
    Close(String),
}

/// How a session ended
enum SessionEnd {
    /// Closed from this side
    Local(String),
    /// Closed by the desktop or failed
    Remote(String),
}

/// Client half of a framed RPC connection
pub struct RpcClient {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: PendingMap,
    next_stream_id: AtomicU32,
}

impl RpcClient {
    /// Send the setup frame and start the session task
    pub async fn start<S: TransportStream>(
        mut stream: S,
        setup: Bytes,
        keepalive: Duration,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self, TransportError> {
        write_frame(&mut stream, &Frame::setup(setup)).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::default();

        events.on_connected();
        tokio::spawn(run_session(
            stream,
            outbound_rx,
            pending.clone(),
            keepalive,
            events,
        ));

        Ok(Self {
            outbound: outbound_tx,
            pending,
            next_stream_id: AtomicU32::new(1),
        })
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u32, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransportClient for RpcClient {
    fn fire_and_forget(&self, payload: Bytes) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Frame(Frame::fire_and_forget(payload)))
            .map_err(|_| TransportError::Network("Connection closed".into()))
    }

    fn request_response(&self, payload: Bytes) -> BoxFuture<'static, Reply> {
        // Client-initiated streams are odd
        let stream_id = self.next_stream_id.fetch_add(2, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.lock_pending().insert(stream_id, reply_tx);

        if self
            .outbound
            .send(Outbound::Frame(Frame::request(stream_id, payload)))
            .is_err()
        {
            self.lock_pending().remove(&stream_id);
            return Box::pin(async { Err(TransportError::Network("Connection closed".into())) });
        }

        Box::pin(async move {
            reply_rx.await.unwrap_or_else(|_| {
                Err(TransportError::Network(
                    "Connection closed before response".into(),
                ))
            })
        })
    }

    fn disconnect(&self) {
        let _ = self
            .outbound
            .send(Outbound::Close("Disconnected by client".into()));
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), TransportError> {
    let encoded = codec::encode(frame)?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Main loop of one connection
async fn run_session<S: TransportStream>(
    stream: S,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    pending: PendingMap,
    keepalive: Duration,
    events: Arc<dyn TransportEvents>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];
    let mut keepalive_interval = interval_at(Instant::now() + keepalive, keepalive);

    let end = 'session: loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        break SessionEnd::Remote(format!("Write error: {}", e));
                    }
                }
                Some(Outbound::Close(reason)) => break SessionEnd::Local(reason),
                None => break SessionEnd::Local("Client dropped".into()),
            },

            _ = keepalive_interval.tick() => {
                if let Err(e) = write_frame(&mut writer, &Frame::keepalive()).await {
                    break SessionEnd::Remote(format!("Keepalive failed: {}", e));
                }
            }

            result = reader.read(&mut read_buf) => match result {
                Ok(0) => break SessionEnd::Remote("Desktop closed connection".into()),
                Ok(n) => {
                    decoder.extend(&read_buf[..n]);

                    // Process all complete frames
                    loop {
                        match decoder.decode_next() {
                            Ok(Some(frame)) => {
                                if let Some(reply) = handle_inbound(frame, &pending, events.as_ref()) {
                                    if let Err(e) = write_frame(&mut writer, &reply).await {
                                        break 'session SessionEnd::Remote(format!("Write error: {}", e));
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(e) => break 'session SessionEnd::Remote(format!("Decode error: {}", e)),
                        }
                    }
                }
                Err(e) => break SessionEnd::Remote(format!("Read error: {}", e)),
            }
        }
    };

    let _ = writer.shutdown().await;

    // Refuse new frames before failing the waiters
    outbound_rx.close();
    let waiters: Vec<_> = pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .drain()
        .collect();
    for (_, waiter) in waiters {
        let _ = waiter.send(Err(TransportError::Network("Connection closed".into())));
    }

    match end {
        SessionEnd::Local(reason) => {
            debug!("Session closed locally: {}", reason);
            events.on_disconnected(reason.clone());
            events.on_closed(reason);
        }
        SessionEnd::Remote(reason) => {
            debug!("Session closed: {}", reason);
            events.on_closed(reason);
        }
    }
}

/// Route one inbound frame, returning a frame to send back if any
fn handle_inbound(frame: Frame, pending: &PendingMap, events: &dyn TransportEvents) -> Option<Frame> {
    let kind = match frame.frame_kind() {
        Some(kind) => kind,
        None => {
            warn!("Ignoring frame of unknown kind {}", frame.kind);
            return None;
        }
    };

    match kind {
        FrameKind::FireAndForget => {
            events.on_fire_and_forget(frame.data);
            None
        }
        FrameKind::Response | FrameKind::Error => {
            let waiter = pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&frame.stream_id);
            match waiter {
                Some(waiter) => {
                    let reply = if kind == FrameKind::Response {
                        Ok(frame.data)
                    } else {
                        Err(TransportError::Protocol(frame.data))
                    };
                    let _ = waiter.send(reply);
                }
                None => debug!("Reply for unknown stream {}", frame.stream_id),
            }
            None
        }
        FrameKind::Request => {
            // The device does not serve requests
            Some(Frame::error(frame.stream_id, link_shared::link::NOT_IMPLEMENTED))
        }
        FrameKind::Keepalive => None,
        FrameKind::Setup => {
            warn!("Unexpected setup frame from desktop");
            None
        }
    }
}
