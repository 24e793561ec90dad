//! Server-push event channel over WebSocket.
//!
//! Both directions carry JSON text frames with an
//! `{"event": <name>, "data": <payload>}` envelope. The server pushes
//! `recognition_status` whenever its state changes; the client pushes
//! base64-encoded `image_stream` frames at a fixed cadence.

use base64::Engine as _;
use facesign_core::RecognitionStatus;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const STATUS_EVENT: &str = "recognition_status";
const FRAME_EVENT: &str = "image_stream";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Event observed on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(RecognitionStatus),
    /// The connection dropped without a client-side disconnect. A lost
    /// link is a diagnostic, not evidence of a failed attempt.
    Disconnected,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    data: serde_json::Value,
}

/// Handle to a connected event channel.
///
/// `disconnect` is idempotent and safe when the connection is already
/// gone; frames sent after disconnect are silently dropped.
pub struct EventChannel {
    frame_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl EventChannel {
    /// Connect and spawn the reader/writer tasks. Returns the handle and
    /// the ordered stream of channel events.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ChannelEvent>), ChannelError> {
        let (ws, _response) = connect_async(url).await?;
        tracing::info!(url, "event channel connected");

        let (mut sink, mut stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(16);
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(4);
        let closed = Arc::new(AtomicBool::new(false));

        // Reader: decode envelopes until the stream ends. A server-side
        // drop (not a client disconnect) surfaces as one Disconnected.
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(status) = decode_status(&text) {
                            if event_tx.send(ChannelEvent::Status(status)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            if !reader_closed.load(Ordering::SeqCst) {
                let _ = event_tx.send(ChannelEvent::Disconnected).await;
            }
            tracing::debug!("event channel reader exited");
        });

        // Writer: encode frames into image_stream envelopes. Dropping the
        // frame sender (disconnect) ends this task and closes the socket.
        tokio::spawn(async move {
            while let Some(jpeg) = frame_rx.recv().await {
                match encode_frame(&jpeg) {
                    Ok(envelope) => {
                        if sink.send(Message::Text(envelope)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "frame envelope encoding failed");
                    }
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            tracing::debug!("event channel writer exited");
        });

        Ok((
            Self {
                frame_tx: Mutex::new(Some(frame_tx)),
                closed,
            },
            event_rx,
        ))
    }

    /// Push one JPEG frame. A no-op after disconnect.
    pub async fn send_frame(&self, jpeg: Vec<u8>) {
        let sender = self
            .frame_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(sender) = sender {
            let _ = sender.send(jpeg).await;
        }
    }

    /// Close the channel. Safe to call any number of times, connected or
    /// not; the first call wins.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.frame_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        tracing::debug!("event channel disconnect requested");
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn decode_status(text: &str) -> Option<RecognitionStatus> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(error = %err, "malformed channel message");
            return None;
        }
    };
    match envelope.event.as_str() {
        STATUS_EVENT => match serde_json::from_value(envelope.data) {
            Ok(status) => Some(status),
            Err(err) => {
                tracing::warn!(error = %err, "malformed recognition_status payload");
                None
            }
        },
        other => {
            tracing::debug!(event = other, "ignoring unknown channel event");
            None
        }
    }
}

fn encode_frame(jpeg: &[u8]) -> Result<String, serde_json::Error> {
    let payload = base64::engine::general_purpose::STANDARD.encode(jpeg);
    serde_json::to_string(&Envelope {
        event: FRAME_EVENT.to_string(),
        data: serde_json::Value::String(payload),
    })
}
