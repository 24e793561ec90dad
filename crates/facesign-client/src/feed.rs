//! Frame/status feed adapter.
//!
//! Normalizes the two transport strategies (periodic status pulls and
//! server-pushed channel events) into one ordered sequence of feed
//! events consumed by the session loop. No reordering, no deduplication:
//! the state machine's monotonic transitions absorb duplicates safely.

use crate::events::{ChannelEvent, EventChannel};
use crate::gateway::RecognitionBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use facesign_core::RecognitionStatus;

/// One normalized update, delivered in receipt order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Snapshot(RecognitionStatus),
    /// The event channel dropped mid-session. Diagnostic only; the
    /// session stays active until a verdict or a user cancel.
    ChannelDown,
}

/// Supplies JPEG-encoded frames for the push cadence in event-stream
/// mode. Platform camera capture plugs in behind this seam.
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Vec<u8>>;
}

/// Running feed for one session.
///
/// Stopping is idempotent. Once stopped, no further events are
/// forwarded, including responses that were already in flight.
pub struct StatusFeed {
    stopped: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StatusFeed {
    /// Poll `backend.status()` on a fixed cadence.
    ///
    /// Ticks never wait for in-flight requests; each pull runs as its own
    /// task, and a response arriving after `stop` is discarded rather
    /// than forwarded.
    pub fn spawn_polling<B: RecognitionBackend>(
        backend: Arc<B>,
        every: Duration,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let stopped = Arc::new(AtomicBool::new(false));

        let loop_stopped = stopped.clone();
        let task = tokio::spawn(async move {
            // First pull after one full interval, matching the reference
            // cadence.
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if loop_stopped.load(Ordering::SeqCst) {
                    break;
                }
                let backend = backend.clone();
                let tx = tx.clone();
                let stopped = loop_stopped.clone();
                tokio::spawn(async move {
                    let status = backend.status().await;
                    if !stopped.load(Ordering::SeqCst) {
                        let _ = tx.send(FeedEvent::Snapshot(status)).await;
                    }
                });
            }
            tracing::debug!("polling loop exited");
        });

        (
            Self {
                stopped,
                tasks: Mutex::new(vec![task]),
            },
            rx,
        )
    }

    /// Forward server-pushed events from a connected channel.
    pub fn from_channel(
        mut events: mpsc::Receiver<ChannelEvent>,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let stopped = Arc::new(AtomicBool::new(false));

        let loop_stopped = stopped.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if loop_stopped.load(Ordering::SeqCst) {
                    break;
                }
                let forwarded = match event {
                    ChannelEvent::Status(status) => FeedEvent::Snapshot(status),
                    ChannelEvent::Disconnected => {
                        tracing::warn!("event channel dropped mid-session");
                        FeedEvent::ChannelDown
                    }
                };
                if tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            tracing::debug!("channel feed exited");
        });

        (
            Self {
                stopped,
                tasks: Mutex::new(vec![task]),
            },
            rx,
        )
    }

    /// Pump frames from `source` over the channel at the given cadence.
    /// The pump stops with the feed, or earlier if the source runs dry.
    pub fn attach_frame_pump(
        &self,
        channel: Arc<EventChannel>,
        mut source: Box<dyn FrameSource>,
        every: Duration,
    ) {
        let stopped = self.stopped.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                match source.next_frame() {
                    Some(jpeg) => channel.send_frame(jpeg).await,
                    None => {
                        tracing::debug!("frame source exhausted");
                        break;
                    }
                }
            }
            tracing::debug!("frame pump exited");
        });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Stop the feed. Safe to call any number of times; the first call
    /// wins and later calls are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        tracing::debug!("status feed stopped");
    }
}

impl Drop for StatusFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
