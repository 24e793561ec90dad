//! Session coordinator.
//!
//! Drives one recognition attempt from user intent to terminal outcome:
//! opens the chosen transport, folds feed events into the session state
//! machine, and releases the transport on every exit path. The session
//! value is owned exclusively here and never reused across attempts.

use crate::config::Config;
use crate::events::EventChannel;
use crate::feed::{FeedEvent, FrameSource, StatusFeed};
use crate::gateway::RecognitionBackend;
use facesign_core::{
    Ack, EnrollmentError, EnrollmentRequest, RecognitionStatus, Session, SessionState, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};

/// Snapshot of the coordinator's session for presentation layers.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: SessionState,
    pub latest: Option<RecognitionStatus>,
}

struct CancelFlag {
    requested: AtomicBool,
    notify: Notify,
}

/// Clone-safe cancellation handle for an attempt in flight.
///
/// The flag flips synchronously on `cancel()`; the attempt loop checks it
/// before every snapshot, so nothing arriving afterwards can produce a
/// spurious terminal state. Transport release stays best-effort and is
/// never awaited before the flip.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<CancelFlag>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.flag.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("cancellation requested");
        }
        // notify_one stores a permit, so a cancel that lands before the
        // loop reaches its select is not lost.
        self.flag.notify.notify_one();
    }
}

/// Coordinates recognition attempts against one backend.
pub struct Coordinator<B: RecognitionBackend> {
    backend: Arc<B>,
    config: Config,
    session: Session,
    view_tx: watch::Sender<SessionView>,
    cancel: Arc<CancelFlag>,
}

impl<B: RecognitionBackend> Coordinator<B> {
    pub fn new(backend: B, config: Config) -> Self {
        let (view_tx, _) = watch::channel(SessionView {
            state: SessionState::Idle,
            latest: None,
        });
        Self {
            backend: Arc::new(backend),
            config,
            session: Session::new(Transport::Polling),
            view_tx,
            cancel: Arc::new(CancelFlag {
                requested: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Watch the session as it moves through an attempt.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }

    /// Validate and submit an enrollment.
    ///
    /// Rejects empty names synchronously, before any network call. The
    /// `&mut self` receiver keeps at most one enrollment in flight per
    /// coordinator, the ownership rendition of debounce-by-disable.
    pub async fn enroll(&mut self, name: &str) -> Result<Ack, EnrollmentError> {
        let request = EnrollmentRequest::new(name)?;
        tracing::info!(name = request.name(), "training requested");
        Ok(self.backend.train(&request).await)
    }

    /// Run one recognition attempt to its terminal state.
    ///
    /// Refused while an earlier attempt is still starting or active;
    /// otherwise a fresh session (fresh detection baseline, fresh id) is
    /// constructed, so no state leaks between attempts.
    pub async fn run_attempt(
        &mut self,
        transport: Transport,
        frames: Option<Box<dyn FrameSource>>,
    ) -> SessionState {
        if matches!(
            self.session.state(),
            SessionState::Starting | SessionState::Active
        ) {
            tracing::warn!(session = %self.session.id(), "attempt already in progress; start refused");
            return self.session.state().clone();
        }

        self.session = Session::new(transport);
        // Clear any cancel left over from the previous attempt.
        self.cancel.requested.store(false, Ordering::SeqCst);

        self.session.begin();
        self.publish();
        tracing::info!(session = %self.session.id(), %transport, "recognition attempt starting");

        let (feed, feed_rx, channel) = match self.open_transport(transport, frames).await {
            Ok(parts) => parts,
            Err(message) => {
                self.session.fail_to_start(&message);
                self.publish();
                return self.session.state().clone();
            }
        };

        self.session.activate();
        self.publish();

        self.drive(feed_rx).await;

        // Terminal state reached; publish before the (best-effort,
        // idempotent) transport release so the outcome is never gated on
        // a slow stop call.
        self.publish();
        feed.stop();
        let summary = self.backend.stop_stream().await;
        if !summary.success {
            tracing::debug!(message = %summary.message, "stop_recognition_stream reported failure");
        }
        if let Some(channel) = &channel {
            channel.disconnect();
        }

        tracing::info!(session = %self.session.id(), state = ?self.session.state(), "attempt finished");
        self.session.state().clone()
    }

    async fn open_transport(
        &self,
        transport: Transport,
        frames: Option<Box<dyn FrameSource>>,
    ) -> Result<
        (
            StatusFeed,
            mpsc::Receiver<FeedEvent>,
            Option<Arc<EventChannel>>,
        ),
        String,
    > {
        match transport {
            Transport::Polling => {
                let ack = self.backend.start_stream().await;
                if !ack.success {
                    return Err(ack.message);
                }
                let (feed, rx) =
                    StatusFeed::spawn_polling(self.backend.clone(), self.config.status_interval);
                Ok((feed, rx, None))
            }
            Transport::EventStream => {
                // Clear server-side detection state from earlier attempts.
                let reset = self.backend.reset().await;
                if !reset.success {
                    tracing::warn!(message = %reset.message, "reset before attempt failed");
                }
                let url = self.config.event_channel_url();
                let (channel, events) = EventChannel::connect(&url)
                    .await
                    .map_err(|err| err.to_string())?;
                let channel = Arc::new(channel);
                let (feed, rx) = StatusFeed::from_channel(events);
                if let Some(source) = frames {
                    feed.attach_frame_pump(channel.clone(), source, self.config.frame_interval);
                }
                Ok((feed, rx, Some(channel)))
            }
        }
    }

    /// Fold feed events into the session until a verdict or a cancel.
    async fn drive(&mut self, mut feed_rx: mpsc::Receiver<FeedEvent>) {
        let cancel = self.cancel.clone();
        loop {
            if cancel.requested.load(Ordering::SeqCst) {
                self.session.cancel();
                return;
            }
            tokio::select! {
                biased;
                _ = cancel.notify.notified() => {
                    self.session.cancel();
                    return;
                }
                event = feed_rx.recv() => match event {
                    Some(FeedEvent::Snapshot(status)) => {
                        if self.session.observe(status).is_some() {
                            return;
                        }
                        self.publish();
                    }
                    Some(FeedEvent::ChannelDown) => {
                        // A dropped link is not a failed recognition; stay
                        // active and wait for reconnection or a cancel.
                        tracing::warn!(session = %self.session.id(), "event channel down; session stays active");
                    }
                    None => {
                        // Feed closed without a verdict. Only a user cancel
                        // can end the attempt now.
                        tracing::warn!(session = %self.session.id(), "status feed closed; awaiting cancellation");
                        cancel.notify.notified().await;
                        self.session.cancel();
                        return;
                    }
                }
            }
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(SessionView {
            state: self.session.state().clone(),
            latest: self.session.latest_status().cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use facesign_core::StopSummary;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Scripted backend: counts control calls and replays a fixed status
    /// sequence, repeating the last entry forever.
    struct ScriptedBackend {
        start_calls: AtomicU32,
        stop_calls: AtomicU32,
        status_calls: AtomicU32,
        script: Vec<RecognitionStatus>,
        start_ack: Ack,
    }

    impl ScriptedBackend {
        fn new(script: Vec<RecognitionStatus>) -> Self {
            Self {
                start_calls: AtomicU32::new(0),
                stop_calls: AtomicU32::new(0),
                status_calls: AtomicU32::new(0),
                script,
                start_ack: Ack {
                    success: true,
                    message: "Stream started".into(),
                },
            }
        }

        fn refusing_start(message: &str) -> Self {
            let mut backend = Self::new(vec![]);
            backend.start_ack = Ack::failure(message);
            backend
        }
    }

    #[async_trait]
    impl RecognitionBackend for ScriptedBackend {
        async fn train(&self, request: &EnrollmentRequest) -> Ack {
            Ack {
                success: true,
                message: format!("Trained {}", request.name()),
            }
        }

        async fn start_stream(&self) -> Ack {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            self.start_ack.clone()
        }

        async fn stop_stream(&self) -> StopSummary {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            StopSummary {
                success: true,
                message: "Stream stopped".into(),
                result: None,
            }
        }

        async fn status(&self) -> RecognitionStatus {
            let call = self.status_calls.fetch_add(1, Ordering::SeqCst) as usize;
            let index = call.min(self.script.len().saturating_sub(1));
            self.script
                .get(index)
                .cloned()
                .unwrap_or_else(|| RecognitionStatus::offline("empty script"))
        }

        async fn reset(&self) -> Ack {
            Ack {
                success: true,
                message: "Reset".into(),
            }
        }

        fn video_feed_url(&self) -> String {
            "http://localhost:5000/video_feed".into()
        }
    }

    fn analyzing(count: u32) -> RecognitionStatus {
        RecognitionStatus {
            is_signed_in: false,
            confirmed_user: None,
            detection_count: count,
            sign_in_time: None,
            message: format!("Analyzing... {count}/5 detections"),
        }
    }

    fn confirmed(user: &str) -> RecognitionStatus {
        RecognitionStatus {
            is_signed_in: true,
            confirmed_user: Some(user.to_string()),
            detection_count: 3,
            sign_in_time: Some("2025-01-04 12:30:00".to_string()),
            message: format!("User '{user}' confirmed."),
        }
    }

    fn coordinator(backend: ScriptedBackend) -> (Coordinator<ScriptedBackend>, Arc<ScriptedBackend>) {
        let config = Config::default();
        let coordinator = Coordinator::new(backend, config);
        let backend = coordinator.backend.clone();
        (coordinator, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_attempt_succeeds() {
        let script = vec![analyzing(1), analyzing(2), confirmed("Jane Doe")];
        let (mut coordinator, backend) = coordinator(ScriptedBackend::new(script));

        let outcome = coordinator.run_attempt(Transport::Polling, None).await;
        assert_eq!(outcome, SessionState::Succeeded { user: "Jane Doe".into() });
        assert_eq!(backend.start_calls.load(Ordering::SeqCst), 1);
        // Transport released exactly once on the success path.
        assert_eq!(backend.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_attempt_fails_at_threshold() {
        let script = (1..=5).map(analyzing).collect();
        let (mut coordinator, backend) = coordinator(ScriptedBackend::new(script));

        let outcome = coordinator.run_attempt(Transport::Polling, None).await;
        assert_eq!(outcome, SessionState::Failed);
        assert_eq!(backend.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refusal_fails_without_polling() {
        let (mut coordinator, backend) =
            coordinator(ScriptedBackend::refusing_start("Camera not available"));

        let outcome = coordinator.run_attempt(Transport::Polling, None).await;
        assert_eq!(outcome, SessionState::Failed);
        // The gateway refused; no status pull ever happened and no
        // automatic retry was attempted.
        assert_eq!(backend.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), 0);
        // The stream never started, so there is nothing to stop.
        assert_eq!(backend.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_attempt() {
        // Status never resolves; only the cancel ends the attempt.
        let script = vec![analyzing(1)];
        let (mut coordinator, backend) = coordinator(ScriptedBackend::new(script));

        let cancel = coordinator.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            cancel.cancel();
            // Idempotent: a second cancel is harmless.
            cancel.cancel();
        });

        let outcome = coordinator.run_attempt(Transport::Polling, None).await;
        assert_eq!(outcome, SessionState::Cancelled);
        // Teardown still ran.
        assert_eq!(backend.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_session_per_attempt() {
        let script = (1..=5).map(analyzing).collect();
        let (mut coordinator, backend) = coordinator(ScriptedBackend::new(script));

        assert_eq!(
            coordinator.run_attempt(Transport::Polling, None).await,
            SessionState::Failed
        );
        let first_id = coordinator.session.id();

        // Second attempt gets a new session and calls start again; the
        // script keeps replaying its final threshold entry.
        assert_eq!(
            coordinator.run_attempt(Transport::Polling, None).await,
            SessionState::Failed
        );
        assert_ne!(coordinator.session.id(), first_id);
        assert_eq!(backend.start_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_start_refused_while_attempt_active() {
        let (mut coordinator, backend) = coordinator(ScriptedBackend::new(vec![]));

        // Put the owned session into Active by hand, as if an attempt
        // were mid-flight.
        coordinator.session.begin();
        coordinator.session.activate();

        let outcome = coordinator.run_attempt(Transport::Polling, None).await;
        assert_eq!(outcome, SessionState::Active);
        // The original session stands; the gateway was never asked to
        // start a second stream.
        assert_eq!(backend.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enroll_validates_before_network() {
        let (mut coordinator, _backend) = coordinator(ScriptedBackend::new(vec![]));
        assert_eq!(
            coordinator.enroll("   ").await,
            Err(EnrollmentError::EmptyName)
        );

        let ack = coordinator.enroll(" Jane Doe ").await.unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "Trained Jane Doe");
    }

    #[tokio::test]
    async fn test_view_updates_reach_subscribers() {
        let script = vec![analyzing(1), analyzing(2), confirmed("Jane Doe")];
        let (mut coordinator, _backend) = coordinator(ScriptedBackend::new(script));
        let view_rx = coordinator.subscribe();

        coordinator.run_attempt(Transport::Polling, None).await;
        assert_eq!(
            view_rx.borrow().state,
            SessionState::Succeeded { user: "Jane Doe".into() }
        );
    }
}
