//! Recognition session state machine.
//!
//! One `Session` value covers one user-initiated attempt, from start to
//! terminal outcome. The coordinator owns it exclusively and mutates it
//! only through the transition methods here; a fresh value is constructed
//! for every attempt so no stale detection baseline leaks across tries.

use crate::status::{RecognitionStatus, Transport};
use uuid::Uuid;

/// Number of non-signed-in detections after which an attempt is declared
/// failed.
pub const DETECTION_THRESHOLD: u32 = 5;

/// Lifecycle of one recognition attempt.
///
/// `Succeeded`, `Failed` and `Cancelled` are absorbing: once reached, no
/// further snapshot or transition changes the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Succeeded { user: String },
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded { .. } | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Terminal verdict produced by observing a snapshot while `Active`.
/// Emitted exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Confirmed(String),
    ThresholdExceeded(u32),
}

/// One recognition attempt.
pub struct Session {
    id: Uuid,
    transport: Transport,
    state: SessionState,
    latest_status: Option<RecognitionStatus>,
    detection_threshold: u32,
}

impl Session {
    pub fn new(transport: Transport) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            state: SessionState::Idle,
            latest_status: None,
            detection_threshold: DETECTION_THRESHOLD,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn latest_status(&self) -> Option<&RecognitionStatus> {
        self.latest_status.as_ref()
    }

    /// `Idle -> Starting`. Refused from any other state: at most one
    /// attempt runs per session value.
    pub fn begin(&mut self) -> bool {
        if self.state != SessionState::Idle {
            tracing::warn!(session = %self.id, state = ?self.state, "begin refused: session already started");
            return false;
        }
        self.state = SessionState::Starting;
        true
    }

    /// `Starting -> Active`, once the gateway confirms the stream.
    pub fn activate(&mut self) -> bool {
        if self.state != SessionState::Starting {
            tracing::warn!(session = %self.id, state = ?self.state, "activate refused");
            return false;
        }
        self.state = SessionState::Active;
        true
    }

    /// `Starting -> Failed`, when the gateway refuses to start. No
    /// automatic retry; a new attempt needs a fresh session.
    pub fn fail_to_start(&mut self, message: &str) {
        if self.state != SessionState::Starting {
            tracing::warn!(session = %self.id, state = ?self.state, "fail_to_start ignored");
            return;
        }
        tracing::warn!(session = %self.id, reason = message, "attempt failed to start");
        self.state = SessionState::Failed;
    }

    /// Feed one snapshot into the session.
    ///
    /// Evaluation order is fixed: a signed-in snapshot wins over one that
    /// also crosses the detection threshold. Snapshots arriving in any
    /// non-`Active` state are ignored, so duplicates and stragglers after
    /// a terminal transition cannot change the outcome.
    pub fn observe(&mut self, status: RecognitionStatus) -> Option<Verdict> {
        if self.state != SessionState::Active {
            tracing::debug!(session = %self.id, state = ?self.state, "snapshot ignored");
            return None;
        }

        if let Some(user) = status.confirmed() {
            let user = user.to_string();
            tracing::info!(session = %self.id, user = %user, "recognition succeeded");
            self.latest_status = Some(status);
            self.state = SessionState::Succeeded { user: user.clone() };
            return Some(Verdict::Confirmed(user));
        }

        if status.detection_count >= self.detection_threshold {
            let detections = status.detection_count;
            tracing::info!(session = %self.id, detections, "recognition failed: detection threshold reached");
            self.latest_status = Some(status);
            self.state = SessionState::Failed;
            return Some(Verdict::ThresholdExceeded(detections));
        }

        // No verdict yet; keep the snapshot for display.
        self.latest_status = Some(status);
        None
    }

    /// User cancel. Legal from `Starting` or `Active` only; once flipped,
    /// no concurrently arriving snapshot can produce a spurious outcome.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            SessionState::Starting | SessionState::Active => {
                tracing::info!(session = %self.id, "attempt cancelled");
                self.state = SessionState::Cancelled;
                true
            }
            _ => {
                tracing::debug!(session = %self.id, state = ?self.state, "cancel ignored");
                false
            }
        }
    }
}
