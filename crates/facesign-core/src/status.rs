use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recognition status snapshot, received repeatedly over a session.
///
/// Field names match the server's JSON exactly. `detection_count` is
/// non-decreasing within one server-side attempt, but the client must
/// tolerate resets to 0 (a new server attempt) and out-of-order delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionStatus {
    pub is_signed_in: bool,
    pub confirmed_user: Option<String>,
    #[serde(default)]
    pub detection_count: u32,
    pub sign_in_time: Option<String>,
    /// Human-readable diagnostic. Never used for control flow.
    #[serde(default)]
    pub message: String,
}

impl RecognitionStatus {
    /// Synthetic snapshot standing in for an unreachable status endpoint.
    /// Callers treat it as "no progress yet", not as a failed attempt.
    pub fn offline(message: impl Into<String>) -> Self {
        Self {
            is_signed_in: false,
            confirmed_user: None,
            detection_count: 0,
            sign_in_time: None,
            message: message.into(),
        }
    }

    /// The confirmed user, iff the snapshot satisfies the sign-in
    /// invariant: `is_signed_in` implies a user name is present.
    /// A signed-in snapshot with no user is treated as not signed in.
    pub fn confirmed(&self) -> Option<&str> {
        if self.is_signed_in {
            self.confirmed_user.as_deref()
        } else {
            None
        }
    }
}

/// Success/message acknowledgement returned by the control endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    /// Acknowledgement standing in for a transport failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Final outcome attached to a `stop_recognition_stream` response when
/// the server resolved the attempt before the stop arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResult {
    pub is_signed_in: bool,
    pub confirmed_user: Option<String>,
    pub sign_in_time: Option<String>,
}

/// Response of `stop_recognition_stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSummary {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub result: Option<FinalResult>,
}

impl StopSummary {
    /// Summary standing in for a transport failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            result: None,
        }
    }
}

/// How status snapshots reach the session: periodic HTTP pulls, or a
/// persistent server-push channel. Exactly one strategy is active per
/// session, chosen at start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Polling,
    EventStream,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown transport {0:?} (expected \"polling\" or \"events\")")]
pub struct TransportParseError(String);

impl std::str::FromStr for Transport {
    type Err = TransportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" | "poll" => Ok(Transport::Polling),
            "events" | "event-stream" => Ok(Transport::EventStream),
            other => Err(TransportParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Polling => write!(f, "polling"),
            Transport::EventStream => write!(f, "events"),
        }
    }
}
