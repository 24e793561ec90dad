//! facesign-core — Recognition session domain.
//!
//! Wire types for the remote face-recognition service, enrollment
//! validation, and the client-side state machine that reconciles status
//! snapshots into a terminal sign-in outcome.

pub mod enroll;
pub mod session;
pub mod status;

pub use enroll::{EnrollmentError, EnrollmentRequest};
pub use session::{Session, SessionState, Verdict, DETECTION_THRESHOLD};
pub use status::{Ack, FinalResult, RecognitionStatus, StopSummary, Transport, TransportParseError};
