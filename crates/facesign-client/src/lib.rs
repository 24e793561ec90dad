//! facesign-client — Transport and coordination for remote face sign-in.
//!
//! Wraps the recognition server's HTTP endpoints and push-event channel,
//! normalizes both into one ordered feed of status snapshots, and drives
//! the session state machine from start to terminal outcome.

pub mod config;
pub mod coordinator;
pub mod events;
pub mod feed;
pub mod gateway;

pub use config::Config;
pub use coordinator::{CancelHandle, Coordinator, SessionView};
pub use events::{ChannelError, ChannelEvent, EventChannel};
pub use feed::{FeedEvent, FrameSource, StatusFeed};
pub use gateway::{Gateway, RecognitionBackend};
