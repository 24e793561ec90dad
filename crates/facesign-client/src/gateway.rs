//! HTTP gateway to the remote recognition service.
//!
//! Every call is a fallible network operation that degrades to a neutral
//! value instead of surfacing an error: callers treat a transport failure
//! as "no progress yet", never as a session outcome.

use async_trait::async_trait;
use facesign_core::{Ack, EnrollmentRequest, RecognitionStatus, StopSummary};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Contract of the remote recognition service.
///
/// A trait so coordinators and tests construct explicit backends rather
/// than sharing module-level state.
#[async_trait]
pub trait RecognitionBackend: Send + Sync + 'static {
    /// Submit a training request. A transport failure comes back as
    /// `success: false`, never as an error.
    async fn train(&self, request: &EnrollmentRequest) -> Ack;

    /// Ask the server to start its recognition stream. Idempotent at the
    /// protocol level; single-session semantics are enforced client-side.
    async fn start_stream(&self) -> Ack;

    /// Ask the server to stop its recognition stream. Always safe to
    /// call, active stream or not.
    async fn stop_stream(&self) -> StopSummary;

    /// Fetch the current recognition status. An unreachable endpoint
    /// yields a synthetic neutral snapshot.
    async fn status(&self) -> RecognitionStatus;

    /// Clear server-side detection state ahead of a fresh attempt.
    async fn reset(&self) -> Ack;

    /// URL of the live video feed. Pure accessor, no side effect.
    fn video_feed_url(&self) -> String;
}

/// Reqwest-backed gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
}

impl Gateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let url = format!("{}{}", self.base_url, path);
        let result = async {
            self.http
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<T>()
                .await
        }
        .await;
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "recognition service call failed");
                None
            }
        }
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Option<T> {
        let url = format!("{}{}", self.base_url, path);
        let result = async {
            let mut request = self.http.post(&url);
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send().await?.error_for_status()?.json::<T>().await
        }
        .await;
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "recognition service call failed");
                None
            }
        }
    }
}

#[async_trait]
impl RecognitionBackend for Gateway {
    async fn train(&self, request: &EnrollmentRequest) -> Ack {
        let body = serde_json::json!({ "name": request.name() });
        self.post_json("/train_face", Some(&body))
            .await
            .unwrap_or_else(|| Ack::failure("Failed to connect to face recognition service"))
    }

    async fn start_stream(&self) -> Ack {
        self.get_json("/start_recognition_stream")
            .await
            .unwrap_or_else(|| Ack::failure("Failed to start recognition stream"))
    }

    async fn stop_stream(&self) -> StopSummary {
        self.get_json("/stop_recognition_stream")
            .await
            .unwrap_or_else(|| StopSummary::failure("Failed to stop recognition stream"))
    }

    async fn status(&self) -> RecognitionStatus {
        self.get_json("/recognition_status")
            .await
            .unwrap_or_else(|| RecognitionStatus::offline("Failed to get status"))
    }

    async fn reset(&self) -> Ack {
        self.post_json::<Ack, ()>("/reset_recognition_state", None)
            .await
            .unwrap_or_else(|| Ack::failure("Failed to reset recognition state"))
    }

    fn video_feed_url(&self) -> String {
        format!("{}/video_feed", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_gateway() -> Gateway {
        // Port 9 (discard) is not listening; connections are refused fast.
        Gateway::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_video_feed_url_strips_trailing_slash() {
        let gateway = unreachable_gateway();
        assert_eq!(gateway.video_feed_url(), "http://127.0.0.1:9/video_feed");
    }

    #[tokio::test]
    async fn test_status_degrades_to_offline_snapshot() {
        let status = unreachable_gateway().status().await;
        assert!(!status.is_signed_in);
        assert_eq!(status.detection_count, 0);
        assert_eq!(status.confirmed(), None);
    }

    #[tokio::test]
    async fn test_control_calls_degrade_to_failure_acks() {
        let gateway = unreachable_gateway();
        assert!(!gateway.start_stream().await.success);
        assert!(!gateway.stop_stream().await.success);
        assert!(!gateway.reset().await.success);

        let request = EnrollmentRequest::new("Jane Doe").unwrap();
        assert!(!gateway.train(&request).await.success);
    }
}
