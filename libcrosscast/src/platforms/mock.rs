//! Mock publisher for testing.
//!
//! Scripts per-post outcomes keyed by post text and records every call,
//! so scheduler tests can verify dispatch and fault isolation without
//! network access or real credentials.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::PublishError;
use crate::platforms::Publisher;
use crate::types::Platform;

/// One recorded publish invocation
#[derive(Debug, Clone)]
pub struct RecordedPublish {
    pub platform: Platform,
    pub token: String,
    pub target_id: String,
    pub text: String,
    pub media_urls: Vec<String>,
}

#[derive(Default)]
pub struct MockPublisher {
    outcomes: Mutex<HashMap<String, std::result::Result<String, PublishError>>>,
    calls: Mutex<Vec<RecordedPublish>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful publish for posts with this text
    pub fn succeed(&self, text: &str, platform_post_id: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(text.to_string(), Ok(platform_post_id.to_string()));
    }

    /// Script a failed publish for posts with this text
    pub fn fail(&self, text: &str, error: PublishError) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(text.to_string(), Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedPublish> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(
        &self,
        platform: Platform,
        token: &str,
        target_id: &str,
        text: &str,
        media_urls: &[String],
    ) -> std::result::Result<String, PublishError> {
        self.calls.lock().unwrap().push(RecordedPublish {
            platform,
            token: token.to_string(),
            target_id: target_id.to_string(),
            text: text.to_string(),
            media_urls: media_urls.to_vec(),
        });

        match self.outcomes.lock().unwrap().get(text) {
            Some(outcome) => outcome.clone(),
            None => Ok(format!("mock-{}", uuid::Uuid::new_v4())),
        }
    }
}
