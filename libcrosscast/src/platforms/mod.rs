//! Platform adapters for the supported social networks.
//!
//! Each adapter speaks one platform's REST protocol with typed request
//! and response bodies. The [`Publisher`] trait is the seam the
//! scheduler dispatches through; [`PlatformRouter`] routes a publish to
//! the adapter matching the account's platform.

use async_trait::async_trait;

use crate::config::{ApiEndpoints, TwitterAppConfig};
use crate::error::PublishError;
use crate::types::Platform;

pub mod facebook;
pub mod instagram;
pub mod twitter;

// Mock publisher is available for all builds to support integration tests
pub mod mock;

/// Publishes a post to a platform.
///
/// `target_id` is the platform-side identity the post goes out under
/// (Twitter ignores it; Instagram and Facebook address the user/page by
/// id). Returns the platform-assigned post id.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        platform: Platform,
        token: &str,
        target_id: &str,
        text: &str,
        media_urls: &[String],
    ) -> std::result::Result<String, PublishError>;
}

/// Concrete adapter set, one per supported platform
pub struct PlatformRouter {
    twitter: twitter::TwitterAdapter,
    instagram: instagram::InstagramAdapter,
    facebook: facebook::FacebookAdapter,
}

impl PlatformRouter {
    pub fn new(
        http: reqwest::Client,
        endpoints: &ApiEndpoints,
        twitter_app: Option<TwitterAppConfig>,
    ) -> Self {
        Self {
            twitter: twitter::TwitterAdapter::new(http.clone(), endpoints, twitter_app),
            instagram: instagram::InstagramAdapter::new(http.clone(), endpoints),
            facebook: facebook::FacebookAdapter::new(http, endpoints),
        }
    }

    pub fn twitter(&self) -> &twitter::TwitterAdapter {
        &self.twitter
    }
}

#[async_trait]
impl Publisher for PlatformRouter {
    async fn publish(
        &self,
        platform: Platform,
        token: &str,
        target_id: &str,
        text: &str,
        media_urls: &[String],
    ) -> std::result::Result<String, PublishError> {
        match platform {
            Platform::Twitter => self.twitter.publish(token, text, media_urls).await,
            Platform::Instagram => {
                self.instagram
                    .publish(token, target_id, text, media_urls)
                    .await
            }
            Platform::Facebook => {
                self.facebook
                    .publish(token, target_id, text, media_urls)
                    .await
            }
        }
    }
}
