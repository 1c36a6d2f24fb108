//! Twitter/X adapter.
//!
//! Publishing is two wire surfaces: the v1.1 media upload host for
//! attachments and the v2 API for tweet creation. The OAuth2 refresh
//! exchange lives here too (separate endpoint from publishing) and
//! backs the Token Guard via [`TokenRefresher`].

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::{ApiEndpoints, TwitterAppConfig};
use crate::error::{PublishError, RefreshError};
use crate::token::{RefreshedCredentials, TokenRefresher};
use crate::types::Platform;

pub struct TwitterAdapter {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
    app: Option<TwitterAppConfig>,
}

#[derive(Serialize)]
struct TweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
}

#[derive(Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetPayload,
}

#[derive(Deserialize)]
struct TweetPayload {
    id: String,
}

#[derive(Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TwitterAdapter {
    pub fn new(
        http: reqwest::Client,
        endpoints: &ApiEndpoints,
        app: Option<TwitterAppConfig>,
    ) -> Self {
        Self {
            http,
            api_base: endpoints.twitter_base.clone(),
            upload_base: endpoints.twitter_upload_base.clone(),
            app,
        }
    }

    /// Publish a tweet, uploading any attached media first.
    ///
    /// A failure fetching or uploading any one media URL aborts the
    /// whole publish before the tweet-creation call.
    pub async fn publish(
        &self,
        token: &str,
        text: &str,
        media_urls: &[String],
    ) -> std::result::Result<String, PublishError> {
        let max = Platform::Twitter.max_media();
        if media_urls.len() > max {
            return Err(PublishError::TooManyMedia {
                platform: Platform::Twitter,
                max,
                got: media_urls.len(),
            });
        }

        let mut media_ids = Vec::with_capacity(media_urls.len());
        for url in media_urls {
            let bytes = self.fetch_media(url).await?;
            media_ids.push(self.upload_media(token, bytes).await?);
        }

        let request = TweetRequest {
            text,
            media: if media_ids.is_empty() {
                None
            } else {
                Some(TweetMedia { media_ids })
            },
        };

        let response = self
            .http
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network {
                platform: Platform::Twitter,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                platform: Platform::Twitter,
                body,
            });
        }

        let tweet: TweetResponse =
            response.json().await.map_err(|e| PublishError::Network {
                platform: Platform::Twitter,
                reason: e.to_string(),
            })?;

        Ok(tweet.data.id)
    }

    async fn fetch_media(&self, url: &str) -> std::result::Result<Vec<u8>, PublishError> {
        let media_fetch = |reason: String| PublishError::MediaFetch {
            platform: Platform::Twitter,
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| media_fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(media_fetch(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| media_fetch(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn upload_media(
        &self,
        token: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<String, PublishError> {
        let form = reqwest::multipart::Form::new()
            .part("media", reqwest::multipart::Part::bytes(bytes));

        let response = self
            .http
            .post(format!("{}/1.1/media/upload.json", self.upload_base))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network {
                platform: Platform::Twitter,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Upload {
                platform: Platform::Twitter,
                body,
            });
        }

        let upload: MediaUploadResponse =
            response.json().await.map_err(|e| PublishError::Network {
                platform: Platform::Twitter,
                reason: e.to_string(),
            })?;

        Ok(upload.media_id_string)
    }
}

#[async_trait]
impl TokenRefresher for TwitterAdapter {
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<RefreshedCredentials, RefreshError> {
        let app = self.app.as_ref().ok_or_else(|| {
            RefreshError::Exchange("twitter client credentials not configured".to_string())
        })?;

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", app.client_id, app.client_secret));

        let response = self
            .http
            .post(format!("{}/2/oauth2/token", self.api_base))
            .header("Authorization", format!("Basic {basic}"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Exchange(body));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);

        Ok(RefreshedCredentials {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
        })
    }
}
