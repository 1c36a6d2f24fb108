//! Instagram Graph API adapter.
//!
//! Publishing is container-based: every image is staged in a
//! server-side container that must finish processing before anything
//! references it. Single images publish their own container; carousels
//! stage each child, then a parent container referencing the children.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::config::ApiEndpoints;
use crate::error::PublishError;
use crate::types::Platform;

/// How long a container may stay in processing before the publish fails
const STATUS_POLL_BUDGET: Duration = Duration::from_secs(10);
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct InstagramAdapter {
    http: reqwest::Client,
    graph_base: String,
    poll_budget: Duration,
    poll_interval: Duration,
}

#[derive(Serialize)]
struct ContainerRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_carousel_item: Option<bool>,
    /// Comma-joined child container ids (carousel parent only)
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<String>,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Deserialize)]
struct ContainerStatusResponse {
    status_code: String,
}

#[derive(Serialize)]
struct MediaPublishRequest<'a> {
    creation_id: &'a str,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct MediaPublishResponse {
    id: String,
}

impl InstagramAdapter {
    pub fn new(http: reqwest::Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            http,
            graph_base: endpoints.graph_base.clone(),
            poll_budget: STATUS_POLL_BUDGET,
            poll_interval: STATUS_POLL_INTERVAL,
        }
    }

    /// Publish to an Instagram account.
    ///
    /// Text-only posts are unsupported by the platform and fail fast
    /// before any network call.
    pub async fn publish(
        &self,
        token: &str,
        ig_user_id: &str,
        caption: &str,
        media_urls: &[String],
    ) -> std::result::Result<String, PublishError> {
        if media_urls.is_empty() {
            return Err(PublishError::NoMedia);
        }

        let max = Platform::Instagram.max_media();
        if media_urls.len() > max {
            return Err(PublishError::TooManyMedia {
                platform: Platform::Instagram,
                max,
                got: media_urls.len(),
            });
        }

        if media_urls.len() == 1 {
            let container = self
                .create_container(
                    ig_user_id,
                    ContainerRequest {
                        caption: Some(caption),
                        image_url: Some(&media_urls[0]),
                        media_type: Some("IMAGE"),
                        is_carousel_item: None,
                        children: None,
                        access_token: token,
                    },
                )
                .await?;
            self.await_container(token, &container).await?;
            return self.publish_container(token, ig_user_id, &container).await;
        }

        // Carousel: children must each finish processing before the
        // parent can reference them, so they are staged sequentially.
        let mut children = Vec::with_capacity(media_urls.len());
        for url in media_urls {
            let child = self
                .create_container(
                    ig_user_id,
                    ContainerRequest {
                        caption: None,
                        image_url: Some(url),
                        media_type: Some("IMAGE"),
                        is_carousel_item: Some(true),
                        children: None,
                        access_token: token,
                    },
                )
                .await?;
            self.await_container(token, &child).await?;
            children.push(child);
        }

        let parent = self
            .create_container(
                ig_user_id,
                ContainerRequest {
                    caption: Some(caption),
                    image_url: None,
                    media_type: Some("CAROUSEL"),
                    is_carousel_item: None,
                    children: Some(children.join(",")),
                    access_token: token,
                },
            )
            .await?;
        self.await_container(token, &parent).await?;
        self.publish_container(token, ig_user_id, &parent).await
    }

    async fn create_container(
        &self,
        ig_user_id: &str,
        request: ContainerRequest<'_>,
    ) -> std::result::Result<String, PublishError> {
        let response = self
            .http
            .post(format!("{}/{}/media", self.graph_base, ig_user_id))
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network {
                platform: Platform::Instagram,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Container { body });
        }

        let container: ContainerResponse =
            response.json().await.map_err(|e| PublishError::Network {
                platform: Platform::Instagram,
                reason: e.to_string(),
            })?;

        Ok(container.id)
    }

    /// Poll a container until it reports FINISHED, within the poll budget
    async fn await_container(
        &self,
        token: &str,
        container_id: &str,
    ) -> std::result::Result<(), PublishError> {
        let deadline = tokio::time::Instant::now() + self.poll_budget;

        loop {
            let response = self
                .http
                .get(format!("{}/{}", self.graph_base, container_id))
                .query(&[("fields", "status_code"), ("access_token", token)])
                .send()
                .await
                .map_err(|e| PublishError::Network {
                    platform: Platform::Instagram,
                    reason: e.to_string(),
                })?;

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PublishError::StatusCheck { body });
            }

            let status: ContainerStatusResponse =
                response.json().await.map_err(|e| PublishError::Network {
                    platform: Platform::Instagram,
                    reason: e.to_string(),
                })?;

            match status.status_code.as_str() {
                "FINISHED" => return Ok(()),
                "ERROR" => {
                    return Err(PublishError::StatusCheck {
                        body: format!("container {container_id} reported status ERROR"),
                    })
                }
                other => {
                    debug!(container = container_id, status = other, "container still processing");
                }
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(PublishError::ProcessingTimeout {
                    container_id: container_id.to_string(),
                    waited_secs: self.poll_budget.as_secs(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn publish_container(
        &self,
        token: &str,
        ig_user_id: &str,
        creation_id: &str,
    ) -> std::result::Result<String, PublishError> {
        let response = self
            .http
            .post(format!("{}/{}/media_publish", self.graph_base, ig_user_id))
            .json(&MediaPublishRequest {
                creation_id,
                access_token: token,
            })
            .send()
            .await
            .map_err(|e| PublishError::Network {
                platform: Platform::Instagram,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                platform: Platform::Instagram,
                body,
            });
        }

        let published: MediaPublishResponse =
            response.json().await.map_err(|e| PublishError::Network {
                platform: Platform::Instagram,
                reason: e.to_string(),
            })?;

        Ok(published.id)
    }
}
