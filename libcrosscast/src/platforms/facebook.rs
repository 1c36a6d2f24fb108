//! Facebook Graph API adapter.
//!
//! Three publish shapes: a plain feed post for text, a combined
//! photo-and-feed call for a single image, and unpublished photo
//! uploads stitched into one feed post for a multi-photo post.

use serde::{Deserialize, Serialize};

use crate::config::ApiEndpoints;
use crate::error::PublishError;
use crate::types::Platform;

pub struct FacebookAdapter {
    http: reqwest::Client,
    graph_base: String,
}

#[derive(Serialize)]
struct FeedRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attached_media: Option<Vec<AttachedMedia>>,
    access_token: &'a str,
}

#[derive(Serialize)]
struct AttachedMedia {
    media_fbid: String,
}

#[derive(Deserialize)]
struct FeedResponse {
    id: String,
}

#[derive(Serialize)]
struct PhotoRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<bool>,
    access_token: &'a str,
}

#[derive(Deserialize)]
struct PhotoResponse {
    id: String,
    /// Present when the photo call also created a feed post
    post_id: Option<String>,
}

impl FacebookAdapter {
    pub fn new(http: reqwest::Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            http,
            graph_base: endpoints.graph_base.clone(),
        }
    }

    pub async fn publish(
        &self,
        token: &str,
        page_id: &str,
        message: &str,
        media_urls: &[String],
    ) -> std::result::Result<String, PublishError> {
        let max = Platform::Facebook.max_media();
        if media_urls.len() > max {
            return Err(PublishError::TooManyMedia {
                platform: Platform::Facebook,
                max,
                got: media_urls.len(),
            });
        }

        match media_urls {
            [] => self.publish_feed(token, page_id, message, None).await,
            [url] => {
                // Single photo call doubles as the feed post
                let photo = self
                    .upload_photo(token, page_id, url, Some(message), true)
                    .await?;
                Ok(photo.post_id.unwrap_or(photo.id))
            }
            urls => {
                let mut attached = Vec::with_capacity(urls.len());
                for url in urls {
                    let photo = self.upload_photo(token, page_id, url, None, false).await?;
                    attached.push(AttachedMedia {
                        media_fbid: photo.id,
                    });
                }
                self.publish_feed(token, page_id, message, Some(attached))
                    .await
            }
        }
    }

    async fn publish_feed(
        &self,
        token: &str,
        page_id: &str,
        message: &str,
        attached_media: Option<Vec<AttachedMedia>>,
    ) -> std::result::Result<String, PublishError> {
        let response = self
            .http
            .post(format!("{}/{}/feed", self.graph_base, page_id))
            .json(&FeedRequest {
                message,
                attached_media,
                access_token: token,
            })
            .send()
            .await
            .map_err(|e| PublishError::Network {
                platform: Platform::Facebook,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                platform: Platform::Facebook,
                body,
            });
        }

        let feed: FeedResponse = response.json().await.map_err(|e| PublishError::Network {
            platform: Platform::Facebook,
            reason: e.to_string(),
        })?;

        Ok(feed.id)
    }

    async fn upload_photo(
        &self,
        token: &str,
        page_id: &str,
        url: &str,
        message: Option<&str>,
        published: bool,
    ) -> std::result::Result<PhotoResponse, PublishError> {
        let response = self
            .http
            .post(format!("{}/{}/photos", self.graph_base, page_id))
            .json(&PhotoRequest {
                url,
                message,
                published: if published { None } else { Some(false) },
                access_token: token,
            })
            .send()
            .await
            .map_err(|e| PublishError::Network {
                platform: Platform::Facebook,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Upload {
                platform: Platform::Facebook,
                body,
            });
        }

        response.json().await.map_err(|e| PublishError::Network {
            platform: Platform::Facebook,
            reason: e.to_string(),
        })
    }
}
