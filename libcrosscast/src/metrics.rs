//! Engagement metrics fetchers.
//!
//! Fetchers never fail: any transport error, non-success status, or
//! missing field degrades to `None` (or a `None` field) so a metrics
//! problem can never mark a post FAILED.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::config::ApiEndpoints;
use crate::types::{Platform, PostMetrics};

/// Fetches engagement counts for one published post
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(
        &self,
        platform: Platform,
        token: &str,
        platform_post_id: &str,
    ) -> Option<PostMetrics>;
}

pub struct MetricsClient {
    http: reqwest::Client,
    twitter_base: String,
    graph_base: String,
}

#[derive(Deserialize)]
struct TweetLookupResponse {
    data: Option<TweetLookupData>,
}

#[derive(Deserialize)]
struct TweetLookupData {
    public_metrics: Option<TweetPublicMetrics>,
}

#[derive(Deserialize)]
struct TweetPublicMetrics {
    like_count: Option<i64>,
    reply_count: Option<i64>,
    retweet_count: Option<i64>,
    /// Absent under limited API access tiers
    impression_count: Option<i64>,
}

#[derive(Deserialize)]
struct FbPostResponse {
    likes: Option<FbSummaryWrap>,
    comments: Option<FbSummaryWrap>,
    shares: Option<FbShares>,
    insights: Option<FbInsights>,
}

#[derive(Deserialize)]
struct FbSummaryWrap {
    summary: Option<FbSummary>,
}

#[derive(Deserialize)]
struct FbSummary {
    total_count: Option<i64>,
}

#[derive(Deserialize)]
struct FbShares {
    count: Option<i64>,
}

#[derive(Deserialize)]
struct FbInsights {
    #[serde(default)]
    data: Vec<NamedMetricEntry>,
}

#[derive(Deserialize)]
struct IgInsightsResponse {
    #[serde(default)]
    data: Vec<NamedMetricEntry>,
}

#[derive(Deserialize)]
struct NamedMetricEntry {
    name: String,
    #[serde(default)]
    values: Vec<MetricValue>,
}

#[derive(Deserialize)]
struct MetricValue {
    value: Option<i64>,
}

impl MetricsClient {
    pub fn new(http: reqwest::Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            http,
            twitter_base: endpoints.twitter_base.clone(),
            graph_base: endpoints.graph_base.clone(),
        }
    }

    async fn fetch_twitter(&self, token: &str, tweet_id: &str) -> Option<PostMetrics> {
        let response = self
            .http
            .get(format!("{}/2/tweets/{}", self.twitter_base, tweet_id))
            .query(&[("tweet.fields", "public_metrics")])
            .bearer_auth(token)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(tweet = tweet_id, status = %response.status(), "twitter metrics fetch skipped");
            return None;
        }

        let lookup: TweetLookupResponse = response.json().await.ok()?;
        let metrics = lookup.data?.public_metrics?;

        Some(PostMetrics {
            likes: metrics.like_count,
            comments: metrics.reply_count,
            shares: metrics.retweet_count,
            impressions: metrics.impression_count,
            reach: None,
            saves: None,
            updated_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn fetch_facebook(&self, token: &str, post_id: &str) -> Option<PostMetrics> {
        let response = self
            .http
            .get(format!("{}/{}", self.graph_base, post_id))
            .query(&[
                (
                    "fields",
                    "likes.summary(true),comments.summary(true),shares,insights.metric(post_impressions)",
                ),
                ("access_token", token),
            ])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(post = post_id, status = %response.status(), "facebook metrics fetch skipped");
            return None;
        }

        let post: FbPostResponse = response.json().await.ok()?;

        // Every sub-object degrades to None on its own
        let likes = post.likes.and_then(|l| l.summary).and_then(|s| s.total_count);
        let comments = post
            .comments
            .and_then(|c| c.summary)
            .and_then(|s| s.total_count);
        let shares = post.shares.and_then(|s| s.count);
        let impressions = post
            .insights
            .map(|i| i.data)
            .unwrap_or_default()
            .into_iter()
            .find(|entry| entry.name == "post_impressions")
            .and_then(|entry| entry.values.into_iter().next())
            .and_then(|v| v.value);

        Some(PostMetrics {
            likes,
            comments,
            shares,
            impressions,
            reach: None,
            saves: None,
            updated_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn fetch_instagram(&self, token: &str, media_id: &str) -> Option<PostMetrics> {
        let response = self
            .http
            .get(format!("{}/{}/insights", self.graph_base, media_id))
            .query(&[
                ("metric", "impressions,reach,likes,comments,saves"),
                ("access_token", token),
            ])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(media = media_id, status = %response.status(), "instagram metrics fetch skipped");
            return None;
        }

        let insights: IgInsightsResponse = response.json().await.ok()?;

        let mut by_name: HashMap<String, Option<i64>> = HashMap::new();
        for entry in insights.data {
            let value = entry.values.into_iter().next().and_then(|v| v.value);
            by_name.insert(entry.name, value);
        }

        Some(PostMetrics {
            likes: by_name.get("likes").copied().flatten(),
            comments: by_name.get("comments").copied().flatten(),
            // Instagram has no share metric
            shares: None,
            impressions: by_name.get("impressions").copied().flatten(),
            reach: by_name.get("reach").copied().flatten(),
            saves: by_name.get("saves").copied().flatten(),
            updated_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[async_trait]
impl MetricsSource for MetricsClient {
    async fn fetch(
        &self,
        platform: Platform,
        token: &str,
        platform_post_id: &str,
    ) -> Option<PostMetrics> {
        match platform {
            Platform::Twitter => self.fetch_twitter(token, platform_post_id).await,
            Platform::Facebook => self.fetch_facebook(token, platform_post_id).await,
            Platform::Instagram => self.fetch_instagram(token, platform_post_id).await,
        }
    }
}

/// Scripted metrics source for tests; records fetched ids
#[derive(Default)]
pub struct MockMetricsSource {
    outcomes: Mutex<HashMap<String, Option<PostMetrics>>>,
    calls: Mutex<Vec<String>>,
}

impl MockMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, platform_post_id: &str, metrics: Option<PostMetrics>) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(platform_post_id.to_string(), metrics);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSource for MockMetricsSource {
    async fn fetch(
        &self,
        _platform: Platform,
        _token: &str,
        platform_post_id: &str,
    ) -> Option<PostMetrics> {
        self.calls
            .lock()
            .unwrap()
            .push(platform_post_id.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .get(platform_post_id)
            .cloned()
            .flatten()
    }
}
