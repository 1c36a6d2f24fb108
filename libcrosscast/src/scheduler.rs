//! Scheduled publishing and metrics refresh orchestration.
//!
//! A tick selects every due post, obtains a valid token per account,
//! dispatches to the right adapter, and records one outcome per post.
//! Posts are processed concurrently and settled as a group: one post's
//! failure never touches its siblings.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{CrosscastError, Result};
use crate::metrics::{MetricsClient, MetricsSource};
use crate::platforms::{twitter::TwitterAdapter, PlatformRouter, Publisher};
use crate::token::TokenGuard;
use crate::types::DuePost;

/// Outcome of one post in a publish tick
#[derive(Debug, Clone, Serialize)]
pub struct PostOutcome {
    pub post_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one publish tick
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub processed: usize,
    pub results: Vec<PostOutcome>,
}

/// Result of one metrics refresh pass
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRefreshSummary {
    pub checked: usize,
    pub updated: usize,
}

pub struct Scheduler {
    db: Database,
    token_guard: TokenGuard,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<dyn MetricsSource>,
    metrics_staleness_secs: i64,
    /// Serializes ticks so an external trigger firing mid-tick waits
    /// instead of processing the same due posts twice
    tick_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        token_guard: TokenGuard,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<dyn MetricsSource>,
        metrics_staleness_minutes: i64,
    ) -> Self {
        Self {
            db,
            token_guard,
            publisher,
            metrics,
            metrics_staleness_secs: metrics_staleness_minutes * 60,
            tick_lock: Mutex::new(()),
        }
    }

    /// Wire up the real adapter set from configuration
    pub fn from_config(config: &Config, db: Database) -> Self {
        let http = reqwest::Client::new();
        let endpoints = &config.api;

        let router = PlatformRouter::new(http.clone(), endpoints, config.twitter.clone());
        let refresher = Arc::new(TwitterAdapter::new(
            http.clone(),
            endpoints,
            config.twitter.clone(),
        ));
        let metrics = Arc::new(MetricsClient::new(http, endpoints));
        let token_guard = TokenGuard::new(db.clone(), refresher);

        Self::new(
            db,
            token_guard,
            Arc::new(router),
            metrics,
            config.scheduler.metrics_staleness_minutes,
        )
    }

    /// Publish every due post; returns one outcome per post.
    ///
    /// Only a failure of the due-post query itself propagates.
    pub async fn run_scheduler(&self) -> Result<TickSummary> {
        let _tick = self.tick_lock.lock().await;

        let now = chrono::Utc::now().timestamp();
        let due = self.db.due_posts(now).await?;

        if due.is_empty() {
            return Ok(TickSummary {
                processed: 0,
                results: vec![],
            });
        }

        info!(count = due.len(), "processing due posts");

        let results = join_all(due.into_iter().map(|post| self.publish_one(post, now))).await;

        Ok(TickSummary {
            processed: results.len(),
            results,
        })
    }

    async fn publish_one(&self, due: DuePost, now: i64) -> PostOutcome {
        let DuePost { post, account } = due;

        let attempt = async {
            let token = self.token_guard.ensure_valid_token(&account).await?;
            let platform_post_id = self
                .publisher
                .publish(
                    account.platform,
                    &token,
                    &account.platform_id,
                    &post.content,
                    &post.media_urls,
                )
                .await?;
            Ok::<String, CrosscastError>(platform_post_id)
        };
        let outcome = attempt.await;

        match outcome {
            Ok(platform_post_id) => {
                if let Err(e) = self.db.mark_published(&post.id, &platform_post_id, now).await {
                    warn!(post = %post.id, "failed to record publish outcome: {e}");
                }
                info!(post = %post.id, platform = %account.platform, id = %platform_post_id, "published");
                PostOutcome {
                    post_id: post.id,
                    success: true,
                    platform_post_id: Some(platform_post_id),
                    error: None,
                }
            }
            Err(err) => {
                let message = failure_message(&err);
                if let Err(e) = self.db.mark_failed(&post.id, &message).await {
                    warn!(post = %post.id, "failed to record publish failure: {e}");
                }
                warn!(post = %post.id, platform = %account.platform, "publish failed: {message}");
                PostOutcome {
                    post_id: post.id,
                    success: false,
                    platform_post_id: None,
                    error: Some(message),
                }
            }
        }
    }

    /// Refresh metrics for published posts whose bundle has gone stale.
    ///
    /// Best-effort per post: a fetcher returning nothing, a token
    /// failure, or a transport error skips that post without marking it
    /// FAILED and without touching siblings.
    pub async fn run_metrics_refresh(&self) -> Result<MetricsRefreshSummary> {
        let _tick = self.tick_lock.lock().await;

        let now = chrono::Utc::now().timestamp();
        let stale = self
            .db
            .stale_published_posts(now, self.metrics_staleness_secs)
            .await?;

        if stale.is_empty() {
            return Ok(MetricsRefreshSummary {
                checked: 0,
                updated: 0,
            });
        }

        info!(count = stale.len(), "refreshing stale metrics");

        let outcomes = join_all(stale.into_iter().map(|post| self.refresh_one(post))).await;
        let updated = outcomes.iter().filter(|updated| **updated).count();

        Ok(MetricsRefreshSummary {
            checked: outcomes.len(),
            updated,
        })
    }

    async fn refresh_one(&self, due: DuePost) -> bool {
        let DuePost { post, account } = due;

        let platform_post_id = match post.platform_post_id.as_deref() {
            Some(id) => id,
            None => return false,
        };

        let token = match self.token_guard.ensure_valid_token(&account).await {
            Ok(token) => token,
            Err(e) => {
                warn!(post = %post.id, "metrics refresh skipped: {e}");
                return false;
            }
        };

        match self
            .metrics
            .fetch(account.platform, &token, platform_post_id)
            .await
        {
            Some(metrics) => {
                if let Err(e) = self.db.update_metrics(&post.id, &metrics).await {
                    warn!(post = %post.id, "failed to store metrics: {e}");
                    return false;
                }
                true
            }
            // No data is not an error; leave the row untouched
            None => false,
        }
    }
}

/// The text stored on a FAILED post: the causing error's own message,
/// without the top-level wrapper prefix
fn failure_message(err: &CrosscastError) -> String {
    match err {
        CrosscastError::Refresh(e) => e.to_string(),
        CrosscastError::Publish(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PublishError, RefreshError};
    use crate::metrics::MockMetricsSource;
    use crate::platforms::mock::MockPublisher;
    use crate::token::{RefreshedCredentials, TokenRefresher};
    use crate::types::{NewPost, Platform, Post, PostMetrics, PostStatus, SocialAccount};
    use async_trait::async_trait;

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(
            &self,
            _refresh_token: &str,
        ) -> std::result::Result<RefreshedCredentials, RefreshError> {
            Err(RefreshError::Exchange("refresh not available".to_string()))
        }
    }

    struct Harness {
        db: Database,
        publisher: Arc<MockPublisher>,
        metrics: Arc<MockMetricsSource>,
        scheduler: Scheduler,
    }

    async fn harness() -> Harness {
        let db = Database::new(":memory:").await.unwrap();
        let publisher = Arc::new(MockPublisher::new());
        let metrics = Arc::new(MockMetricsSource::new());
        let token_guard = TokenGuard::new(db.clone(), Arc::new(NoRefresh));
        let scheduler = Scheduler::new(
            db.clone(),
            token_guard,
            publisher.clone(),
            metrics.clone(),
            50,
        );
        Harness {
            db,
            publisher,
            metrics,
            scheduler,
        }
    }

    async fn account(db: &Database, platform: Platform) -> SocialAccount {
        let account = SocialAccount::new(
            "user-1".to_string(),
            platform,
            format!("{platform}-id"),
            "tester".to_string(),
            "valid-token".to_string(),
            None,
            None,
        );
        db.upsert_account(&account).await.unwrap();
        account
    }

    async fn scheduled_post(
        db: &Database,
        account: &SocialAccount,
        content: &str,
        scheduled_at: i64,
    ) -> Post {
        let post = Post::from_new(NewPost {
            user_id: account.user_id.clone(),
            social_account_id: account.id.clone(),
            content: content.to_string(),
            media_urls: vec![],
            scheduled_at: Some(scheduled_at),
        });
        db.create_post(&post).await.unwrap();
        post
    }

    fn past() -> i64 {
        chrono::Utc::now().timestamp() - 1
    }

    fn future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_due_twitter_post_is_published() {
        let h = harness().await;
        let account = account(&h.db, Platform::Twitter).await;
        let post = scheduled_post(&h.db, &account, "ship it", past()).await;
        h.publisher.succeed("ship it", "tweet-123");

        let summary = h.scheduler.run_scheduler().await.unwrap();

        assert_eq!(summary.processed, 1);
        assert!(summary.results[0].success);
        assert_eq!(
            summary.results[0].platform_post_id.as_deref(),
            Some("tweet-123")
        );

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert_eq!(stored.platform_post_id, Some("tweet-123".to_string()));
        assert!(stored.published_at.is_some());

        // The adapter saw the account's token and identity
        let calls = h.publisher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].platform, Platform::Twitter);
        assert_eq!(calls[0].token, "valid-token");
    }

    #[tokio::test]
    async fn test_rejected_publish_marks_post_failed() {
        let h = harness().await;
        let account = account(&h.db, Platform::Twitter).await;
        let post = scheduled_post(&h.db, &account, "doomed", past()).await;
        h.publisher.fail(
            "doomed",
            PublishError::Rejected {
                platform: Platform::Twitter,
                body: "Twitter API error".to_string(),
            },
        );

        let summary = h.scheduler.run_scheduler().await.unwrap();

        assert_eq!(summary.processed, 1);
        assert!(!summary.results[0].success);

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        let message = stored.error_message.unwrap();
        assert!(message.contains("Twitter API error"));
        // The wrapper prefix is not part of the stored message
        assert!(!message.starts_with("Publish failed"));
    }

    #[tokio::test]
    async fn test_future_posts_are_left_alone() {
        let h = harness().await;
        let account = account(&h.db, Platform::Twitter).await;
        let post = scheduled_post(&h.db, &account, "later", future()).await;

        let summary = h.scheduler.run_scheduler().await.unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(h.publisher.call_count(), 0);

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_mixed_batch_settles_every_post() {
        let h = harness().await;
        let account = account(&h.db, Platform::Facebook).await;

        let ok_a = scheduled_post(&h.db, &account, "post a", past()).await;
        let bad = scheduled_post(&h.db, &account, "post b", past()).await;
        let ok_c = scheduled_post(&h.db, &account, "post c", past()).await;

        h.publisher.succeed("post a", "fb-1");
        h.publisher.fail(
            "post b",
            PublishError::Rejected {
                platform: Platform::Facebook,
                body: "(#200) permissions error".to_string(),
            },
        );
        h.publisher.succeed("post c", "fb-2");

        let summary = h.scheduler.run_scheduler().await.unwrap();

        // N outcomes for N due posts, failures isolated
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.results.iter().filter(|r| r.success).count(), 2);

        // Every post left SCHEDULED for exactly one terminal state
        for (id, status) in [
            (&ok_a.id, PostStatus::Published),
            (&bad.id, PostStatus::Failed),
            (&ok_c.id, PostStatus::Published),
        ] {
            let stored = h.db.get_post(id).await.unwrap().unwrap();
            assert_eq!(stored.status, status);
        }
    }

    #[tokio::test]
    async fn test_token_refresh_failure_marks_post_failed() {
        let h = harness().await;

        // Expired Twitter token with no refresh credential
        let account = SocialAccount::new(
            "user-1".to_string(),
            Platform::Twitter,
            "tw-1".to_string(),
            "tester".to_string(),
            "expired-token".to_string(),
            None,
            Some(chrono::Utc::now().timestamp() - 100),
        );
        h.db.upsert_account(&account).await.unwrap();
        let post = scheduled_post(&h.db, &account, "needs token", past()).await;

        let summary = h.scheduler.run_scheduler().await.unwrap();

        assert_eq!(summary.processed, 1);
        assert!(!summary.results[0].success);
        // The publisher was never reached
        assert_eq!(h.publisher.call_count(), 0);

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored
            .error_message
            .unwrap()
            .contains("no refresh token available"));
    }

    #[tokio::test]
    async fn test_retried_post_is_picked_up_next_tick() {
        let h = harness().await;
        let account = account(&h.db, Platform::Twitter).await;
        let post = scheduled_post(&h.db, &account, "flaky", past()).await;

        h.publisher.fail(
            "flaky",
            PublishError::Network {
                platform: Platform::Twitter,
                reason: "connection reset".to_string(),
            },
        );
        h.scheduler.run_scheduler().await.unwrap();
        assert_eq!(
            h.db.get_post(&post.id).await.unwrap().unwrap().status,
            PostStatus::Failed
        );

        // User retries; the original (past) scheduled_at is kept
        h.db.reset_for_retry(&post.id).await.unwrap();
        h.publisher.succeed("flaky", "tweet-999");

        let summary = h.scheduler.run_scheduler().await.unwrap();
        assert_eq!(summary.processed, 1);

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert_eq!(stored.platform_post_id, Some("tweet-999".to_string()));
    }

    #[tokio::test]
    async fn test_metrics_refresh_persists_fetched_bundle() {
        let h = harness().await;
        let account = account(&h.db, Platform::Instagram).await;
        let post = scheduled_post(&h.db, &account, "published", past()).await;
        h.db.mark_published(&post.id, "ig-42", past()).await.unwrap();

        let bundle = PostMetrics {
            likes: Some(10),
            comments: Some(2),
            shares: None,
            impressions: Some(300),
            reach: Some(250),
            saves: Some(5),
            updated_at: chrono::Utc::now().timestamp(),
        };
        h.metrics.set("ig-42", Some(bundle.clone()));

        let summary = h.scheduler.run_metrics_refresh().await.unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.updated, 1);

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.metrics, Some(bundle));
        // Publish state is untouched by metrics traffic
        assert_eq!(stored.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_metrics_fetcher_returning_none_writes_nothing() {
        let h = harness().await;
        let account = account(&h.db, Platform::Twitter).await;
        let post = scheduled_post(&h.db, &account, "published", past()).await;
        h.db.mark_published(&post.id, "tweet-7", past()).await.unwrap();
        // No scripted outcome: the mock returns None

        let summary = h.scheduler.run_metrics_refresh().await.unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.updated, 0);

        let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
        assert!(stored.metrics.is_none());
        assert_eq!(stored.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_metrics_token_failure_skips_post_but_not_siblings() {
        let h = harness().await;

        // This account cannot produce a token (expired, no refresh)
        let broken = SocialAccount::new(
            "user-1".to_string(),
            Platform::Twitter,
            "tw-broken".to_string(),
            "tester".to_string(),
            "expired".to_string(),
            None,
            Some(chrono::Utc::now().timestamp() - 100),
        );
        h.db.upsert_account(&broken).await.unwrap();
        let skipped = scheduled_post(&h.db, &broken, "skipped", past()).await;
        h.db.mark_published(&skipped.id, "tweet-a", past())
            .await
            .unwrap();

        let healthy = account(&h.db, Platform::Instagram).await;
        let refreshed = scheduled_post(&h.db, &healthy, "refreshed", past()).await;
        h.db.mark_published(&refreshed.id, "ig-b", past())
            .await
            .unwrap();
        h.metrics.set(
            "ig-b",
            Some(PostMetrics {
                likes: Some(1),
                comments: None,
                shares: None,
                impressions: None,
                reach: None,
                saves: None,
                updated_at: chrono::Utc::now().timestamp(),
            }),
        );

        let summary = h.scheduler.run_metrics_refresh().await.unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.updated, 1);

        // The broken post is neither FAILED nor updated
        let stored = h.db.get_post(&skipped.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.metrics.is_none());

        let stored = h.db.get_post(&refreshed.id).await.unwrap().unwrap();
        assert!(stored.metrics.is_some());
    }

    #[tokio::test]
    async fn test_fresh_metrics_are_not_refetched() {
        let h = harness().await;
        let account = account(&h.db, Platform::Facebook).await;
        let post = scheduled_post(&h.db, &account, "published", past()).await;
        h.db.mark_published(&post.id, "fb-9", past()).await.unwrap();
        h.db.update_metrics(
            &post.id,
            &PostMetrics {
                likes: Some(1),
                comments: None,
                shares: None,
                impressions: None,
                reach: None,
                saves: None,
                updated_at: chrono::Utc::now().timestamp(),
            },
        )
        .await
        .unwrap();

        let summary = h.scheduler.run_metrics_refresh().await.unwrap();
        assert_eq!(summary.checked, 0);
        assert!(h.metrics.calls().is_empty());
    }

    #[test]
    fn test_failure_message_strips_wrapper_prefix() {
        let refresh: CrosscastError = RefreshError::MissingRefreshToken.into();
        assert_eq!(
            failure_message(&refresh),
            "token expired and no refresh token available"
        );

        let publish: CrosscastError = PublishError::NoMedia.into();
        assert_eq!(
            failure_message(&publish),
            "instagram posts require at least one image"
        );
    }
}
