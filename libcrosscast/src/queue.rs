//! Post lifecycle operations: create, edit, retry, cancel.
//!
//! Owns the status state machine around the scheduler. The scheduler
//! itself only ever moves SCHEDULED posts to PUBLISHED or FAILED; every
//! user-driven transition goes through here.

use crate::db::Database;
use crate::error::{CrosscastError, Result};
use crate::types::{NewPost, Platform, Post, PostStatus};

/// Partial update for a post.
///
/// `scheduled_at` is doubly optional: `Some(Some(t))` sets a schedule
/// (DRAFT → SCHEDULED), `Some(None)` clears it (SCHEDULED → DRAFT),
/// `None` leaves scheduling untouched.
#[derive(Debug, Default, Clone)]
pub struct PostEdit {
    pub content: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub scheduled_at: Option<Option<i64>>,
}

#[derive(Clone)]
pub struct PostQueue {
    db: Database,
}

impl PostQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a post against a connected account.
    ///
    /// Starts SCHEDULED when a schedule time is supplied, DRAFT
    /// otherwise.
    pub async fn create(&self, input: NewPost) -> Result<Post> {
        let account = self
            .db
            .get_account(&input.social_account_id)
            .await?
            .ok_or_else(|| {
                CrosscastError::InvalidInput(format!(
                    "No such social account: {}",
                    input.social_account_id
                ))
            })?;

        validate_content(account.platform, &input.content, &input.media_urls)?;

        let post = Post::from_new(input);
        self.db.create_post(&post).await?;
        Ok(post)
    }

    /// Apply a partial edit. Published posts are immutable.
    pub async fn edit(&self, post_id: &str, edit: PostEdit) -> Result<Post> {
        let mut post = self.require_post(post_id).await?;

        if post.status == PostStatus::Published {
            return Err(CrosscastError::InvalidInput(
                "Cannot edit a published post".to_string(),
            ));
        }

        if let Some(content) = edit.content {
            post.content = content;
        }
        if let Some(media_urls) = edit.media_urls {
            post.media_urls = media_urls;
        }
        if let Some(scheduled_at) = edit.scheduled_at {
            post.scheduled_at = scheduled_at;
            post.status = if scheduled_at.is_some() {
                PostStatus::Scheduled
            } else {
                PostStatus::Draft
            };
        }

        let account = self
            .db
            .get_account(&post.social_account_id)
            .await?
            .ok_or_else(|| {
                CrosscastError::InvalidInput(format!(
                    "No such social account: {}",
                    post.social_account_id
                ))
            })?;
        validate_content(account.platform, &post.content, &post.media_urls)?;

        self.db.update_post_content(&post).await?;
        Ok(post)
    }

    /// Reset a FAILED post to SCHEDULED.
    ///
    /// Clears the error message and keeps the original (already past)
    /// scheduled time, so the next tick re-attempts immediately.
    pub async fn retry(&self, post_id: &str) -> Result<Post> {
        let post = self.require_post(post_id).await?;

        if post.status != PostStatus::Failed {
            return Err(CrosscastError::InvalidInput(
                "Only failed posts can be retried".to_string(),
            ));
        }

        self.db.reset_for_retry(post_id).await?;
        self.require_post(post_id).await
    }

    /// Remove a post from the queue
    pub async fn cancel(&self, post_id: &str) -> Result<()> {
        self.require_post(post_id).await?;
        self.db.delete_post(post_id).await
    }

    pub async fn list(&self, status: Option<PostStatus>) -> Result<Vec<Post>> {
        self.db.list_posts(status).await
    }

    async fn require_post(&self, post_id: &str) -> Result<Post> {
        self.db.get_post(post_id).await?.ok_or_else(|| {
            CrosscastError::InvalidInput(format!("No such post: {post_id}"))
        })
    }
}

/// Validate content against the target platform's limits
fn validate_content(platform: Platform, content: &str, media_urls: &[String]) -> Result<()> {
    let max_media = platform.max_media();
    if media_urls.len() > max_media {
        return Err(CrosscastError::InvalidInput(format!(
            "{platform} allows at most {max_media} media items (got {})",
            media_urls.len()
        )));
    }

    if let Some(limit) = platform.character_limit() {
        let char_count = content.chars().count();
        if char_count > limit {
            return Err(CrosscastError::InvalidInput(format!(
                "Content exceeds {platform}'s {limit} character limit (current: {char_count} characters)"
            )));
        }
    }

    // Instagram posts can be caption-less as long as they carry media
    if content.trim().is_empty() && !(platform == Platform::Instagram && !media_urls.is_empty()) {
        return Err(CrosscastError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocialAccount;

    async fn setup() -> (PostQueue, Database, SocialAccount) {
        let db = Database::new(":memory:").await.unwrap();
        let account = SocialAccount::new(
            "user-1".to_string(),
            Platform::Twitter,
            "tw-1".to_string(),
            "tester".to_string(),
            "token".to_string(),
            None,
            None,
        );
        db.upsert_account(&account).await.unwrap();
        (PostQueue::new(db.clone()), db, account)
    }

    fn new_post(account: &SocialAccount, scheduled_at: Option<i64>) -> NewPost {
        NewPost {
            user_id: account.user_id.clone(),
            social_account_id: account.id.clone(),
            content: "hello world".to_string(),
            media_urls: vec![],
            scheduled_at,
        }
    }

    #[tokio::test]
    async fn test_create_without_time_is_draft() {
        let (queue, _db, account) = setup().await;
        let post = queue.create(new_post(&account, None)).await.unwrap();
        assert_eq!(post.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_create_with_time_is_scheduled() {
        let (queue, _db, account) = setup().await;
        let post = queue.create(new_post(&account, Some(9_999))).await.unwrap();
        assert_eq!(post.status, PostStatus::Scheduled);
        assert_eq!(post.scheduled_at, Some(9_999));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_account() {
        let (queue, _db, account) = setup().await;
        let mut input = new_post(&account, None);
        input.social_account_id = "nope".to_string();

        let err = queue.create(input).await.unwrap_err();
        assert!(err.to_string().contains("No such social account"));
    }

    #[tokio::test]
    async fn test_create_enforces_twitter_character_limit() {
        let (queue, _db, account) = setup().await;
        let mut input = new_post(&account, None);
        input.content = "x".repeat(281);

        let err = queue.create(input).await.unwrap_err();
        assert!(err.to_string().contains("280 character limit"));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_create_enforces_media_cap() {
        let (queue, _db, account) = setup().await;
        let mut input = new_post(&account, None);
        input.media_urls = (0..5).map(|i| format!("https://cdn.example/{i}.jpg")).collect();

        let err = queue.create(input).await.unwrap_err();
        assert!(err.to_string().contains("at most 4 media items"));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_content_except_instagram_with_media() {
        let (queue, db, _account) = setup().await;

        let ig_account = SocialAccount::new(
            "user-1".to_string(),
            Platform::Instagram,
            "ig-1".to_string(),
            "tester".to_string(),
            "token".to_string(),
            None,
            None,
        );
        db.upsert_account(&ig_account).await.unwrap();

        // Caption-less Instagram post with media is fine
        let input = NewPost {
            user_id: "user-1".to_string(),
            social_account_id: ig_account.id.clone(),
            content: "".to_string(),
            media_urls: vec!["https://cdn.example/a.jpg".to_string()],
            scheduled_at: None,
        };
        assert!(queue.create(input).await.is_ok());

        // Empty Instagram post with no media is not
        let input = NewPost {
            user_id: "user-1".to_string(),
            social_account_id: ig_account.id,
            content: "".to_string(),
            media_urls: vec![],
            scheduled_at: None,
        };
        assert!(queue.create(input).await.is_err());
    }

    #[tokio::test]
    async fn test_edit_schedules_and_unschedules() {
        let (queue, _db, account) = setup().await;
        let post = queue.create(new_post(&account, None)).await.unwrap();

        let scheduled = queue
            .edit(
                &post.id,
                PostEdit {
                    scheduled_at: Some(Some(12_345)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(scheduled.status, PostStatus::Scheduled);
        assert_eq!(scheduled.scheduled_at, Some(12_345));

        let cleared = queue
            .edit(
                &post.id,
                PostEdit {
                    scheduled_at: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.status, PostStatus::Draft);
        assert_eq!(cleared.scheduled_at, None);
    }

    #[tokio::test]
    async fn test_edit_content_without_touching_schedule() {
        let (queue, _db, account) = setup().await;
        let post = queue.create(new_post(&account, Some(5_000))).await.unwrap();

        let edited = queue
            .edit(
                &post.id,
                PostEdit {
                    content: Some("updated".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.content, "updated");
        assert_eq!(edited.status, PostStatus::Scheduled);
        assert_eq!(edited.scheduled_at, Some(5_000));
    }

    #[tokio::test]
    async fn test_edit_published_post_is_rejected() {
        let (queue, db, account) = setup().await;
        let post = queue.create(new_post(&account, Some(1))).await.unwrap();
        db.mark_published(&post.id, "tweet-1", 2).await.unwrap();

        let err = queue
            .edit(
                &post.id,
                PostEdit {
                    content: Some("too late".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Cannot edit a published post"));
    }

    #[tokio::test]
    async fn test_retry_only_applies_to_failed_posts() {
        let (queue, db, account) = setup().await;
        let post = queue.create(new_post(&account, Some(1_000))).await.unwrap();

        let err = queue.retry(&post.id).await.unwrap_err();
        assert!(err.to_string().contains("Only failed posts can be retried"));

        db.mark_failed(&post.id, "boom").await.unwrap();

        let retried = queue.retry(&post.id).await.unwrap();
        assert_eq!(retried.status, PostStatus::Scheduled);
        assert_eq!(retried.error_message, None);
        // The original, already-past schedule survives
        assert_eq!(retried.scheduled_at, Some(1_000));
    }

    #[tokio::test]
    async fn test_cancel_removes_post() {
        let (queue, db, account) = setup().await;
        let post = queue.create(new_post(&account, None)).await.unwrap();

        queue.cancel(&post.id).await.unwrap();
        assert!(db.get_post(&post.id).await.unwrap().is_none());

        let err = queue.cancel(&post.id).await.unwrap_err();
        assert!(err.to_string().contains("No such post"));
    }
}
