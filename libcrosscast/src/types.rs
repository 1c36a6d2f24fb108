//! Core types for Crosscast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target social platform of a connected account.
///
/// The platform determines which adapter publishes a post and which
/// media/character caps apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Twitter,
    Instagram,
    Facebook,
}

impl Platform {
    /// Storage form, as persisted in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "TWITTER",
            Platform::Instagram => "INSTAGRAM",
            Platform::Facebook => "FACEBOOK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TWITTER" => Some(Platform::Twitter),
            "INSTAGRAM" => Some(Platform::Instagram),
            "FACEBOOK" => Some(Platform::Facebook),
            _ => None,
        }
    }

    /// Whether this platform's access tokens expire and need refreshing.
    ///
    /// Meta Page Access Tokens are long-lived and never refreshed.
    pub fn credentials_expire(&self) -> bool {
        matches!(self, Platform::Twitter)
    }

    /// Maximum number of media items in a single post
    pub fn max_media(&self) -> usize {
        match self {
            Platform::Twitter => 4,
            Platform::Instagram => 10,
            Platform::Facebook => 10,
        }
    }

    /// Character limit for post content, if the platform has a hard one
    pub fn character_limit(&self) -> Option<usize> {
        match self {
            Platform::Twitter => Some(280),
            Platform::Instagram | Platform::Facebook => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Twitter => write!(f, "twitter"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::Facebook => write!(f, "facebook"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "DRAFT",
            PostStatus::Scheduled => "SCHEDULED",
            PostStatus::Published => "PUBLISHED",
            PostStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(PostStatus::Draft),
            "SCHEDULED" => Some(PostStatus::Scheduled),
            "PUBLISHED" => Some(PostStatus::Published),
            "FAILED" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One connected platform identity, owned by a user.
///
/// Unique per (platform, platform_id); reconnecting the same identity
/// upserts fresh credentials onto the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    /// Platform-side identity id (Twitter user id, IG user id, FB page id)
    pub platform_id: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp; None means the credential has no known expiry
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl SocialAccount {
    pub fn new(
        user_id: String,
        platform: Platform,
        platform_id: String,
        username: String,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            platform_id,
            username,
            access_token,
            refresh_token,
            expires_at,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Engagement counts for a published post.
///
/// Every field is optional because platforms expose different subsets;
/// `updated_at` is the fetch time and drives the staleness window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub impressions: Option<i64>,
    pub reach: Option<i64>,
    pub saves: Option<i64>,
    pub updated_at: i64,
}

/// A unit of schedulable content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub social_account_id: String,
    pub content: String,
    /// Ordered media URLs; order is preserved through to the platform
    pub media_urls: Vec<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    /// Platform-assigned id, set once the post is published
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
    /// None until the first successful metrics fetch
    pub metrics: Option<PostMetrics>,
    pub created_at: i64,
}

/// Input for creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub social_account_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub scheduled_at: Option<i64>,
}

impl Post {
    /// Build a post from creation input.
    ///
    /// Starts SCHEDULED when a schedule time is supplied, DRAFT otherwise.
    pub fn from_new(input: NewPost) -> Self {
        let status = if input.scheduled_at.is_some() {
            PostStatus::Scheduled
        } else {
            PostStatus::Draft
        };

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id,
            social_account_id: input.social_account_id,
            content: input.content,
            media_urls: input.media_urls,
            status,
            scheduled_at: input.scheduled_at,
            published_at: None,
            platform_post_id: None,
            error_message: None,
            metrics: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A due post joined with the account that publishes it
#[derive(Debug, Clone)]
pub struct DuePost {
    pub post: Post,
    pub account: SocialAccount,
}
