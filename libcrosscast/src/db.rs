//! Database operations for Crosscast

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{DuePost, Platform, Post, PostMetrics, PostStatus, SocialAccount};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection and run migrations.
    ///
    /// `":memory:"` opens an in-memory database on a single pooled
    /// connection so every query sees the same schema.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            let options = SqliteConnectOptions::new()
                .in_memory(true)
                .foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);
            SqlitePool::connect_with(options)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Insert a connected account, or refresh credentials if the same
    /// platform identity is already connected.
    pub async fn upsert_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts
                (id, user_id, platform, platform_id, username, access_token, refresh_token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (platform, platform_id) DO UPDATE SET
                user_id = excluded.user_id,
                username = excluded.username,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.platform_id)
        .bind(&account.username)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_at)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, platform_id, username,
                   access_token, refresh_token, expires_at, created_at
            FROM social_accounts WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(account_from_row).transpose()
    }

    /// Find an account by its platform identity (the upsert key)
    pub async fn get_account_by_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, platform_id, username,
                   access_token, refresh_token, expires_at, created_at
            FROM social_accounts WHERE platform = ? AND platform_id = ?
            "#,
        )
        .bind(platform.as_str())
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(account_from_row).transpose()
    }

    /// Persist refreshed credentials onto an account row
    pub async fn update_account_tokens(
        &self,
        account_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_accounts
            SET access_token = ?, refresh_token = ?, expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Disconnect an account; its posts go with it
    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM social_accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let media_urls = serde_json::to_string(&post.media_urls).map_err(DbError::DecodeError)?;

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, user_id, social_account_id, content, media_urls, status,
                 scheduled_at, published_at, platform_post_id, error_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.social_account_id)
        .bind(&post.content)
        .bind(media_urls)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.platform_post_id)
        .bind(&post.error_message)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", POST_SELECT))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(post_from_row).transpose()
    }

    /// List posts, optionally filtered by status, soonest schedule first
    pub async fn list_posts(&self, status: Option<PostStatus>) -> Result<Vec<Post>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "{} WHERE status = ? ORDER BY scheduled_at ASC, created_at ASC",
                    POST_SELECT
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "{} ORDER BY scheduled_at ASC, created_at ASC",
                    POST_SELECT
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(post_from_row).collect()
    }

    /// Rewrite a post's editable fields (content, media, schedule, status)
    pub async fn update_post_content(&self, post: &Post) -> Result<()> {
        let media_urls = serde_json::to_string(&post.media_urls).map_err(DbError::DecodeError)?;

        sqlx::query(
            r#"
            UPDATE posts
            SET content = ?, media_urls = ?, status = ?, scheduled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.content)
        .bind(media_urls)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Scheduler queries
    // ------------------------------------------------------------------

    /// All SCHEDULED posts whose time has passed, with their accounts
    pub async fn due_posts(&self, now: i64) -> Result<Vec<DuePost>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.status = 'SCHEDULED' AND p.scheduled_at IS NOT NULL AND p.scheduled_at <= ?",
            DUE_POST_SELECT
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(due_post_from_row).collect()
    }

    /// PUBLISHED posts with a platform post id whose metrics were never
    /// fetched, or fetched more than `staleness_secs` ago
    pub async fn stale_published_posts(
        &self,
        now: i64,
        staleness_secs: i64,
    ) -> Result<Vec<DuePost>> {
        let cutoff = now - staleness_secs;

        let rows = sqlx::query(&format!(
            r#"{} WHERE p.status = 'PUBLISHED'
              AND p.platform_post_id IS NOT NULL
              AND (p.metrics_updated_at IS NULL OR p.metrics_updated_at <= ?)"#,
            DUE_POST_SELECT
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(due_post_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Scheduler outcome writes
    // ------------------------------------------------------------------

    pub async fn mark_published(
        &self,
        post_id: &str,
        platform_post_id: &str,
        published_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET status = 'PUBLISHED', published_at = ?, platform_post_id = ?, error_message = NULL
            WHERE id = ?
            "#,
        )
        .bind(published_at)
        .bind(platform_post_id)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn mark_failed(&self, post_id: &str, error_message: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET status = 'FAILED', error_message = ? WHERE id = ?")
            .bind(error_message)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Reset a failed post for another attempt; keeps scheduled_at so
    /// the next tick picks it up immediately
    pub async fn reset_for_retry(&self, post_id: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET status = 'SCHEDULED', error_message = NULL WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Persist a fetched metrics bundle verbatim
    pub async fn update_metrics(&self, post_id: &str, metrics: &PostMetrics) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET metrics_likes = ?, metrics_comments = ?, metrics_shares = ?,
                metrics_impressions = ?, metrics_reach = ?, metrics_saves = ?,
                metrics_updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(metrics.likes)
        .bind(metrics.comments)
        .bind(metrics.shares)
        .bind(metrics.impressions)
        .bind(metrics.reach)
        .bind(metrics.saves)
        .bind(metrics.updated_at)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

const POST_SELECT: &str = r#"
    SELECT id, user_id, social_account_id, content, media_urls, status,
           scheduled_at, published_at, platform_post_id, error_message,
           metrics_likes, metrics_comments, metrics_shares, metrics_impressions,
           metrics_reach, metrics_saves, metrics_updated_at, created_at
    FROM posts
"#;

const DUE_POST_SELECT: &str = r#"
    SELECT p.id, p.user_id, p.social_account_id, p.content, p.media_urls, p.status,
           p.scheduled_at, p.published_at, p.platform_post_id, p.error_message,
           p.metrics_likes, p.metrics_comments, p.metrics_shares, p.metrics_impressions,
           p.metrics_reach, p.metrics_saves, p.metrics_updated_at, p.created_at,
           a.id AS account_id, a.user_id AS account_user_id, a.platform,
           a.platform_id, a.username, a.access_token, a.refresh_token,
           a.expires_at, a.created_at AS account_created_at
    FROM posts p
    JOIN social_accounts a ON a.id = p.social_account_id
"#;

fn parse_platform(value: String) -> std::result::Result<Platform, DbError> {
    Platform::parse(&value).ok_or_else(|| {
        DbError::SqlxError(sqlx::Error::Decode(
            format!("unknown platform: {value}").into(),
        ))
    })
}

fn parse_status(value: String) -> std::result::Result<PostStatus, DbError> {
    PostStatus::parse(&value).ok_or_else(|| {
        DbError::SqlxError(sqlx::Error::Decode(
            format!("unknown post status: {value}").into(),
        ))
    })
}

fn account_from_row(row: SqliteRow) -> Result<SocialAccount> {
    Ok(SocialAccount {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: parse_platform(row.get::<String, _>("platform"))?,
        platform_id: row.get("platform_id"),
        username: row.get("username"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

fn post_from_row(row: SqliteRow) -> Result<Post> {
    let media_urls: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("media_urls")).map_err(DbError::DecodeError)?;

    let metrics = row
        .get::<Option<i64>, _>("metrics_updated_at")
        .map(|updated_at| PostMetrics {
            likes: row.get("metrics_likes"),
            comments: row.get("metrics_comments"),
            shares: row.get("metrics_shares"),
            impressions: row.get("metrics_impressions"),
            reach: row.get("metrics_reach"),
            saves: row.get("metrics_saves"),
            updated_at,
        });

    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        social_account_id: row.get("social_account_id"),
        content: row.get("content"),
        media_urls,
        status: parse_status(row.get::<String, _>("status"))?,
        scheduled_at: row.get("scheduled_at"),
        published_at: row.get("published_at"),
        platform_post_id: row.get("platform_post_id"),
        error_message: row.get("error_message"),
        metrics,
        created_at: row.get("created_at"),
    })
}

fn due_post_from_row(row: SqliteRow) -> Result<DuePost> {
    let account = SocialAccount {
        id: row.get("account_id"),
        user_id: row.get("account_user_id"),
        platform: parse_platform(row.get::<String, _>("platform"))?,
        platform_id: row.get("platform_id"),
        username: row.get("username"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        created_at: row.get("account_created_at"),
    };

    let media_urls: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("media_urls")).map_err(DbError::DecodeError)?;

    let metrics = row
        .get::<Option<i64>, _>("metrics_updated_at")
        .map(|updated_at| PostMetrics {
            likes: row.get("metrics_likes"),
            comments: row.get("metrics_comments"),
            shares: row.get("metrics_shares"),
            impressions: row.get("metrics_impressions"),
            reach: row.get("metrics_reach"),
            saves: row.get("metrics_saves"),
            updated_at,
        });

    let post = Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        social_account_id: row.get("social_account_id"),
        content: row.get("content"),
        media_urls,
        status: parse_status(row.get::<String, _>("status"))?,
        scheduled_at: row.get("scheduled_at"),
        published_at: row.get("published_at"),
        platform_post_id: row.get("platform_post_id"),
        error_message: row.get("error_message"),
        metrics,
        created_at: row.get("created_at"),
    };

    Ok(DuePost { post, account })
}
