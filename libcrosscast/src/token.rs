//! Token Guard: hands the scheduler a currently-valid access token,
//! refreshing and persisting expiring credentials when needed.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::db::Database;
use crate::error::{RefreshError, Result};
use crate::types::SocialAccount;

/// Seconds of validity an access token must still have before the guard
/// hands it out without refreshing
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// New credentials returned by a refresh exchange
#[derive(Debug, Clone)]
pub struct RefreshedCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// The platform-side refresh exchange, separate from publishing.
///
/// Implemented by the Twitter adapter; mocked in tests.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<RefreshedCredentials, RefreshError>;
}

pub struct TokenGuard {
    db: Database,
    refresher: Arc<dyn TokenRefresher>,
}

impl TokenGuard {
    pub fn new(db: Database, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { db, refresher }
    }

    /// Return a valid access token for the account.
    ///
    /// No expiry, or more than [`REFRESH_BUFFER_SECS`] of validity left:
    /// the stored token is returned without any network call or write.
    /// Instagram/Facebook Page tokens never expire and are exempt from
    /// refresh entirely. Otherwise the refresh credential is exchanged
    /// and the new pair is persisted onto the account row (one write).
    ///
    /// Two concurrent calls for the same account may both refresh; the
    /// exchange is idempotent platform-side and the last write wins.
    pub async fn ensure_valid_token(&self, account: &SocialAccount) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        let expiring = match account.expires_at {
            None => false,
            Some(expires_at) => expires_at - now <= REFRESH_BUFFER_SECS,
        };

        if !expiring {
            return Ok(account.access_token.clone());
        }

        if !account.platform.credentials_expire() {
            return Ok(account.access_token.clone());
        }

        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(RefreshError::MissingRefreshToken)?;

        debug!(account = %account.id, platform = %account.platform, "refreshing access token");

        let refreshed = self.refresher.refresh(refresh_token).await?;

        self.db
            .update_account_tokens(
                &account.id,
                &refreshed.access_token,
                refreshed.refresh_token.as_deref(),
                refreshed.expires_at,
            )
            .await?;

        Ok(refreshed.access_token)
    }
}
