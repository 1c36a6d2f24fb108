//! Error types for Crosscast

use thiserror::Error;

use crate::types::Platform;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::InvalidInput(_) => 3,
            CrosscastError::Refresh(_) => 2,
            CrosscastError::Publish(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt column value: {0}")]
    DecodeError(#[from] serde_json::Error),
}

/// Credential refresh failed or is unavailable.
///
/// Surfaces as the post's stored error message and marks the post FAILED.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    #[error("token expired and no refresh token available")]
    MissingRefreshToken,

    #[error("token refresh rejected: {0}")]
    Exchange(String),

    #[error("token refresh request failed: {0}")]
    Network(String),
}

/// The platform rejected a publish at some phase of its protocol.
///
/// Each variant names the phase that failed and carries the platform's
/// raw error body so the stored error message stays diagnostic.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("{platform} media fetch failed for {url}: {reason}")]
    MediaFetch {
        platform: Platform,
        url: String,
        reason: String,
    },

    #[error("{platform} media upload failed: {body}")]
    Upload { platform: Platform, body: String },

    #[error("instagram container creation failed: {body}")]
    Container { body: String },

    #[error("instagram container status check failed: {body}")]
    StatusCheck { body: String },

    #[error("instagram container {container_id} not ready after {waited_secs}s")]
    ProcessingTimeout {
        container_id: String,
        waited_secs: u64,
    },

    #[error("{platform} publish failed: {body}")]
    Rejected { platform: Platform, body: String },

    #[error("instagram posts require at least one image")]
    NoMedia,

    #[error("{platform} allows at most {max} media items (got {got})")]
    TooManyMedia {
        platform: Platform,
        max: usize,
        got: usize,
    },

    #[error("{platform} request failed: {reason}")]
    Network { platform: Platform, reason: String },
}
