use thiserror::Error;

use crate::common::types::{ChannelId, GuildId, MessageId};

/// Failures of the snapshot store and its backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("snapshot schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("remote store request failed: {0}")]
    Remote(String),

    #[error("remote store answered {status} for {path}")]
    RemoteStatus { status: u16, path: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<base64::DecodeError> for StoreError {
    fn from(e: base64::DecodeError) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Remote(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by the chat platform collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("guild {0} not found")]
    GuildNotFound(GuildId),

    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    #[error("missing permission: {0}")]
    Forbidden(String),

    #[error("platform request failed: {0}")]
    Transport(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Failures of the live player.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player for guild {0} already exists")]
    AlreadyExists(GuildId),

    #[error("invalid player state: {0}")]
    InvalidState(String),

    #[error("voice connection not confirmed after {0}ms")]
    VoiceTimeout(u64),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PlayerResult<T> = Result<T, PlayerError>;

/// Reasons a relay connection is refused or dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("client version {found} is below the minimum supported version {minimum}")]
    OutdatedClient { found: String, minimum: String },

    #[error("at most {max} user ids are allowed per connection, got {found}")]
    TooManyUsers { found: usize, max: usize },

    #[error("token must be empty or exactly {expected} characters, got {found}")]
    InvalidTokenLength { found: usize, expected: usize },

    #[error("handshake must carry at least one user id")]
    MissingUsers,

    #[error("malformed message: {0}")]
    Malformed(String),
}
