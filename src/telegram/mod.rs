//! Boundary to the Telegram client library.
//!
//! The panel only talks to Telegram through [`ClientFactory`] and
//! [`TelegramClient`], so the login, resolution and cleanup logic can run
//! against any backend (the `grammers` feature, or the in-memory fake used by
//! the tests).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

#[cfg(test)]
pub mod fake;
#[cfg(feature = "grammers")]
pub mod grammers;

#[cfg(feature = "grammers")]
pub const BACKEND: &str = "grammers";
#[cfg(not(feature = "grammers"))]
pub const BACKEND: &str = "none";

/// Offset Telegram adds to channel ids in their marked (Bot API) form.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("rpc error {code}: {name}")]
    Rpc { code: i32, name: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid session: {0}")]
    Session(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Short lowercase label used to bucket failures in cleanup summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Rpc { code, name } => {
                if *code == 420 || name.starts_with("FLOOD_WAIT") || name.starts_with("FLOOD_PREMIUM_WAIT") {
                    "flood"
                } else {
                    match code {
                        400 => "badrequest",
                        401 => "unauthorized",
                        403 => "forbidden",
                        _ => "rpc",
                    }
                }
            }
            ClientError::Network(_) => "network",
            ClientError::Session(_) => "session",
            ClientError::NotFound(_) => "notfound",
            ClientError::Other(_) => "other",
        }
    }
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("two-factor password required")]
    PasswordRequired,
    #[error("invalid code")]
    InvalidCode,
    #[error("invalid password")]
    InvalidPassword,
    #[error("phone number is not registered")]
    SignUpRequired,
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerKind {
    User,
    Group,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    User(i64),
    Group(i64),
    Channel(i64),
}

impl Peer {
    /// Splits a marked id: positive ids are users, `-(10^12 + id)` are
    /// channels, any other negative id is a basic group.
    pub fn from_marked_id(marked: i64) -> Option<Self> {
        if marked > 0 {
            return Some(Peer::User(marked));
        }
        let id = marked.checked_neg().filter(|id| *id > 0)?;
        if id > CHANNEL_ID_OFFSET {
            Some(Peer::Channel(id - CHANNEL_ID_OFFSET))
        } else {
            Some(Peer::Group(id))
        }
    }

    pub fn kind(&self) -> PeerKind {
        match self {
            Peer::User(_) => PeerKind::User,
            Peer::Group(_) => PeerKind::Group,
            Peer::Channel(_) => PeerKind::Channel,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Peer::User(id) | Peer::Group(id) | Peer::Channel(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub peer: Peer,
    pub name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageAction {
    ChatAddUser,
    ChatJoinedByLink,
    ChatDeleteUser,
    Other,
}

impl MessageAction {
    pub fn is_join_or_leave(&self) -> bool {
        matches!(
            self,
            MessageAction::ChatAddUser | MessageAction::ChatJoinedByLink | MessageAction::ChatDeleteUser
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i32,
    pub date: Option<DateTime<Utc>>,
    /// Present only on service messages.
    pub action: Option<MessageAction>,
}

impl Message {
    pub fn is_join_or_leave(&self) -> bool {
        self.action.as_ref().is_some_and(MessageAction::is_join_or_leave)
    }
}

#[async_trait]
pub trait TelegramClient: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, ClientError>;

    async fn request_login_code(&self, phone: &str) -> Result<(), ClientError>;

    async fn sign_in(&self, phone: &str, code: &str) -> Result<(), SignInError>;

    async fn check_password(&self, password: &str) -> Result<(), SignInError>;

    /// Serialized form of the current session, suitable for `SESSION_STRING`.
    fn export_session(&self) -> Result<String, ClientError>;

    async fn resolve_username(&self, username: &str) -> Result<Option<Chat>, ClientError>;

    async fn resolve_peer(&self, peer: Peer) -> Result<Chat, ClientError>;

    async fn resolve_id(&self, id: i64) -> Result<Chat, ClientError>;

    fn dialogs(&self) -> BoxStream<'_, Result<Chat, ClientError>>;

    /// History of `chat`, newest first, at most `limit` messages.
    fn messages<'a>(&'a self, chat: &'a Chat, limit: usize) -> BoxStream<'a, Result<Message, ClientError>>;

    async fn delete_messages(&self, chat: &Chat, ids: &[i32], revoke: bool) -> Result<usize, ClientError>;

    async fn disconnect(&self) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
        session: Option<&str>,
    ) -> Result<Arc<dyn TelegramClient>, ClientError>;
}
