//! Shared wire-protocol DTOs for the forum services.
//!
//! DESIGN
//! ======
//! The chat service speaks two spellings of the same message: history rows use
//! `author_id`/`author_name` while live socket frames use `user_id`/`username`.
//! `ChatMessage` accepts both through serde aliases so the connection manager
//! never has to branch on where a message came from.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// CHAT
// =============================================================================

/// Identifier carried by the wire protocol. The chat service emits numeric ids,
/// other producers use strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    /// Client-assigned id for messages that arrive without one.
    #[must_use]
    pub fn temporary() -> Self {
        Self::Text(format!("tmp-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A single chat message, from history or from a live frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server id, or a `tmp-` id assigned on receipt.
    #[serde(default = "WireId::temporary")]
    pub id: WireId,
    /// Author identifier, if the producer supplied one.
    #[serde(default, alias = "user_id")]
    pub author_id: Option<WireId>,
    /// Author display name.
    #[serde(default, alias = "username", alias = "user_name")]
    pub author_name: Option<String>,
    /// Body text.
    #[serde(alias = "content")]
    pub message: String,
    /// Server or client timestamp (RFC 3339), when present.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// Display name with a fallback derived from the author id.
    #[must_use]
    pub fn display_author(&self) -> String {
        match (&self.author_name, &self.author_id) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(id)) => format!("User #{id}"),
            _ => "anonymous".to_owned(),
        }
    }
}

/// What a caller hands to `ChatHandle::send`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDraft {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ChatDraft {
    #[must_use]
    pub fn text(message: impl Into<String>) -> Self {
        Self { kind: Some("message".to_owned()), message: message.into(), username: None }
    }
}

/// A draft stamped with its generation time, ready for the socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub draft: ChatDraft,
    pub timestamp: String,
}

impl OutboundMessage {
    /// Stamp a draft with the current UTC time.
    #[must_use]
    pub fn stamp(draft: ChatDraft) -> Self {
        Self { draft, timestamp: now_rfc3339() }
    }
}

/// Current UTC time formatted as RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

// =============================================================================
// AUTH
// =============================================================================

/// Account role accepted by the auth service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Body for `POST /signup` and `POST /signin`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Response from `POST /signup`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SignupResponse {
    pub id: i64,
}

/// Response from `POST /signin`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// User record as returned by the auth service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
}

// =============================================================================
// POSTS & COMMENTS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author_id: i64,
    pub post_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub is_liked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewComment {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

/// Response from `POST /comments/{id}/like`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct LikeResult {
    pub comment_id: i64,
    pub likes: u32,
    pub is_liked: bool,
}

/// Collection responses arrive either bare or wrapped under a named key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Collection<T> {
    Bare(Vec<T>),
    Data { data: Vec<T> },
    Comments { comments: Vec<T> },
    Posts { posts: Vec<T> },
}

impl<T> Collection<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items)
            | Self::Data { data: items }
            | Self::Comments { comments: items }
            | Self::Posts { posts: items } => items,
        }
    }
}

/// `POST /posts` wraps the created post alongside a status message.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedPost {
    pub post: Post,
}

/// Error body shape shared by all three services.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
