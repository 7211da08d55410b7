//! # Domain Models
//!
//! These structs represent the engagement entities of the forum: who is
//! acting (sessions, users), what they feel about a post or comment
//! (reactions), and the threaded discussion under a post (comments).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub type UserId = i64;
pub type PostId = i64;
pub type CommentId = i64;

/// Opaque, unguessable session token. Printable, safe to place in a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live login. Owned by the session store; handlers get clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub id: SessionId,
    pub user_id: UserId,
    pub username: String,
    /// Network address the session was created from
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    /// Sliding; pushed forward on every authenticated request
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// PHC string; `None` for accounts created through an OAuth provider
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A validated registration, ready for storage.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
}

/// Identity details handed over by an OAuth provider after verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
}

/// A user's sentiment toward a post or comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "LIKE",
            ReactionKind::Dislike => "DISLIKE",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIKE" => Ok(ReactionKind::Like),
            "DISLIKE" => Ok(ReactionKind::Dislike),
            other => Err(AppError::ValidationError(format!(
                "unrecognized reaction type {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Post => f.write_str("post"),
            TargetKind::Comment => f.write_str("comment"),
        }
    }
}

/// The post or comment a reaction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReactionTarget {
    pub kind: TargetKind,
    pub id: i64,
}

impl ReactionTarget {
    pub fn post(id: PostId) -> Self {
        Self { kind: TargetKind::Post, id }
    }

    pub fn comment(id: CommentId) -> Self {
        Self { kind: TargetKind::Comment, id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionStatus {
    Added,
    Updated,
    Removed,
}

/// Outcome of a toggle, enough for a client to adjust displayed counts
/// without re-querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReactionResult {
    pub status: ReactionStatus,
    #[serde(rename = "previousReaction", serialize_with = "serialize_optional_kind")]
    pub previous: Option<ReactionKind>,
    #[serde(rename = "updatedReaction")]
    pub requested: ReactionKind,
}

// Clients expect an empty string rather than null when there was no prior reaction.
fn serialize_optional_kind<S>(kind: &Option<ReactionKind>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(kind.map(|k| k.as_str()).unwrap_or(""))
}

/// Aggregate reaction state of one post, as a given viewer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PostEngagement {
    pub post_id: PostId,
    pub likes: i64,
    pub dislikes: i64,
    pub user_reaction: Option<ReactionKind>,
}

/// A stored comment, without engagement data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub user_id: UserId,
    pub content: String,
}

/// One flat row of the thread listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub likes: i64,
    pub dislikes: i64,
    pub user_reaction: Option<ReactionKind>,
}

/// A comment placed in its thread, with aggregate and per-viewer reaction state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub likes: i64,
    pub dislikes: i64,
    pub user_reaction: Option<ReactionKind>,
    pub children: Vec<CommentNode>,
}

impl From<CommentRow> for CommentNode {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            created_at: row.created_at,
            likes: row.likes,
            dislikes: row.dislikes,
            user_reaction: row.user_reaction,
            children: Vec::new(),
        }
    }
}

/// What to do with a comment whose parent is not part of the same thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave it out of the forest
    #[default]
    Drop,
    /// Show it as a root at its query position
    Promote,
}
