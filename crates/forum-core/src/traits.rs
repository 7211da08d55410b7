//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Repositories speak `anyhow::Result`; services lift their failures into
//! `AppError::Storage` unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::error::Result;
use crate::models::{
    Comment, CommentId, CommentRow, NewComment, NewUser, PostEngagement, PostId, ReactionKind,
    ReactionTarget, Session, SessionId, User, UserId,
};

/// The storage primitives the reaction toggle needs, plus the post-side reads.
///
/// Uniqueness of (target kind, target id, user id) is the store's job:
/// `upsert_reaction` must be a single atomic insert-or-update-on-conflict.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ReactionRepo: Send + Sync {
    async fn current_reaction(
        &self,
        target: ReactionTarget,
        user_id: UserId,
    ) -> anyhow::Result<Option<ReactionKind>>;

    async fn upsert_reaction(
        &self,
        target: ReactionTarget,
        user_id: UserId,
        kind: ReactionKind,
    ) -> anyhow::Result<()>;

    async fn delete_reaction(&self, target: ReactionTarget, user_id: UserId) -> anyhow::Result<()>;

    /// Like and dislike counts of a post plus `viewer`'s own reaction.
    /// `None` when the post does not exist.
    async fn post_engagement(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> anyhow::Result<Option<PostEngagement>>;

    /// Ids of the posts `user_id` currently likes, newest post first.
    async fn liked_post_ids(&self, user_id: UserId) -> anyhow::Result<Vec<PostId>>;
}

/// Data persistence contract for comments.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// All comments of a post with author name, aggregate counts and, when
    /// `viewer` is set, that viewer's own reaction. Newest first.
    async fn list_comment_rows(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> anyhow::Result<Vec<CommentRow>>;

    async fn get_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>>;

    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<Comment>;
}

/// Data persistence contract for user accounts.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn create_user(&self, user: NewUser) -> anyhow::Result<User>;
}

/// The authoritative record of who is logged in.
///
/// Absence is a normal answer: an expired or unknown id yields `None`.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait SessionStore: Send + Sync {
    /// Starts a session, invalidating any earlier one for the same user.
    fn create_session(&self, user_id: UserId, username: &str, ip_address: &str) -> Result<Session>;
    fn get_session(&self, id: &SessionId) -> Option<Session>;
    fn extend_session(&self, id: &SessionId);
    fn delete_session(&self, id: &SessionId);
    fn get_session_by_user(&self, user_id: UserId) -> Option<Session>;
}

/// Password hashing and verification.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait Credentials: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String>;
    fn verify_password(&self, password: &str, hash: &str) -> bool;
}

/// Source of "now". Swapped for a manual clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
