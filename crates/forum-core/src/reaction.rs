//! # Reaction Reconciler
//!
//! Maintains at most one LIKE/DISLIKE per (user, target). The same toggle
//! drives posts and comments; only the `TargetKind` differs.
//!
//! | stored    | requested | write  | status    |
//! |-----------|-----------|--------|-----------|
//! | none      | X         | upsert | `Added`   |
//! | X         | X         | delete | `Removed` |
//! | X         | Y         | upsert | `Updated` |
//!
//! Switching sentiment is a single upsert, never delete-then-insert, so
//! aggregate counts cannot dip in between. Two racing toggles by the same
//! user converge on one row through the store's conflict handling; which
//! one wins is last-write-wins.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{
    PostEngagement, PostId, ReactionKind, ReactionResult, ReactionStatus, ReactionTarget, UserId,
};
use crate::traits::ReactionRepo;
use crate::validation::require_positive_id;

#[derive(Clone)]
pub struct ReactionReconciler {
    repo: Arc<dyn ReactionRepo>,
}

impl ReactionReconciler {
    pub fn new(repo: Arc<dyn ReactionRepo>) -> Self {
        Self { repo }
    }

    /// Toggles `requested` for `user_id` on `target`.
    ///
    /// `requested` is the raw wire value; anything other than `LIKE` or
    /// `DISLIKE` is rejected before storage is touched.
    pub async fn react(
        &self,
        target: ReactionTarget,
        user_id: UserId,
        requested: &str,
    ) -> Result<ReactionResult> {
        require_positive_id(&format!("{}_id", target.kind), target.id)?;
        require_positive_id("user_id", user_id)?;
        let requested = ReactionKind::from_str(requested)?;

        let previous = self.repo.current_reaction(target, user_id).await?;

        let status = match previous {
            Some(current) if current == requested => {
                self.repo.delete_reaction(target, user_id).await?;
                ReactionStatus::Removed
            }
            Some(_) => {
                self.repo.upsert_reaction(target, user_id, requested).await?;
                ReactionStatus::Updated
            }
            None => {
                self.repo.upsert_reaction(target, user_id, requested).await?;
                ReactionStatus::Added
            }
        };

        tracing::debug!(
            target_kind = %target.kind,
            target_id = target.id,
            user_id,
            ?status,
            "reaction reconciled"
        );

        Ok(ReactionResult {
            status,
            previous,
            requested,
        })
    }

    /// Counts for one post and, for a logged-in `viewer`, their own reaction.
    ///
    /// A `None` or non-positive viewer is anonymous and never gets a `user_reaction`.
    pub async fn post_engagement(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> Result<PostEngagement> {
        require_positive_id("post_id", post_id)?;
        let viewer = viewer.filter(|id| *id > 0);

        let mut engagement = self
            .repo
            .post_engagement(post_id, viewer)
            .await?
            .ok_or_else(|| AppError::NotFound("Post".into(), post_id.to_string()))?;
        if viewer.is_none() {
            engagement.user_reaction = None;
        }
        Ok(engagement)
    }

    /// Posts `user_id` has liked.
    pub async fn liked_posts(&self, user_id: UserId) -> Result<Vec<PostId>> {
        require_positive_id("user_id", user_id)?;
        Ok(self.repo.liked_post_ids(user_id).await?)
    }
}
