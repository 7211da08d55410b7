//! # Comment Tree Assembler
//!
//! Turns the flat, newest-first comment listing of a post into a forest.
//! Roots keep query order; each child list keeps query order too.
//!
//! Construction is iterative, driven by an explicit stack. Only nodes
//! reachable from a root are emitted, so rows caught in a parent cycle are
//! omitted instead of looping.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{
    Comment, CommentNode, CommentRow, NewComment, OrphanPolicy, PostId, UserId,
};
use crate::traits::CommentRepo;
use crate::validation::{normalize_comment_body, require_positive_id};

#[derive(Clone)]
pub struct ThreadAssembler {
    repo: Arc<dyn CommentRepo>,
    orphans: OrphanPolicy,
}

impl ThreadAssembler {
    pub fn new(repo: Arc<dyn CommentRepo>, orphans: OrphanPolicy) -> Self {
        Self { repo, orphans }
    }

    /// Loads and assembles the thread under `post_id`.
    ///
    /// `viewer` of `None` or a non-positive id is anonymous: no node will
    /// carry a `user_reaction`. A post without comments yields an empty vec.
    pub async fn assemble(&self, post_id: PostId, viewer: Option<UserId>) -> Result<Vec<CommentNode>> {
        require_positive_id("post_id", post_id)?;
        let viewer = viewer.filter(|id| *id > 0);

        let mut rows = self.repo.list_comment_rows(post_id, viewer).await?;
        if viewer.is_none() {
            for row in &mut rows {
                row.user_reaction = None;
            }
        }

        let total = rows.len();
        let forest = build_forest(rows, self.orphans);
        tracing::debug!(post_id, total, roots = forest.len(), "thread assembled");
        Ok(forest)
    }

    /// Stores a new comment after checking the body and the parent link.
    ///
    /// A reply must point at an existing comment of the same post.
    pub async fn submit_comment(&self, comment: NewComment) -> Result<Comment> {
        require_positive_id("post_id", comment.post_id)?;
        require_positive_id("user_id", comment.user_id)?;
        let content = normalize_comment_body(&comment.content)?;

        if let Some(parent_id) = comment.parent_id {
            require_positive_id("parent_id", parent_id)?;
            match self.repo.get_comment(parent_id).await? {
                Some(parent) if parent.post_id == comment.post_id => {}
                Some(_) => {
                    return Err(AppError::ValidationError(format!(
                        "parent comment {parent_id} belongs to another post"
                    )))
                }
                None => {
                    return Err(AppError::ValidationError(format!(
                        "parent comment {parent_id} does not exist"
                    )))
                }
            }
        }

        let stored = self
            .repo
            .create_comment(NewComment { content, ..comment })
            .await?;
        tracing::info!(comment_id = stored.id, post_id = stored.post_id, "comment created");
        Ok(stored)
    }
}

/// Builds the forest from rows already in display order.
///
/// A row whose parent is absent from `rows` (deleted, or in another post)
/// or is the row itself is an orphan, handled per `orphans`.
pub fn build_forest(rows: Vec<CommentRow>, orphans: OrphanPolicy) -> Vec<CommentNode> {
    // First pass: index every row by id.
    let mut index = HashMap::with_capacity(rows.len());
    for (pos, row) in rows.iter().enumerate() {
        index.insert(row.id, pos);
    }

    // Second pass: attach each reply to its parent's child list.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    let mut roots = Vec::new();
    for (pos, row) in rows.iter().enumerate() {
        match row.parent_id {
            None => roots.push(pos),
            Some(parent) => match index.get(&parent) {
                Some(&parent_pos) if parent_pos != pos => children[parent_pos].push(pos),
                _ => {
                    if orphans == OrphanPolicy::Promote {
                        roots.push(pos);
                    } else {
                        tracing::debug!(comment_id = row.id, parent, "dropping orphaned comment");
                    }
                }
            },
        }
    }

    // Pre-order walk from the roots; walking it backwards visits every
    // child before its parent, so child lists can be moved into place.
    let mut order = Vec::with_capacity(rows.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(pos) = stack.pop() {
        order.push(pos);
        stack.extend(children[pos].iter().rev().copied());
    }

    let mut slots: Vec<Option<CommentNode>> = rows.into_iter().map(|r| Some(r.into())).collect();
    for &pos in order.iter().rev() {
        let kids: Vec<CommentNode> = children[pos]
            .iter()
            .filter_map(|&child| slots[child].take())
            .collect();
        if let Some(node) = slots[pos].as_mut() {
            node.children = kids;
        }
    }

    roots.iter().filter_map(|&pos| slots[pos].take()).collect()
}
