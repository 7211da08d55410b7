//! # forum-db-sqlite Implementation
//!
//! Maps the SQLite relational model onto the `forum-core` domain models.
//! The store owns reaction uniqueness: each reaction table is keyed by
//! (target, user) and writes go through `ON CONFLICT ... DO UPDATE`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forum_core::models::{
    Comment, CommentId, CommentRow, NewComment, NewUser, PostEngagement, PostId, ReactionKind,
    ReactionTarget, TargetKind, User, UserId,
};
use forum_core::traits::{CommentRepo, ReactionRepo, UserRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

#[derive(Clone)]
pub struct SqliteForumRepo {
    pool: SqlitePool,
}

/// Query texts for one reaction table. Selected by target kind, never
/// assembled from input.
struct ReactionSql {
    current: &'static str,
    upsert: &'static str,
    delete: &'static str,
}

const POST_REACTION_SQL: ReactionSql = ReactionSql {
    current: "SELECT reaction_type FROM post_reactions WHERE post_id = ? AND user_id = ?",
    upsert: "INSERT INTO post_reactions (post_id, user_id, reaction_type) VALUES (?, ?, ?) \
             ON CONFLICT (post_id, user_id) \
             DO UPDATE SET reaction_type = excluded.reaction_type, created_at = CURRENT_TIMESTAMP",
    delete: "DELETE FROM post_reactions WHERE post_id = ? AND user_id = ?",
};

const COMMENT_REACTION_SQL: ReactionSql = ReactionSql {
    current: "SELECT reaction_type FROM comment_reactions WHERE comment_id = ? AND user_id = ?",
    upsert: "INSERT INTO comment_reactions (comment_id, user_id, reaction_type) VALUES (?, ?, ?) \
             ON CONFLICT (comment_id, user_id) \
             DO UPDATE SET reaction_type = excluded.reaction_type, created_at = CURRENT_TIMESTAMP",
    delete: "DELETE FROM comment_reactions WHERE comment_id = ? AND user_id = ?",
};

fn reaction_sql(kind: TargetKind) -> &'static ReactionSql {
    match kind {
        TargetKind::Post => &POST_REACTION_SQL,
        TargetKind::Comment => &COMMENT_REACTION_SQL,
    }
}

/// One round trip for the whole thread: author, both counts and the
/// viewer's own reaction. A NULL viewer matches no reaction row.
const LIST_COMMENTS_SQL: &str = "\
    SELECT c.id, c.post_id, c.parent_id, c.user_id, u.username, c.content, c.created_at,
           (SELECT COUNT(*) FROM comment_reactions r
             WHERE r.comment_id = c.id AND r.reaction_type = 'LIKE') AS likes,
           (SELECT COUNT(*) FROM comment_reactions r
             WHERE r.comment_id = c.id AND r.reaction_type = 'DISLIKE') AS dislikes,
           (SELECT r.reaction_type FROM comment_reactions r
             WHERE r.comment_id = c.id AND r.user_id = ?) AS user_reaction
      FROM comments c
      JOIN users u ON u.id = c.user_id
     WHERE c.post_id = ?
     ORDER BY c.created_at DESC, c.id DESC";

/// Counts and the viewer's reaction in one pass over the post's reaction
/// rows. The LEFT JOIN keeps a post with no reactions; a missing post
/// yields no row at all.
const POST_ENGAGEMENT_SQL: &str = "\
    SELECT p.id AS post_id,
           COALESCE(SUM(CASE WHEN r.reaction_type = 'LIKE' THEN 1 ELSE 0 END), 0) AS likes,
           COALESCE(SUM(CASE WHEN r.reaction_type = 'DISLIKE' THEN 1 ELSE 0 END), 0) AS dislikes,
           MAX(CASE WHEN r.user_id = ? THEN r.reaction_type END) AS user_reaction
      FROM posts p
      LEFT JOIN post_reactions r ON r.post_id = p.id
     WHERE p.id = ?
     GROUP BY p.id";

const LIKED_POSTS_SQL: &str = "\
    SELECT post_id FROM post_reactions
     WHERE user_id = ? AND reaction_type = 'LIKE'
     ORDER BY post_id DESC";

impl SqliteForumRepo {
    /// Opens (creating if needed) the database at `url` and applies pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// A private in-memory database. One connection that never recycles,
    /// since every new connection would see an empty database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("sqlite schema up to date");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a post. Post management lives elsewhere; this is for seeding.
    pub async fn create_post(
        &self,
        user_id: UserId,
        title: &str,
        content: &str,
    ) -> anyhow::Result<PostId> {
        let id = sqlx::query(
            "INSERT INTO posts (user_id, title, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }
}

fn parse_kind(raw: Option<String>) -> anyhow::Result<Option<ReactionKind>> {
    raw.map(|s| ReactionKind::from_str(&s))
        .transpose()
        .map_err(anyhow::Error::from)
}

fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> sqlx::Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        parent_id: row.try_get("parent_id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ReactionRepo for SqliteForumRepo {
    async fn current_reaction(
        &self,
        target: ReactionTarget,
        user_id: UserId,
    ) -> anyhow::Result<Option<ReactionKind>> {
        let raw: Option<String> = sqlx::query_scalar(reaction_sql(target.kind).current)
            .bind(target.id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        parse_kind(raw)
    }

    async fn upsert_reaction(
        &self,
        target: ReactionTarget,
        user_id: UserId,
        kind: ReactionKind,
    ) -> anyhow::Result<()> {
        sqlx::query(reaction_sql(target.kind).upsert)
            .bind(target.id)
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_reaction(&self, target: ReactionTarget, user_id: UserId) -> anyhow::Result<()> {
        sqlx::query(reaction_sql(target.kind).delete)
            .bind(target.id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn post_engagement(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> anyhow::Result<Option<PostEngagement>> {
        let row = sqlx::query(POST_ENGAGEMENT_SQL)
            .bind(viewer)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(PostEngagement {
            post_id: row.try_get("post_id")?,
            likes: row.try_get("likes")?,
            dislikes: row.try_get("dislikes")?,
            user_reaction: parse_kind(row.try_get("user_reaction")?)?,
        }))
    }

    async fn liked_post_ids(&self, user_id: UserId) -> anyhow::Result<Vec<PostId>> {
        let ids: Vec<PostId> = sqlx::query_scalar(LIKED_POSTS_SQL)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl CommentRepo for SqliteForumRepo {
    async fn list_comment_rows(
        &self,
        post_id: PostId,
        viewer: Option<UserId>,
    ) -> anyhow::Result<Vec<CommentRow>> {
        let rows = sqlx::query(LIST_COMMENTS_SQL)
            .bind(viewer)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> anyhow::Result<CommentRow> {
                Ok(CommentRow {
                    id: row.try_get("id")?,
                    post_id: row.try_get("post_id")?,
                    parent_id: row.try_get("parent_id")?,
                    user_id: row.try_get("user_id")?,
                    username: row.try_get("username")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                    likes: row.try_get("likes")?,
                    dislikes: row.try_get("dislikes")?,
                    user_reaction: parse_kind(row.try_get("user_reaction")?)?,
                })
            })
            .collect()
    }

    async fn get_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, post_id, parent_id, user_id, content, created_at FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(comment_from_row).transpose()?)
    }

    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO comments (post_id, parent_id, user_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(comment.user_id)
        .bind(&comment.content)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Comment {
            id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at,
        })
    }
}

#[async_trait]
impl UserRepo for SqliteForumRepo {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<User> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_core::{OrphanPolicy, ReactionReconciler, ReactionStatus, ThreadAssembler};
    use std::sync::Arc;

    async fn seeded() -> (Arc<SqliteForumRepo>, UserId, UserId, PostId) {
        let repo = Arc::new(SqliteForumRepo::in_memory().await.unwrap());
        let ann = repo
            .create_user(NewUser {
                username: "ann".into(),
                email: "ann@example.org".into(),
                password_hash: Some("h".into()),
            })
            .await
            .unwrap()
            .id;
        let bob = repo
            .create_user(NewUser {
                username: "bob".into(),
                email: "bob@example.org".into(),
                password_hash: None,
            })
            .await
            .unwrap()
            .id;
        let post = repo.create_post(ann, "Hello", "First post").await.unwrap();
        (repo, ann, bob, post)
    }

    async fn comment(
        repo: &SqliteForumRepo,
        post_id: PostId,
        parent_id: Option<CommentId>,
        user_id: UserId,
        content: &str,
    ) -> CommentId {
        repo.create_comment(NewComment {
            post_id,
            parent_id,
            user_id,
            content: content.into(),
        })
        .await
        .unwrap()
        .id
    }

    async fn reaction_rows(repo: &SqliteForumRepo, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(repo.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn users_round_trip() {
        let (repo, ann, bob, _) = seeded().await;
        let found = repo.find_by_email("ann@example.org").await.unwrap().unwrap();
        assert_eq!(found.id, ann);
        assert_eq!(found.password_hash.as_deref(), Some("h"));

        let oauth = repo.find_by_username("bob").await.unwrap().unwrap();
        assert_eq!(oauth.id, bob);
        assert!(oauth.password_hash.is_none());

        assert!(repo.find_by_username("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_storage_error() {
        let (repo, _, _, _) = seeded().await;
        let dup = repo
            .create_user(NewUser {
                username: "ann".into(),
                email: "other@example.org".into(),
                password_hash: None,
            })
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn reaction_toggle_against_sqlite() {
        let (repo, ann, _, post) = seeded().await;
        let rx = ReactionReconciler::new(repo.clone());
        let target = ReactionTarget::post(post);

        assert_eq!(rx.react(target, ann, "LIKE").await.unwrap().status, ReactionStatus::Added);
        assert_eq!(reaction_rows(&repo, "post_reactions").await, 1);

        assert_eq!(rx.react(target, ann, "LIKE").await.unwrap().status, ReactionStatus::Removed);
        assert_eq!(reaction_rows(&repo, "post_reactions").await, 0);
        assert_eq!(repo.current_reaction(target, ann).await.unwrap(), None);
    }

    #[tokio::test]
    async fn switching_keeps_a_single_row() {
        let (repo, ann, _, post) = seeded().await;
        let c = comment(&repo, post, None, ann, "root").await;
        let rx = ReactionReconciler::new(repo.clone());
        let target = ReactionTarget::comment(c);

        rx.react(target, ann, "LIKE").await.unwrap();
        let res = rx.react(target, ann, "DISLIKE").await.unwrap();
        assert_eq!(res.status, ReactionStatus::Updated);
        assert_eq!(res.previous, Some(ReactionKind::Like));

        assert_eq!(reaction_rows(&repo, "comment_reactions").await, 1);
        assert_eq!(
            repo.current_reaction(target, ann).await.unwrap(),
            Some(ReactionKind::Dislike)
        );
    }

    #[tokio::test]
    async fn check_constraint_rejects_unknown_values() {
        let (repo, ann, _, post) = seeded().await;
        let res = sqlx::query(
            "INSERT INTO post_reactions (post_id, user_id, reaction_type) VALUES (?, ?, 'LOVE')",
        )
        .bind(post)
        .bind(ann)
        .execute(repo.pool())
        .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn reacting_to_a_missing_post_fails_in_storage() {
        let (repo, ann, _, _) = seeded().await;
        let rx = ReactionReconciler::new(repo.clone());
        let err = rx.react(ReactionTarget::post(999), ann, "LIKE").await.unwrap_err();
        assert!(matches!(err, forum_core::AppError::Storage(_)));
    }

    #[tokio::test]
    async fn thread_with_counts_and_viewer_reaction() {
        let (repo, ann, bob, post) = seeded().await;
        let c1 = comment(&repo, post, None, ann, "root").await;
        let c2 = comment(&repo, post, Some(c1), bob, "reply").await;
        let c3 = comment(&repo, post, Some(c2), ann, "nested").await;

        let rx = ReactionReconciler::new(repo.clone());
        rx.react(ReactionTarget::comment(c2), ann, "LIKE").await.unwrap();
        rx.react(ReactionTarget::comment(c2), bob, "LIKE").await.unwrap();
        rx.react(ReactionTarget::comment(c1), bob, "DISLIKE").await.unwrap();

        let threads = ThreadAssembler::new(repo.clone(), OrphanPolicy::Drop);
        let forest = threads.assemble(post, Some(ann)).await.unwrap();

        assert_eq!(forest.len(), 1);
        let root = &forest[0];
        assert_eq!(root.id, c1);
        assert_eq!(root.username, "ann");
        assert_eq!((root.likes, root.dislikes), (0, 1));
        assert_eq!(root.user_reaction, None);

        let reply = &root.children[0];
        assert_eq!(reply.id, c2);
        assert_eq!(reply.username, "bob");
        assert_eq!(reply.likes, 2);
        assert_eq!(reply.user_reaction, Some(ReactionKind::Like));
        assert_eq!(reply.children[0].id, c3);
        assert!(reply.children[0].children.is_empty());

        let anonymous = threads.assemble(post, None).await.unwrap();
        assert_eq!(anonymous[0].children[0].likes, 2);
        assert_eq!(anonymous[0].children[0].user_reaction, None);
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let (repo, ann, _, post) = seeded().await;
        let first = comment(&repo, post, None, ann, "one").await;
        let second = comment(&repo, post, None, ann, "two").await;
        let third = comment(&repo, post, None, ann, "three").await;

        let rows = repo.list_comment_rows(post, None).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, second, first]);
    }

    #[tokio::test]
    async fn empty_post_lists_nothing() {
        let (repo, _, _, post) = seeded().await;
        let threads = ThreadAssembler::new(repo.clone(), OrphanPolicy::Drop);
        assert!(threads.assemble(post, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_into_another_post_is_rejected() {
        let (repo, ann, _, post) = seeded().await;
        let other = repo.create_post(ann, "Other", "Second post").await.unwrap();
        let parent = comment(&repo, other, None, ann, "elsewhere").await;

        let threads = ThreadAssembler::new(repo.clone(), OrphanPolicy::Drop);
        let err = threads
            .submit_comment(NewComment {
                post_id: post,
                parent_id: Some(parent),
                user_id: ann,
                content: "reply".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, forum_core::AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn get_comment_reads_back_what_was_stored() {
        let (repo, ann, _, post) = seeded().await;
        let id = comment(&repo, post, None, ann, "kept").await;
        let stored = repo.get_comment(id).await.unwrap().unwrap();
        assert_eq!(stored.content, "kept");
        assert_eq!(stored.parent_id, None);
        assert!(repo.get_comment(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_engagement_counts_and_viewer_reaction() {
        let (repo, ann, bob, post) = seeded().await;
        let rx = ReactionReconciler::new(repo.clone());
        rx.react(ReactionTarget::post(post), ann, "LIKE").await.unwrap();
        rx.react(ReactionTarget::post(post), bob, "DISLIKE").await.unwrap();

        let seen = repo.post_engagement(post, Some(bob)).await.unwrap().unwrap();
        assert_eq!(seen.post_id, post);
        assert_eq!((seen.likes, seen.dislikes), (1, 1));
        assert_eq!(seen.user_reaction, Some(ReactionKind::Dislike));

        let anonymous = repo.post_engagement(post, None).await.unwrap().unwrap();
        assert_eq!(anonymous.user_reaction, None);
        assert_eq!(anonymous.likes, 1);
    }

    #[tokio::test]
    async fn post_without_reactions_reports_zero_and_missing_post_none() {
        let (repo, ann, _, post) = seeded().await;
        let quiet = repo.post_engagement(post, Some(ann)).await.unwrap().unwrap();
        assert_eq!((quiet.likes, quiet.dislikes), (0, 0));
        assert_eq!(quiet.user_reaction, None);

        assert!(repo.post_engagement(post + 100, Some(ann)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn liked_posts_exclude_dislikes_and_comments() {
        let (repo, ann, _, first) = seeded().await;
        let second = repo.create_post(ann, "Second", "b").await.unwrap();
        let third = repo.create_post(ann, "Third", "c").await.unwrap();
        let c = comment(&repo, first, None, ann, "root").await;

        let rx = ReactionReconciler::new(repo.clone());
        rx.react(ReactionTarget::post(first), ann, "LIKE").await.unwrap();
        rx.react(ReactionTarget::post(second), ann, "DISLIKE").await.unwrap();
        rx.react(ReactionTarget::post(third), ann, "LIKE").await.unwrap();
        rx.react(ReactionTarget::comment(c), ann, "LIKE").await.unwrap();

        assert_eq!(repo.liked_post_ids(ann).await.unwrap(), vec![third, first]);
    }

    /// Removes the database file and its journal side files on drop.
    struct TempDb(std::path::PathBuf);

    impl TempDb {
        fn new(tag: &str) -> Self {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            Self(std::env::temp_dir().join(format!(
                "forum-{tag}-{}-{nanos}.db",
                std::process::id()
            )))
        }

        fn url(&self) -> String {
            format!("sqlite://{}", self.0.display())
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm", "-journal"] {
                let mut path = self.0.clone().into_os_string();
                path.push(suffix);
                let _ = std::fs::remove_file(path);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_toggles_by_one_user_leave_at_most_one_row() {
        let db = TempDb::new("race");
        let repo = Arc::new(SqliteForumRepo::connect(&db.url(), 5).await.unwrap());
        let user = repo
            .create_user(NewUser {
                username: "clicker".into(),
                email: "clicker@example.org".into(),
                password_hash: None,
            })
            .await
            .unwrap()
            .id;
        let post = repo.create_post(user, "Hot", "take").await.unwrap();
        let rx = ReactionReconciler::new(repo.clone());
        let target = ReactionTarget::post(post);

        for _ in 0..20 {
            let tasks: Vec<_> = (0..8)
                .map(|i| {
                    let rx = rx.clone();
                    let kind = if i % 2 == 0 { "LIKE" } else { "DISLIKE" };
                    tokio::spawn(async move { rx.react(target, user, kind).await })
                })
                .collect();
            for task in tasks {
                assert!(task.await.unwrap().is_ok());
            }

            let rows: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM post_reactions WHERE post_id = ? AND user_id = ?",
            )
            .bind(post)
            .bind(user)
            .fetch_one(repo.pool())
            .await
            .unwrap();
            assert!(rows <= 1, "found {rows} reaction rows for one user");
        }
    }
}
