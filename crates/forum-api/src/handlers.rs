//! # forum-api Handlers
//!
//! Thin glue between HTTP requests and the core services. Every handler
//! resolves identity through the session extractors, delegates, and maps
//! the result to JSON.

use std::sync::Arc;

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use forum_core::models::{CommentId, NewComment, OAuthProfile, PostId, ReactionTarget, SessionId};
use forum_core::traits::SessionStore;
use forum_core::{AccountService, ReactionReconciler, ThreadAssembler};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::session::{CurrentUser, MaybeUser};

/// How the session id travels to the browser.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
    pub max_age_hours: i64,
}

/// State shared across all Actix-web workers.
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub accounts: AccountService,
    pub reactions: ReactionReconciler,
    pub threads: ThreadAssembler,
    pub cookie: SessionCookie,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address or username
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PostReactionRequest {
    pub post_id: PostId,
    pub reaction_type: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentReactionRequest {
    pub comment_id: CommentId,
    pub reaction_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub post_id: PostId,
}

#[derive(Debug, Deserialize)]
pub struct PostReactionsQuery {
    pub post_id: PostId,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub content: String,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn signup(
    data: web::Data<AppState>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .accounts
        .register(&body.email, &body.username, &body.password)
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "status": "success",
        "username": user.username,
    })))
}

/// Verifies credentials and starts a session, superseding any earlier one.
pub async fn login(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .accounts
        .authenticate(&body.identifier, &body.password)
        .await?;

    let client_addr = req.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    let session = data
        .sessions
        .create_session(user.id, &user.username, &client_addr)?;
    tracing::info!(user_id = user.id, "user logged in");

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&data.cookie, session.id.as_str()))
        .json(json!({
            "status": "success",
            "username": user.username,
        })))
}

/// Finishes a provider sign-in once the callback has exchanged its code
/// and fetched a verified `profile`.
///
/// The code exchange is provider-specific and lives with the deployment's
/// callback route. Answers 303 to `/` with the session cookie set.
pub async fn complete_oauth_login(
    data: &AppState,
    profile: &OAuthProfile,
    client_addr: &str,
) -> Result<HttpResponse, ApiError> {
    let user = data.accounts.upsert_oauth_user(profile).await?;
    let session = data
        .sessions
        .create_session(user.id, &user.username, client_addr)?;
    tracing::info!(user_id = user.id, "user logged in through provider");

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(session_cookie(&data.cookie, session.id.as_str()))
        .finish())
}

pub async fn logout(data: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(cookie) = req.cookie(&data.cookie.name) {
        let id = SessionId::new(cookie.value());
        if let Some(session) = data.sessions.get_session(&id) {
            tracing::info!(user_id = session.user_id, "user logged out");
        }
        data.sessions.delete_session(&id);
    }

    let mut removal = session_cookie(&data.cookie, "");
    removal.make_removal();
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(removal)
        .finish()
}

pub async fn react_to_post(
    data: web::Data<AppState>,
    CurrentUser(session): CurrentUser,
    body: web::Json<PostReactionRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = data
        .reactions
        .react(
            ReactionTarget::post(body.post_id),
            session.user_id,
            &body.reaction_type,
        )
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn react_to_comment(
    data: web::Data<AppState>,
    CurrentUser(session): CurrentUser,
    body: web::Json<CommentReactionRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = data
        .reactions
        .react(
            ReactionTarget::comment(body.comment_id),
            session.user_id,
            &body.reaction_type,
        )
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// The assembled comment forest of a post, personalised when logged in.
pub async fn list_comments(
    data: web::Data<AppState>,
    MaybeUser(session): MaybeUser,
    query: web::Query<ThreadQuery>,
) -> Result<HttpResponse, ApiError> {
    let viewer = session.map(|s| s.user_id);
    let forest = data.threads.assemble(query.post_id, viewer).await?;
    Ok(HttpResponse::Ok().json(forest))
}

/// Like and dislike totals of a post, plus the caller's own reaction.
pub async fn post_reactions(
    data: web::Data<AppState>,
    MaybeUser(session): MaybeUser,
    query: web::Query<PostReactionsQuery>,
) -> Result<HttpResponse, ApiError> {
    let viewer = session.map(|s| s.user_id);
    let engagement = data.reactions.post_engagement(query.post_id, viewer).await?;
    Ok(HttpResponse::Ok().json(engagement))
}

/// Ids of the posts the caller has liked, newest first.
pub async fn liked_posts(
    data: web::Data<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let ids = data.reactions.liked_posts(session.user_id).await?;
    Ok(HttpResponse::Ok().json(ids))
}

pub async fn create_comment(
    data: web::Data<AppState>,
    CurrentUser(session): CurrentUser,
    body: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let comment = data
        .threads
        .submit_comment(NewComment {
            post_id: body.post_id,
            parent_id: body.parent_id,
            user_id: session.user_id,
            content: body.content,
        })
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "status": "success",
        "id": comment.id,
        "created_at": comment.created_at,
        "username": session.username,
    })))
}

fn session_cookie(settings: &SessionCookie, value: &str) -> Cookie<'static> {
    Cookie::build(settings.name.clone(), value.to_string())
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(settings.max_age_hours))
        .finish()
}
