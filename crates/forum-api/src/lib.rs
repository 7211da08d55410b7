//! # forum-api
//!
//! The web routing and orchestration layer for the forum's engagement
//! features: sessions, reactions and comment threads.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;

use actix_web::web;
use forum_core::error::AppError;

pub use error::ApiError;
pub use handlers::{complete_oauth_login, AppState, SessionCookie};

/// Configures the routes of the engagement API.
///
/// Malformed JSON bodies and query strings are answered with the same
/// `{"error": ..}` shape as every other client error.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        ApiError(AppError::ValidationError(err.to_string())).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        ApiError(AppError::ValidationError(err.to_string())).into()
    }))
    .route("/health", web::get().to(handlers::health))
    .route("/signup", web::post().to(handlers::signup))
    .route("/login", web::post().to(handlers::login))
    .route("/logout", web::post().to(handlers::logout))
    .route("/post/react", web::post().to(handlers::react_to_post))
    .route("/post/reactions", web::get().to(handlers::post_reactions))
    .route("/likesfilter", web::get().to(handlers::liked_posts))
    .route("/comments/react", web::post().to(handlers::react_to_comment))
    .route("/comments", web::get().to(handlers::list_comments))
    .route("/comments/create", web::post().to(handlers::create_comment));
}
