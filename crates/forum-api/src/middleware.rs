//! forum/crates/forum-api/src/middleware.rs Middleware
//!
//! Request logging, CORS and default security headers.

use actix_cors::Cors;
use actix_web::middleware::{DefaultHeaders, Logger};

// remote-ip "request-line" status-code response-size "referrer" "user-agent" duration
pub fn request_logger() -> Logger {
    Logger::default()
}

pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST"])
        .allow_any_header()
        .max_age(3600)
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}
