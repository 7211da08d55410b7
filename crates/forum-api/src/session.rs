//! Request extractors resolving the session cookie.
//!
//! Both extractors slide a found session's expiry before the handler runs.
//! `CurrentUser` rejects anonymous requests with 401; `MaybeUser` never fails.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use forum_core::error::AppError;
use forum_core::models::{Session, SessionId};

use crate::error::ApiError;
use crate::handlers::AppState;

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

/// A caller who may or may not be logged in.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Session>);

fn resolve(req: &HttpRequest) -> Result<(web::Data<AppState>, Option<Session>), ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("application state not registered".into()))?;

    let session = req
        .cookie(&state.cookie.name)
        .and_then(|c| state.sessions.get_session(&SessionId::new(c.value())));
    Ok((state, session))
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve(req).and_then(|(state, session)| match session {
            Some(session) => {
                state.sessions.extend_session(&session.id);
                Ok(CurrentUser(session))
            }
            None => Err(AppError::Unauthorized("login required".into()).into()),
        }))
    }
}

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve(req).map(|(state, session)| {
            if let Some(session) = &session {
                state.sessions.extend_session(&session.id);
            }
            MaybeUser(session)
        }))
    }
}
