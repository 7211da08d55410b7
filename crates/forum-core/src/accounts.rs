//! Account registration and identity checks that precede session creation.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{NewUser, OAuthProfile, User};
use crate::traits::{Credentials, UserRepo};
use crate::validation::{
    is_valid_email, is_valid_username, username_from_profile, validate_registration,
};

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepo>,
    credentials: Arc<dyn Credentials>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepo>, credentials: Arc<dyn Credentials>) -> Self {
        Self { users, credentials }
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<User> {
        let email = email.trim();
        let username = username.trim();
        validate_registration(email, username, password)?;

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict("username already taken".into()));
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("email already registered".into()));
        }

        let hash = self.credentials.hash_password(password)?;
        let user = self
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: Some(hash),
            })
            .await?;
        tracing::info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Resolves `identifier` as an email when it contains `@`, otherwise as
    /// a username, and checks the password against the stored hash.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<User> {
        let identifier = identifier.trim();
        let by_email = identifier.contains('@');
        let found = if by_email {
            self.users.find_by_email(identifier).await?
        } else {
            self.users.find_by_username(identifier).await?
        };

        let user = found.ok_or_else(|| {
            AppError::Unauthorized(if by_email {
                "Email not found".into()
            } else {
                "Username not found".into()
            })
        })?;

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AppError::Unauthorized(
                "this account signs in through an external provider".into(),
            ));
        };
        if !self.credentials.verify_password(password, hash) {
            return Err(AppError::Unauthorized("Incorrect password".into()));
        }
        Ok(user)
    }

    /// The user-record upsert an OAuth callback performs once the provider
    /// has vouched for `profile.email`. Reached over HTTP through
    /// `forum_api::complete_oauth_login`.
    pub async fn upsert_oauth_user(&self, profile: &OAuthProfile) -> Result<User> {
        let email = profile.email.trim();
        if !is_valid_email(email) {
            return Err(AppError::ValidationError("provider returned an invalid email".into()));
        }
        if let Some(existing) = self.users.find_by_email(email).await? {
            return Ok(existing);
        }

        let base = username_from_profile(profile);
        let mut username = base.clone();
        let mut suffix = 1;
        while self.users.find_by_username(&username).await?.is_some() {
            suffix += 1;
            if suffix > 99 {
                return Err(AppError::Conflict(format!("no free username derived from {base}")));
            }
            let tail = format!("-{suffix}");
            let keep = base.len().min(20 - tail.len());
            username = format!("{}{tail}", &base[..keep]);
        }
        if !is_valid_username(&username) {
            return Err(AppError::ValidationError(format!(
                "cannot derive a valid username from provider profile: {username}"
            )));
        }

        let user = self
            .users
            .create_user(NewUser {
                username,
                email: email.to_string(),
                password_hash: None,
            })
            .await?;
        tracing::info!(user_id = user.id, "user created from provider profile");
        Ok(user)
    }
}
