//! Input checks shared by the services. Everything here runs before any
//! storage call.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::OAuthProfile;

pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_COMMENT_LEN: usize = 5000;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static email pattern")
});

static USERNAME_JUNK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("static username pattern"));

/// Rejects ids that cannot name a stored row.
pub fn require_positive_id(what: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(AppError::ValidationError(format!(
            "{what} must be a positive integer, got {id}"
        )));
    }
    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

/// 3-30 ASCII characters, letters/digits/underscore/hyphen, at least one letter.
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return false;
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return false;
    }
    username.chars().any(|c| c.is_ascii_alphabetic())
}

/// Collects every registration problem at once so the client can show them together.
pub fn validate_registration(email: &str, username: &str, password: &str) -> Result<()> {
    let mut problems = Vec::new();
    if !is_valid_email(email) {
        problems.push("Invalid email format");
    }
    if !is_valid_username(username) {
        problems.push(
            "Username must be 3-30 characters long and contain only letters, numbers, underscores, or hyphens",
        );
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        problems.push("Password must be at least 8 characters long");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(problems.join("; ")))
    }
}

/// Trims the body and enforces bounds. Returns the text to store.
pub fn normalize_comment_body(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError("comment cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::ValidationError(format!(
            "comment exceeds {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Derives a username for an account created through an OAuth provider.
///
/// Prefers `given.family`, then the display name, then the email local part.
/// The result is lowercase ASCII of 3 to 20 characters with at least one
/// letter; anything shorter or letterless gets a `user` prefix.
pub fn username_from_profile(profile: &OAuthProfile) -> String {
    let base = if !profile.given_name.is_empty() && !profile.family_name.is_empty() {
        format!("{}.{}", profile.given_name, profile.family_name)
    } else if !profile.name.is_empty() {
        profile.name.clone()
    } else {
        profile.email.split('@').next().unwrap_or_default().to_string()
    };

    let mut clean = USERNAME_JUNK_RE.replace_all(&base, "-").to_lowercase();
    clean.truncate(20);
    if clean.len() < 3 || !clean.bytes().any(|b| b.is_ascii_alphabetic()) {
        clean = format!("user{clean}");
        clean.truncate(20);
    }
    clean
}
