//! # forum-auth-session
//!
//! Process-local identity: the session registry that answers "who is
//! acting" for every request, and Argon2 password credentials.
//!
//! Sessions are volatile by design of this plugin; a restart logs everyone out.

pub mod password;
pub mod registry;

pub use password::Argon2Credentials;
pub use registry::{SessionRegistry, DEFAULT_TTL_HOURS};
