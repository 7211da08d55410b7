//! In-memory session registry.
//!
//! One readers-writer lock guards the whole map. Lookups share the lock;
//! every mutation takes it exclusively. The lock is never held across I/O.
//! Expired sessions are evicted lazily, on the read that discovers them.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::Engine;
use chrono::Duration;
use forum_core::error::{AppError, Result};
use forum_core::models::{Session, SessionId, UserId};
use forum_core::traits::{Clock, SessionStore, SystemClock};

/// Sliding lifetime of a session.
pub const DEFAULT_TTL_HOURS: i64 = 24;

const TOKEN_BYTES: usize = 32;

pub struct SessionRegistry<C: Clock = SystemClock> {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: Duration,
    clock: C,
}

impl SessionRegistry<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(Duration::hours(DEFAULT_TTL_HOURS), SystemClock)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl Default for SessionRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SessionRegistry<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored sessions, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live_at(now));
        before - sessions.len()
    }

    // Every mutation is a single insert, remove or field write, so a
    // poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 256 bits from the OS CSPRNG, URL-safe base64 without padding.
fn generate_token() -> Result<SessionId> {
    let mut buf = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AppError::Allocation(format!("secure random source unavailable: {e}")))?;
    Ok(SessionId::new(
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf),
    ))
}

impl<C: Clock> SessionStore for SessionRegistry<C> {
    fn create_session(&self, user_id: UserId, username: &str, ip_address: &str) -> Result<Session> {
        let id = generate_token()?;
        let now = self.clock.now();
        let session = Session {
            id: id.clone(),
            user_id,
            username: username.to_string(),
            ip_address: ip_address.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
            last_activity: now,
        };

        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        let superseded = before - sessions.len();
        sessions.insert(id, session.clone());
        drop(sessions);

        tracing::debug!(user_id, superseded, "session created");
        Ok(session)
    }

    fn get_session(&self, id: &SessionId) -> Option<Session> {
        let now = self.clock.now();
        {
            let sessions = self.read();
            match sessions.get(id) {
                None => return None,
                Some(s) if s.is_live_at(now) => return Some(s.clone()),
                Some(_) => {}
            }
        }

        // Expired under the shared lock; evict under the exclusive one. A
        // concurrent extension may have revived it in between.
        let mut sessions = self.write();
        match sessions.get(id) {
            Some(s) if s.is_live_at(now) => Some(s.clone()),
            Some(s) => {
                tracing::debug!(user_id = s.user_id, "session expired");
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    fn extend_session(&self, id: &SessionId) {
        let now = self.clock.now();
        let mut sessions = self.write();
        if let Some(s) = sessions.get_mut(id) {
            s.expires_at = s.expires_at.max(now + self.ttl);
            s.last_activity = now;
        }
    }

    fn delete_session(&self, id: &SessionId) {
        if let Some(s) = self.write().remove(id) {
            tracing::debug!(user_id = s.user_id, "session deleted");
        }
    }

    fn get_session_by_user(&self, user_id: UserId) -> Option<Session> {
        let now = self.clock.now();
        self.read()
            .values()
            .find(|s| s.user_id == user_id && s.is_live_at(now))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn start() -> Self {
            Self(Arc::new(Mutex::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            )))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn registry() -> (SessionRegistry<ManualClock>, ManualClock) {
        let clock = ManualClock::start();
        (
            SessionRegistry::with_clock(Duration::hours(24), clock.clone()),
            clock,
        )
    }

    #[test]
    fn tokens_are_long_and_distinct() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(a.as_str().len(), 43);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn create_then_get() {
        let (reg, _) = registry();
        let s = reg.create_session(1, "ann", "10.0.0.1:5000").unwrap();
        let got = reg.get_session(&s.id).unwrap();
        assert_eq!(got.user_id, 1);
        assert_eq!(got.username, "ann");
        assert_eq!(got.ip_address, "10.0.0.1:5000");
        assert_eq!(got.expires_at - got.created_at, Duration::hours(24));
    }

    #[test]
    fn new_login_supersedes_old_session() {
        let (reg, _) = registry();
        let old = reg.create_session(7, "ann", "a").unwrap();
        let other = reg.create_session(8, "bob", "b").unwrap();
        let new = reg.create_session(7, "ann", "c").unwrap();

        assert!(reg.get_session(&old.id).is_none());
        assert_eq!(reg.get_session_by_user(7).unwrap().id, new.id);
        assert!(reg.get_session(&other.id).is_some());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn expired_read_evicts() {
        let (reg, clock) = registry();
        let s = reg.create_session(1, "ann", "a").unwrap();

        clock.advance(Duration::hours(24));
        assert!(reg.get_session(&s.id).is_none());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn expired_session_is_not_found_by_user() {
        let (reg, clock) = registry();
        reg.create_session(1, "ann", "a").unwrap();
        clock.advance(Duration::hours(25));
        assert!(reg.get_session_by_user(1).is_none());
    }

    #[test]
    fn extension_slides_expiry_forward() {
        let (reg, clock) = registry();
        let s = reg.create_session(1, "ann", "a").unwrap();

        clock.advance(Duration::hours(23));
        reg.extend_session(&s.id);
        let extended = reg.get_session(&s.id).unwrap();
        assert!(extended.expires_at > s.expires_at);
        assert_eq!(extended.last_activity, clock.now());

        // Would have expired without the extension.
        clock.advance(Duration::hours(2));
        assert!(reg.get_session(&s.id).is_some());
    }

    #[test]
    fn expiry_never_moves_backwards() {
        let (reg, _) = registry();
        let s = reg.create_session(1, "ann", "a").unwrap();
        reg.extend_session(&s.id);
        reg.extend_session(&s.id);
        assert_eq!(reg.get_session(&s.id).unwrap().expires_at, s.expires_at);
    }

    #[test]
    fn extend_and_delete_are_noops_when_absent() {
        let (reg, _) = registry();
        let ghost = SessionId::new("ghost");
        reg.extend_session(&ghost);
        reg.delete_session(&ghost);
        assert!(reg.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let (reg, _) = registry();
        let s = reg.create_session(1, "ann", "a").unwrap();
        reg.delete_session(&s.id);
        reg.delete_session(&s.id);
        assert!(reg.get_session(&s.id).is_none());
    }

    #[test]
    fn purge_only_removes_expired() {
        let (reg, clock) = registry();
        let stale = reg.create_session(1, "ann", "a").unwrap();
        clock.advance(Duration::hours(12));
        let fresh = reg.create_session(2, "bob", "b").unwrap();
        clock.advance(Duration::hours(13));

        assert_eq!(reg.purge_expired(), 1);
        assert!(reg.get_session(&stale.id).is_none());
        assert!(reg.get_session(&fresh.id).is_some());
    }

    #[test]
    fn concurrent_logins_leave_one_session_per_user() {
        let reg = SessionRegistry::new();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let reg = &reg;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let s = reg.create_session(i % 2, "user", "addr").unwrap();
                        reg.extend_session(&s.id);
                        let _ = reg.get_session(&s.id);
                        let _ = reg.get_session_by_user(i % 2);
                    }
                });
            }
        });
        assert_eq!(reg.len(), 2);
        assert!(reg.get_session_by_user(0).is_some());
        assert!(reg.get_session_by_user(1).is_some());
    }
}
