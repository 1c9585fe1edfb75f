use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::Session;
use crate::config::IdentityConfig;
use crate::error::{AppError, AppResult};
use crate::store::EntityStore;

pub const SESSION_EXPIRED: &str = "Session expired";

/// Uuid in the platform's 32-hex form.
pub fn new_uuid() -> String { Uuid::new_v4().simple().to_string() }

/// Creates, validates and expires sessions.
///
/// The cache is an accelerator only. Every session is persisted before it is
/// cached, and a miss always falls back to the store, so losing the cache (or
/// running several nodes with their own caches) never loses a session.
///
/// Store deletes happen while the cache write lock is held, and a miss only
/// caches a row that still exists under that lock. A session removed by logout
/// or sweep therefore never comes back into the cache.
pub struct SessionManager {
    store: Arc<dyn EntityStore>,
    cache: RwLock<HashMap<String, Session>>,
    /// Serializes the ceiling count with the insert it guards.
    admission: Mutex<()>,
    max_concurrent: u32,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn EntityStore>, cfg: &IdentityConfig) -> Self {
        let timeout = Duration::seconds(cfg.session_timeout_secs.min(u32::MAX as u64) as i64);
        Self { store, cache: RwLock::new(HashMap::new()), admission: Mutex::new(()), max_concurrent: cfg.max_concurrent_sessions, timeout }
    }

    pub fn create_session(&self, account_uuid: &str, user_uuid: Option<&str>) -> AppResult<Session> {
        let _admitting = self.admission.lock();
        let live = self.store.count_sessions(account_uuid, user_uuid)?;
        if live >= self.max_concurrent as usize {
            return Err(AppError::authentication(format!(
                "Login sessions hit limit of max allowed concurrent login sessions, max allowed: {}",
                self.max_concurrent
            )));
        }

        let now = self.store.now()?;
        let session = Session {
            uuid: new_uuid(),
            account_uuid: account_uuid.to_string(),
            user_uuid: user_uuid.map(|u| u.to_string()),
            created_at: now,
            expires_at: now + self.timeout,
        };
        self.store.insert_session(session.clone())?;
        self.cache.write().insert(session.uuid.clone(), session.clone());
        debug!(
            target: "cloud_iam::session",
            "created session[uuid: {}] for account[uuid: {}] user[uuid: {}], expires at {}",
            session.uuid, account_uuid, user_uuid.unwrap_or("-"), session.expires_at
        );
        Ok(session)
    }

    pub fn validate(&self, session_uuid: &str) -> AppResult<Session> {
        let cached = self.cache.read().get(session_uuid).cloned();
        let session = match cached {
            Some(s) => s,
            None => {
                let Some(s) = self.store.find_session(session_uuid)? else {
                    return Err(AppError::invalid_session(SESSION_EXPIRED));
                };
                let mut cache = self.cache.write();
                // a logout or sweep may have run since the read
                if !self.store.session_exists(session_uuid)? {
                    return Err(AppError::invalid_session(SESSION_EXPIRED));
                }
                cache.insert(s.uuid.clone(), s.clone());
                s
            }
        };

        let now = self.store.now()?;
        if session.is_expired_at(now) {
            self.logout(session_uuid)?;
            debug!(target: "cloud_iam::session", "session[uuid: {}] expired at {}, removed", session_uuid, session.expires_at);
            return Err(AppError::invalid_session(SESSION_EXPIRED));
        }
        Ok(session)
    }

    /// Known to this node's cache or to the store. Expiry is not judged here.
    pub fn is_known(&self, session_uuid: &str) -> AppResult<bool> {
        if self.cache.read().contains_key(session_uuid) {
            return Ok(true);
        }
        Ok(self.store.session_exists(session_uuid)?)
    }

    /// Idempotent.
    pub fn logout(&self, session_uuid: &str) -> AppResult<()> {
        let mut cache = self.cache.write();
        self.store.delete_sessions(&[session_uuid.to_string()])?;
        cache.remove(session_uuid);
        Ok(())
    }

    /// Drops every session of the account; used when the account goes away.
    pub fn logout_account(&self, account_uuid: &str) -> AppResult<usize> {
        let mut cache = self.cache.write();
        let uuids = self.store.session_uuids_of_account(account_uuid)?;
        let removed = self.store.delete_sessions(&uuids)?;
        cache.retain(|_, s| s.account_uuid != account_uuid);
        Ok(removed)
    }

    /// Bulk delete of everything the store clock considers expired, then cache eviction.
    pub fn sweep_expired(&self) -> AppResult<usize> {
        let expired = self.store.expired_session_uuids()?;
        if expired.is_empty() {
            return Ok(0);
        }
        let removed = {
            let mut cache = self.cache.write();
            let removed = self.store.delete_sessions(&expired)?;
            for uuid in expired.iter() {
                cache.remove(uuid);
            }
            removed
        };
        debug!(target: "cloud_iam::session", "swept {} expired sessions", removed);
        Ok(removed)
    }

    pub fn cached_len(&self) -> usize { self.cache.read().len() }

    pub fn is_cached(&self, session_uuid: &str) -> bool { self.cache.read().contains_key(session_uuid) }
}

/// The single background worker running `sweep_expired` at a fixed interval.
pub struct SessionSweeper {
    handle: JoinHandle<()>,
}

impl SessionSweeper {
    /// Must be called from within a tokio runtime.
    pub fn spawn(sessions: Arc<SessionManager>, every: StdDuration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately; skip it so startup does not race the store
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = sessions.sweep_expired() {
                    warn!(target: "cloud_iam::session", "failed to clean up expired sessions: {}", e);
                }
            }
        });
        debug!(target: "cloud_iam::session", "session sweeper started, interval {}s", every.as_secs());
        Self { handle }
    }

    pub fn is_running(&self) -> bool { !self.handle.is_finished() }

    pub fn stop(self) {
        self.handle.abort();
        debug!(target: "cloud_iam::session", "session sweeper stopped");
    }
}
