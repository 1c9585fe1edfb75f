//! Identity configuration values.
//!
//! Values are plain typed lookups: defaults first, then an optional JSON document,
//! then environment overrides.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    /// Maximum concurrent sessions per (account, user) pair.
    pub max_concurrent_sessions: u32,
    /// Session lifetime from creation, in seconds.
    pub session_timeout_secs: u64,
    /// Interval between expired-session sweeps, in seconds.
    pub session_cleanup_interval_secs: u64,
    /// Resource types whose instances get ownership records.
    pub tracked_resource_types: Vec<String>,
    pub initial_admin_name: String,
    pub initial_admin_uuid: String,
    pub initial_admin_password: String,
}

impl IdentityConfig {
    pub const ENV_MAX_CONCURRENT_SESSIONS: &'static str = "CLOUD_IAM_MAX_CONCURRENT_SESSIONS";
    pub const ENV_SESSION_TIMEOUT_SECS: &'static str = "CLOUD_IAM_SESSION_TIMEOUT_SECS";
    pub const ENV_SESSION_CLEANUP_INTERVAL_SECS: &'static str = "CLOUD_IAM_SESSION_CLEANUP_INTERVAL_SECS";

    fn default_tracked_types() -> Vec<String> {
        [
            "VmInstance",
            "Volume",
            "Image",
            "L3Network",
            "Vip",
            "Eip",
            "SecurityGroup",
            "LoadBalancer",
            "LoadBalancerListener",
            "PortForwardingRule",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Parse a JSON document; missing fields fall back to defaults.
    pub fn from_json(text: &str) -> AppResult<Self> {
        let cfg: IdentityConfig = serde_json::from_str(text)
            .map_err(|e| AppError::internal(format!("invalid identity configuration: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_with(|k| std::env::var(k).ok());
        cfg
    }

    /// Apply overrides from an arbitrary lookup. Unparsable values are ignored.
    pub fn apply_env_with<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup(Self::ENV_MAX_CONCURRENT_SESSIONS) {
            match v.trim().parse::<u32>() {
                Ok(n) => self.max_concurrent_sessions = n,
                Err(_) => warn!(target: "cloud_iam::config", "ignoring {}='{}': not an integer", Self::ENV_MAX_CONCURRENT_SESSIONS, v),
            }
        }
        if let Some(v) = lookup(Self::ENV_SESSION_TIMEOUT_SECS) {
            match v.trim().parse::<u64>() {
                Ok(n) => self.session_timeout_secs = n,
                Err(_) => warn!(target: "cloud_iam::config", "ignoring {}='{}': not an integer", Self::ENV_SESSION_TIMEOUT_SECS, v),
            }
        }
        if let Some(v) = lookup(Self::ENV_SESSION_CLEANUP_INTERVAL_SECS) {
            match v.trim().parse::<u64>() {
                Ok(n) => self.session_cleanup_interval_secs = n,
                Err(_) => warn!(target: "cloud_iam::config", "ignoring {}='{}': not an integer", Self::ENV_SESSION_CLEANUP_INTERVAL_SECS, v),
            }
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(AppError::internal("max_concurrent_sessions must be greater than 0"));
        }
        if self.session_timeout_secs == 0 {
            return Err(AppError::internal("session_timeout_secs must be greater than 0"));
        }
        if self.session_cleanup_interval_secs == 0 {
            return Err(AppError::internal("session_cleanup_interval_secs must be greater than 0"));
        }
        if self.initial_admin_name.trim().is_empty() {
            return Err(AppError::internal("initial_admin_name cannot be empty"));
        }
        Ok(())
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 500,
            session_timeout_secs: 7200,
            session_cleanup_interval_secs: 3600,
            tracked_resource_types: Self::default_tracked_types(),
            initial_admin_name: "admin".to_string(),
            initial_admin_uuid: "36c27e8ff05c4780bf6d2fa65700f22e".to_string(),
            initial_admin_password: "password".to_string(),
        }
    }
}
