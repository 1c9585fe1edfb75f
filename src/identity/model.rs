use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountType {
    SystemAdmin,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// argon2 PHC string, never the clear password
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub uuid: String,
    pub account_uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserGroup {
    pub uuid: String,
    pub account_uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StatementEffect {
    Allow,
    Deny,
}

/// One named allow/deny rule. Patterns are tried in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statement {
    pub name: String,
    pub effect: StatementEffect,
    pub actions: Vec<String>,
}

impl Statement {
    pub fn new(name: impl Into<String>, effect: StatementEffect, actions: Vec<String>) -> Self {
        Statement { name: name.into(), effect, actions }
    }

    pub fn allow(name: impl Into<String>, actions: &[&str]) -> Self {
        Self::new(name, StatementEffect::Allow, actions.iter().map(|a| a.to_string()).collect())
    }

    pub fn deny(name: impl Into<String>, actions: &[&str]) -> Self {
        Self::new(name, StatementEffect::Deny, actions.iter().map(|a| a.to_string()).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    pub uuid: String,
    pub account_uuid: String,
    pub name: String,
    pub statements: Vec<Statement>,
}

/// An authenticated, expiring credential. `user_uuid = None` marks an account session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub uuid: String,
    pub account_uuid: String,
    #[serde(default)]
    pub user_uuid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_account_session(&self) -> bool { self.user_uuid.is_none() }

    /// Valid strictly before `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceOwnership {
    pub account_uuid: String,
    pub resource_uuid: String,
    pub resource_type: String,
}

/// Visibility relaxation; the owner stays the owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SharedResource {
    pub owner_account_uuid: String,
    pub resource_uuid: String,
    pub resource_type: String,
    #[serde(default)]
    pub receiver_account_uuid: Option<String>,
    #[serde(default)]
    pub to_public: bool,
}

impl SharedResource {
    pub fn visible_to(&self, account_uuid: &str) -> bool {
        self.to_public || self.receiver_account_uuid.as_deref() == Some(account_uuid)
    }
}

/// Account-independent default ceiling for one resource type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaConfig {
    pub name: String,
    pub value: i64,
    pub default_value: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountQuota {
    pub account_uuid: String,
    pub name: String,
    pub value: i64,
}
