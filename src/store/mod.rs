//!
//! Entity store contract
//! ---------------------
//! Durable storage of accounts, users, groups, policies, sessions, ownership and
//! sharing records is owned by the host platform. This module defines the
//! operations the identity core needs from it (point lookups, filtered and paged
//! lists, projections, counts, existence checks, bulk insert/delete) plus the
//! single authoritative clock used for every expiry comparison.
//!
//! `MemoryStore` is a complete in-process implementation used by tests and by
//! single-node deployments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::model::{
    Account, AccountQuota, AccountType, Policy, QuotaConfig, ResourceOwnership, Session, SharedResource, User,
    UserGroup,
};

mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {entity}[uuid:{uuid}]")]
    Duplicate { entity: &'static str, uuid: String },

    #[error("unable to find {entity}[uuid:{uuid}]")]
    Missing { entity: &'static str, uuid: String },

    #[error("entity store unavailable: {message}")]
    Unavailable { message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Offset/limit window for list queries. `limit = None` returns everything after `offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Page {
    pub fn all() -> Self { Page::default() }
    pub fn new(offset: usize, limit: usize) -> Self { Page { offset, limit: Some(limit) } }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let it = items.into_iter().skip(self.offset);
        match self.limit {
            Some(n) => it.take(n).collect(),
            None => it.collect(),
        }
    }
}

/// Storage operations required by the identity core.
///
/// Implementations must be thread-safe; every method is a short, single-entity or
/// small-batch operation.
pub trait EntityStore: Send + Sync {
    /// Authoritative current time. All nodes compare expiry against this clock.
    fn now(&self) -> StoreResult<DateTime<Utc>>;

    // Accounts

    fn insert_account(&self, account: Account) -> StoreResult<()>;
    fn find_account(&self, uuid: &str) -> StoreResult<Option<Account>>;
    fn find_account_by_name(&self, name: &str) -> StoreResult<Option<Account>>;
    fn account_type(&self, uuid: &str) -> StoreResult<Option<AccountType>>;
    fn account_name_exists(&self, name: &str) -> StoreResult<bool>;
    fn update_account(&self, account: Account) -> StoreResult<()>;
    fn delete_account(&self, uuid: &str) -> StoreResult<bool>;
    fn list_accounts(&self, page: Page) -> StoreResult<Vec<Account>>;

    // Users and groups

    fn insert_user(&self, user: User) -> StoreResult<()>;
    fn find_user(&self, uuid: &str) -> StoreResult<Option<User>>;
    fn find_user_by_name(&self, account_uuid: &str, name: &str) -> StoreResult<Option<User>>;
    fn update_user(&self, user: User) -> StoreResult<()>;
    fn list_users(&self, account_uuid: &str, page: Page) -> StoreResult<Vec<User>>;
    fn delete_users_of_account(&self, account_uuid: &str) -> StoreResult<usize>;

    fn insert_group(&self, group: UserGroup) -> StoreResult<()>;
    fn find_group(&self, uuid: &str) -> StoreResult<Option<UserGroup>>;
    fn group_name_exists(&self, account_uuid: &str, name: &str) -> StoreResult<bool>;
    fn add_user_to_group(&self, group_uuid: &str, user_uuid: &str) -> StoreResult<()>;
    fn delete_groups_of_account(&self, account_uuid: &str) -> StoreResult<usize>;

    // Policies

    fn insert_policies(&self, policies: Vec<Policy>) -> StoreResult<()>;
    fn find_policy(&self, uuid: &str) -> StoreResult<Option<Policy>>;
    fn list_policies(&self, account_uuid: &str, page: Page) -> StoreResult<Vec<Policy>>;
    /// Removes the policy and every user/group attachment of it.
    fn delete_policy(&self, uuid: &str) -> StoreResult<bool>;
    /// Returns the uuids of the removed policies.
    fn delete_policies_of_account(&self, account_uuid: &str) -> StoreResult<Vec<String>>;
    fn attach_policy_to_user(&self, policy_uuid: &str, user_uuid: &str) -> StoreResult<()>;
    fn detach_policy_from_user(&self, policy_uuid: &str, user_uuid: &str) -> StoreResult<()>;
    fn attach_policy_to_group(&self, policy_uuid: &str, group_uuid: &str) -> StoreResult<()>;
    fn detach_policy_from_group(&self, policy_uuid: &str, group_uuid: &str) -> StoreResult<()>;
    /// Policies attached directly to the user, in attachment order.
    fn user_policies(&self, user_uuid: &str) -> StoreResult<Vec<Policy>>;
    /// Policies attached to any group the user belongs to, deduplicated.
    fn group_policies(&self, user_uuid: &str) -> StoreResult<Vec<Policy>>;

    // Sessions

    fn insert_session(&self, session: Session) -> StoreResult<()>;
    fn find_session(&self, uuid: &str) -> StoreResult<Option<Session>>;
    fn session_exists(&self, uuid: &str) -> StoreResult<bool>;
    fn count_sessions(&self, account_uuid: &str, user_uuid: Option<&str>) -> StoreResult<usize>;
    fn session_uuids_of_account(&self, account_uuid: &str) -> StoreResult<Vec<String>>;
    /// Uuids of sessions with `now() >= expires_at`, judged by the store clock.
    fn expired_session_uuids(&self) -> StoreResult<Vec<String>>;
    fn delete_sessions(&self, uuids: &[String]) -> StoreResult<usize>;

    // Ownership and sharing

    fn insert_ownership(&self, ownership: ResourceOwnership) -> StoreResult<()>;
    fn ownerships_of(&self, resource_uuids: &[String]) -> StoreResult<Vec<ResourceOwnership>>;
    fn owned_resource_uuids(&self, account_uuid: &str, resource_type: &str) -> StoreResult<Vec<String>>;
    fn delete_ownerships(&self, resource_type: &str, resource_uuids: &[String]) -> StoreResult<usize>;

    /// Rows already present are skipped; returns how many were written.
    fn insert_shares(&self, shares: Vec<SharedResource>) -> StoreResult<usize>;
    fn shares_of(&self, resource_uuids: &[String]) -> StoreResult<Vec<SharedResource>>;
    /// Resources of the type shared publicly or directly to the account.
    fn shared_resource_uuids(&self, account_uuid: &str, resource_type: &str) -> StoreResult<Vec<String>>;
    /// `receivers = None` removes every share (public and direct) of the resources.
    fn delete_shares(&self, resource_uuids: &[String], receivers: Option<&[String]>) -> StoreResult<usize>;
    fn delete_public_shares(&self, resource_uuids: &[String]) -> StoreResult<usize>;
    /// Shares the account owns or receives directly.
    fn delete_shares_of_account(&self, account_uuid: &str) -> StoreResult<usize>;
    /// Moves every ownership record of `from` to `to`; returns how many moved.
    fn transfer_ownerships(&self, from: &str, to: &str) -> StoreResult<usize>;

    // Quotas

    fn quota_config_names(&self) -> StoreResult<Vec<String>>;
    fn quota_configs(&self) -> StoreResult<Vec<QuotaConfig>>;
    fn insert_quota_configs(&self, configs: Vec<QuotaConfig>) -> StoreResult<()>;
    fn insert_account_quotas(&self, quotas: Vec<AccountQuota>) -> StoreResult<()>;
    fn find_account_quota(&self, account_uuid: &str, name: &str) -> StoreResult<Option<AccountQuota>>;
    fn update_account_quota(&self, quota: AccountQuota) -> StoreResult<bool>;
    fn delete_account_quotas(&self, account_uuid: &str) -> StoreResult<usize>;
}
