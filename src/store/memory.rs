use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::{EntityStore, Page, StoreError, StoreResult};
use crate::identity::model::{
    Account, AccountQuota, AccountType, Policy, QuotaConfig, ResourceOwnership, Session, SharedResource, User,
    UserGroup,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    users: HashMap<String, User>,
    groups: HashMap<String, UserGroup>,
    /// (group_uuid, user_uuid) in insertion order
    group_members: Vec<(String, String)>,
    policies: HashMap<String, Policy>,
    /// (policy_uuid, user_uuid) in attachment order
    user_policy_refs: Vec<(String, String)>,
    /// (policy_uuid, group_uuid) in attachment order
    group_policy_refs: Vec<(String, String)>,
    sessions: HashMap<String, Session>,
    /// resource_uuid -> owner record
    ownerships: HashMap<String, ResourceOwnership>,
    shares: Vec<SharedResource>,
    quota_configs: Vec<QuotaConfig>,
    account_quotas: Vec<AccountQuota>,
}

struct Clock {
    pinned: Option<DateTime<Utc>>,
    offset: Duration,
}

impl Default for Clock {
    fn default() -> Self { Clock { pinned: None, offset: Duration::zero() } }
}

/// In-process entity store.
///
/// All tables live behind one lock so every call behaves like a small transaction.
/// The clock follows wall time unless pinned, and can be moved forward to exercise
/// expiry without sleeping.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    clock: RwLock<Clock>,
    unavailable: AtomicBool,
    #[cfg(test)]
    after_find_session: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

fn sorted_by_created<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (DateTime<Utc>, String),
{
    items.sort_by_key(|a| key(a));
    items
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Store whose clock starts at `start` and only moves through `advance`.
    pub fn with_clock(start: DateTime<Utc>) -> Self {
        let s = Self::default();
        s.clock.write().pinned = Some(start);
        s
    }

    pub fn advance(&self, by: Duration) {
        let mut c = self.clock.write();
        c.offset = c.offset + by;
    }

    /// Simulate an outage: every operation fails until switched back.
    pub fn set_unavailable(&self, down: bool) { self.unavailable.store(down, Ordering::SeqCst); }

    pub fn session_count(&self) -> usize { self.tables.read().sessions.len() }

    /// Runs `f` once, right after the next `find_session` has read its row.
    #[cfg(test)]
    pub(crate) fn interleave_after_find_session(&self, f: impl FnOnce() + Send + 'static) {
        *self.after_find_session.lock() = Some(Box::new(f));
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { message: "memory store switched off".into() });
        }
        Ok(())
    }

    fn current_time(&self) -> DateTime<Utc> {
        let c = self.clock.read();
        c.pinned.unwrap_or_else(Utc::now) + c.offset
    }
}

impl EntityStore for MemoryStore {
    fn now(&self) -> StoreResult<DateTime<Utc>> {
        self.check()?;
        Ok(self.current_time())
    }

    fn insert_account(&self, account: Account) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if t.accounts.contains_key(&account.uuid) {
            return Err(StoreError::Duplicate { entity: "account", uuid: account.uuid });
        }
        t.accounts.insert(account.uuid.clone(), account);
        Ok(())
    }

    fn find_account(&self, uuid: &str) -> StoreResult<Option<Account>> {
        self.check()?;
        Ok(self.tables.read().accounts.get(uuid).cloned())
    }

    fn find_account_by_name(&self, name: &str) -> StoreResult<Option<Account>> {
        self.check()?;
        Ok(self.tables.read().accounts.values().find(|a| a.name == name).cloned())
    }

    fn account_type(&self, uuid: &str) -> StoreResult<Option<AccountType>> {
        self.check()?;
        Ok(self.tables.read().accounts.get(uuid).map(|a| a.account_type))
    }

    fn account_name_exists(&self, name: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self.tables.read().accounts.values().any(|a| a.name == name))
    }

    fn update_account(&self, account: Account) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        match t.accounts.get_mut(&account.uuid) {
            Some(slot) => { *slot = account; Ok(()) }
            None => Err(StoreError::Missing { entity: "account", uuid: account.uuid }),
        }
    }

    fn delete_account(&self, uuid: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self.tables.write().accounts.remove(uuid).is_some())
    }

    fn list_accounts(&self, page: Page) -> StoreResult<Vec<Account>> {
        self.check()?;
        let all: Vec<Account> = self.tables.read().accounts.values().cloned().collect();
        Ok(page.apply(sorted_by_created(all, |a| (a.created_at, a.name.clone()))))
    }

    fn insert_user(&self, user: User) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if t.users.contains_key(&user.uuid) {
            return Err(StoreError::Duplicate { entity: "user", uuid: user.uuid });
        }
        t.users.insert(user.uuid.clone(), user);
        Ok(())
    }

    fn find_user(&self, uuid: &str) -> StoreResult<Option<User>> {
        self.check()?;
        Ok(self.tables.read().users.get(uuid).cloned())
    }

    fn find_user_by_name(&self, account_uuid: &str, name: &str) -> StoreResult<Option<User>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.account_uuid == account_uuid && u.name == name)
            .cloned())
    }

    fn update_user(&self, user: User) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        match t.users.get_mut(&user.uuid) {
            Some(slot) => { *slot = user; Ok(()) }
            None => Err(StoreError::Missing { entity: "user", uuid: user.uuid }),
        }
    }

    fn list_users(&self, account_uuid: &str, page: Page) -> StoreResult<Vec<User>> {
        self.check()?;
        let all: Vec<User> = self.tables.read().users.values().filter(|u| u.account_uuid == account_uuid).cloned().collect();
        Ok(page.apply(sorted_by_created(all, |u| (u.created_at, u.name.clone()))))
    }

    fn delete_users_of_account(&self, account_uuid: &str) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let doomed: HashSet<String> =
            t.users.values().filter(|u| u.account_uuid == account_uuid).map(|u| u.uuid.clone()).collect();
        t.users.retain(|k, _| !doomed.contains(k));
        t.group_members.retain(|(_, u)| !doomed.contains(u));
        t.user_policy_refs.retain(|(_, u)| !doomed.contains(u));
        Ok(doomed.len())
    }

    fn insert_group(&self, group: UserGroup) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if t.groups.contains_key(&group.uuid) {
            return Err(StoreError::Duplicate { entity: "group", uuid: group.uuid });
        }
        t.groups.insert(group.uuid.clone(), group);
        Ok(())
    }

    fn find_group(&self, uuid: &str) -> StoreResult<Option<UserGroup>> {
        self.check()?;
        Ok(self.tables.read().groups.get(uuid).cloned())
    }

    fn group_name_exists(&self, account_uuid: &str, name: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self.tables.read().groups.values().any(|g| g.account_uuid == account_uuid && g.name == name))
    }

    fn add_user_to_group(&self, group_uuid: &str, user_uuid: &str) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        let pair = (group_uuid.to_string(), user_uuid.to_string());
        if !t.group_members.contains(&pair) {
            t.group_members.push(pair);
        }
        Ok(())
    }

    fn delete_groups_of_account(&self, account_uuid: &str) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let doomed: HashSet<String> =
            t.groups.values().filter(|g| g.account_uuid == account_uuid).map(|g| g.uuid.clone()).collect();
        t.groups.retain(|k, _| !doomed.contains(k));
        t.group_members.retain(|(g, _)| !doomed.contains(g));
        t.group_policy_refs.retain(|(_, g)| !doomed.contains(g));
        Ok(doomed.len())
    }

    fn insert_policies(&self, policies: Vec<Policy>) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if let Some(dup) = policies.iter().find(|p| t.policies.contains_key(&p.uuid)) {
            return Err(StoreError::Duplicate { entity: "policy", uuid: dup.uuid.clone() });
        }
        for p in policies {
            t.policies.insert(p.uuid.clone(), p);
        }
        Ok(())
    }

    fn find_policy(&self, uuid: &str) -> StoreResult<Option<Policy>> {
        self.check()?;
        Ok(self.tables.read().policies.get(uuid).cloned())
    }

    fn list_policies(&self, account_uuid: &str, page: Page) -> StoreResult<Vec<Policy>> {
        self.check()?;
        let mut all: Vec<Policy> =
            self.tables.read().policies.values().filter(|p| p.account_uuid == account_uuid).cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page.apply(all))
    }

    fn delete_policy(&self, uuid: &str) -> StoreResult<bool> {
        self.check()?;
        let mut t = self.tables.write();
        t.user_policy_refs.retain(|(p, _)| p != uuid);
        t.group_policy_refs.retain(|(p, _)| p != uuid);
        Ok(t.policies.remove(uuid).is_some())
    }

    fn delete_policies_of_account(&self, account_uuid: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let mut t = self.tables.write();
        let doomed: Vec<String> =
            t.policies.values().filter(|p| p.account_uuid == account_uuid).map(|p| p.uuid.clone()).collect();
        for uuid in doomed.iter() {
            t.policies.remove(uuid);
        }
        t.user_policy_refs.retain(|(p, _)| !doomed.contains(p));
        t.group_policy_refs.retain(|(p, _)| !doomed.contains(p));
        Ok(doomed)
    }

    fn attach_policy_to_user(&self, policy_uuid: &str, user_uuid: &str) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        let pair = (policy_uuid.to_string(), user_uuid.to_string());
        if !t.user_policy_refs.contains(&pair) {
            t.user_policy_refs.push(pair);
        }
        Ok(())
    }

    fn detach_policy_from_user(&self, policy_uuid: &str, user_uuid: &str) -> StoreResult<()> {
        self.check()?;
        self.tables.write().user_policy_refs.retain(|(p, u)| !(p == policy_uuid && u == user_uuid));
        Ok(())
    }

    fn attach_policy_to_group(&self, policy_uuid: &str, group_uuid: &str) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        let pair = (policy_uuid.to_string(), group_uuid.to_string());
        if !t.group_policy_refs.contains(&pair) {
            t.group_policy_refs.push(pair);
        }
        Ok(())
    }

    fn detach_policy_from_group(&self, policy_uuid: &str, group_uuid: &str) -> StoreResult<()> {
        self.check()?;
        self.tables.write().group_policy_refs.retain(|(p, g)| !(p == policy_uuid && g == group_uuid));
        Ok(())
    }

    fn user_policies(&self, user_uuid: &str) -> StoreResult<Vec<Policy>> {
        self.check()?;
        let t = self.tables.read();
        Ok(t.user_policy_refs
            .iter()
            .filter(|(_, u)| u == user_uuid)
            .filter_map(|(p, _)| t.policies.get(p).cloned())
            .collect())
    }

    fn group_policies(&self, user_uuid: &str) -> StoreResult<Vec<Policy>> {
        self.check()?;
        let t = self.tables.read();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for (group, _) in t.group_members.iter().filter(|(_, u)| u == user_uuid) {
            for (policy, _) in t.group_policy_refs.iter().filter(|(_, g)| g == group) {
                if !seen.insert(policy.as_str()) { continue; }
                if let Some(p) = t.policies.get(policy) { out.push(p.clone()); }
            }
        }
        Ok(out)
    }

    fn insert_session(&self, session: Session) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if t.sessions.contains_key(&session.uuid) {
            return Err(StoreError::Duplicate { entity: "session", uuid: session.uuid });
        }
        t.sessions.insert(session.uuid.clone(), session);
        Ok(())
    }

    fn find_session(&self, uuid: &str) -> StoreResult<Option<Session>> {
        self.check()?;
        let found = self.tables.read().sessions.get(uuid).cloned();
        #[cfg(test)]
        {
            let hook = self.after_find_session.lock().take();
            if let Some(f) = hook {
                f();
            }
        }
        Ok(found)
    }

    fn session_exists(&self, uuid: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self.tables.read().sessions.contains_key(uuid))
    }

    fn count_sessions(&self, account_uuid: &str, user_uuid: Option<&str>) -> StoreResult<usize> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .sessions
            .values()
            .filter(|s| s.account_uuid == account_uuid && s.user_uuid.as_deref() == user_uuid)
            .count())
    }

    fn session_uuids_of_account(&self, account_uuid: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self.tables.read().sessions.values().filter(|s| s.account_uuid == account_uuid).map(|s| s.uuid.clone()).collect())
    }

    fn expired_session_uuids(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        let now = self.current_time();
        Ok(self.tables.read().sessions.values().filter(|s| s.is_expired_at(now)).map(|s| s.uuid.clone()).collect())
    }

    fn delete_sessions(&self, uuids: &[String]) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        Ok(uuids.iter().filter(|u| t.sessions.remove(u.as_str()).is_some()).count())
    }

    fn insert_ownership(&self, ownership: ResourceOwnership) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if t.ownerships.contains_key(&ownership.resource_uuid) {
            return Err(StoreError::Duplicate { entity: "resource ownership", uuid: ownership.resource_uuid });
        }
        t.ownerships.insert(ownership.resource_uuid.clone(), ownership);
        Ok(())
    }

    fn ownerships_of(&self, resource_uuids: &[String]) -> StoreResult<Vec<ResourceOwnership>> {
        self.check()?;
        let t = self.tables.read();
        Ok(resource_uuids.iter().filter_map(|u| t.ownerships.get(u).cloned()).collect())
    }

    fn owned_resource_uuids(&self, account_uuid: &str, resource_type: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .ownerships
            .values()
            .filter(|o| o.account_uuid == account_uuid && o.resource_type == resource_type)
            .map(|o| o.resource_uuid.clone())
            .collect())
    }

    fn delete_ownerships(&self, resource_type: &str, resource_uuids: &[String]) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let before = t.ownerships.len();
        t.ownerships.retain(|k, o| !(o.resource_type == resource_type && resource_uuids.contains(k)));
        Ok(before - t.ownerships.len())
    }

    fn insert_shares(&self, shares: Vec<SharedResource>) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let before = t.shares.len();
        for s in shares {
            if !t.shares.contains(&s) {
                t.shares.push(s);
            }
        }
        Ok(t.shares.len() - before)
    }

    fn shares_of(&self, resource_uuids: &[String]) -> StoreResult<Vec<SharedResource>> {
        self.check()?;
        Ok(self.tables.read().shares.iter().filter(|s| resource_uuids.contains(&s.resource_uuid)).cloned().collect())
    }

    fn shared_resource_uuids(&self, account_uuid: &str, resource_type: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let t = self.tables.read();
        let mut out: Vec<String> = Vec::new();
        for s in t.shares.iter().filter(|s| s.resource_type == resource_type && s.visible_to(account_uuid)) {
            if !out.contains(&s.resource_uuid) { out.push(s.resource_uuid.clone()); }
        }
        Ok(out)
    }

    fn delete_shares(&self, resource_uuids: &[String], receivers: Option<&[String]>) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let before = t.shares.len();
        t.shares.retain(|s| {
            if !resource_uuids.contains(&s.resource_uuid) { return true; }
            match receivers {
                None => false,
                Some(accounts) => !s.receiver_account_uuid.as_ref().map(|r| accounts.contains(r)).unwrap_or(false),
            }
        });
        Ok(before - t.shares.len())
    }

    fn delete_public_shares(&self, resource_uuids: &[String]) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let before = t.shares.len();
        t.shares.retain(|s| !(s.to_public && resource_uuids.contains(&s.resource_uuid)));
        Ok(before - t.shares.len())
    }

    fn delete_shares_of_account(&self, account_uuid: &str) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let before = t.shares.len();
        t.shares.retain(|s| s.owner_account_uuid != account_uuid && s.receiver_account_uuid.as_deref() != Some(account_uuid));
        Ok(before - t.shares.len())
    }

    fn transfer_ownerships(&self, from: &str, to: &str) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let mut moved = 0;
        for o in t.ownerships.values_mut().filter(|o| o.account_uuid == from) {
            o.account_uuid = to.to_string();
            moved += 1;
        }
        Ok(moved)
    }

    fn quota_config_names(&self) -> StoreResult<Vec<String>> {
        self.check()?;
        Ok(self.tables.read().quota_configs.iter().map(|q| q.name.clone()).collect())
    }

    fn quota_configs(&self) -> StoreResult<Vec<QuotaConfig>> {
        self.check()?;
        Ok(self.tables.read().quota_configs.clone())
    }

    fn insert_quota_configs(&self, configs: Vec<QuotaConfig>) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if let Some(dup) = configs.iter().find(|c| t.quota_configs.iter().any(|q| q.name == c.name)) {
            return Err(StoreError::Duplicate { entity: "quota config", uuid: dup.name.clone() });
        }
        t.quota_configs.extend(configs);
        Ok(())
    }

    fn insert_account_quotas(&self, quotas: Vec<AccountQuota>) -> StoreResult<()> {
        self.check()?;
        self.tables.write().account_quotas.extend(quotas);
        Ok(())
    }

    fn find_account_quota(&self, account_uuid: &str, name: &str) -> StoreResult<Option<AccountQuota>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .account_quotas
            .iter()
            .find(|q| q.account_uuid == account_uuid && q.name == name)
            .cloned())
    }

    fn update_account_quota(&self, quota: AccountQuota) -> StoreResult<bool> {
        self.check()?;
        let mut t = self.tables.write();
        match t.account_quotas.iter_mut().find(|q| q.account_uuid == quota.account_uuid && q.name == quota.name) {
            Some(slot) => { slot.value = quota.value; Ok(true) }
            None => Ok(false),
        }
    }

    fn delete_account_quotas(&self, account_uuid: &str) -> StoreResult<usize> {
        self.check()?;
        let mut t = self.tables.write();
        let before = t.account_quotas.len();
        t.account_quotas.retain(|q| q.account_uuid != account_uuid);
        Ok(before - t.account_quotas.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::StatementEffect;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() }

    fn session(uuid: &str, account: &str, user: Option<&str>, ttl_secs: i64) -> Session {
        Session {
            uuid: uuid.into(),
            account_uuid: account.into(),
            user_uuid: user.map(|u| u.to_string()),
            created_at: t0(),
            expires_at: t0() + Duration::seconds(ttl_secs),
        }
    }

    fn policy(uuid: &str, account: &str) -> Policy {
        Policy {
            uuid: uuid.into(),
            account_uuid: account.into(),
            name: format!("p-{}", uuid),
            statements: vec![crate::identity::model::Statement::new("s", StatementEffect::Allow, vec!["a:b".into()])],
        }
    }

    #[test]
    fn pinned_clock_advances_only_on_demand() {
        let store = MemoryStore::with_clock(t0());
        assert_eq!(store.now().unwrap(), t0());
        store.advance(Duration::seconds(90));
        assert_eq!(store.now().unwrap(), t0() + Duration::seconds(90));
    }

    #[test]
    fn expired_sessions_follow_store_clock() {
        let store = MemoryStore::with_clock(t0());
        store.insert_session(session("s1", "a", None, 10)).unwrap();
        store.insert_session(session("s2", "a", Some("u"), 100)).unwrap();
        assert!(store.expired_session_uuids().unwrap().is_empty());
        store.advance(Duration::seconds(10));
        assert_eq!(store.expired_session_uuids().unwrap(), vec!["s1".to_string()]);
        assert_eq!(store.delete_sessions(&["s1".into(), "nope".into()]).unwrap(), 1);
    }

    #[test]
    fn count_sessions_keys_on_account_and_user() {
        let store = MemoryStore::with_clock(t0());
        store.insert_session(session("s1", "a", None, 10)).unwrap();
        store.insert_session(session("s2", "a", Some("u"), 10)).unwrap();
        store.insert_session(session("s3", "a", Some("u"), 10)).unwrap();
        assert_eq!(store.count_sessions("a", None).unwrap(), 1);
        assert_eq!(store.count_sessions("a", Some("u")).unwrap(), 2);
        assert_eq!(store.count_sessions("b", None).unwrap(), 0);
    }

    #[test]
    fn group_policies_are_deduplicated_across_groups() {
        let store = MemoryStore::new();
        store.insert_policies(vec![policy("p1", "a"), policy("p2", "a")]).unwrap();
        store.add_user_to_group("g1", "u").unwrap();
        store.add_user_to_group("g2", "u").unwrap();
        store.attach_policy_to_group("p1", "g1").unwrap();
        store.attach_policy_to_group("p1", "g2").unwrap();
        store.attach_policy_to_group("p2", "g2").unwrap();
        let uuids: Vec<String> = store.group_policies("u").unwrap().into_iter().map(|p| p.uuid).collect();
        assert_eq!(uuids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn deleting_policy_drops_attachments() {
        let store = MemoryStore::new();
        store.insert_policies(vec![policy("p1", "a")]).unwrap();
        store.attach_policy_to_user("p1", "u").unwrap();
        assert_eq!(store.user_policies("u").unwrap().len(), 1);
        assert!(store.delete_policy("p1").unwrap());
        assert!(store.user_policies("u").unwrap().is_empty());
    }

    #[test]
    fn one_owner_per_resource() {
        let store = MemoryStore::new();
        let own = ResourceOwnership { account_uuid: "a".into(), resource_uuid: "r".into(), resource_type: "Vm".into() };
        store.insert_ownership(own.clone()).unwrap();
        let err = store.insert_ownership(ResourceOwnership { account_uuid: "b".into(), ..own }).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn delete_shares_by_receiver_keeps_public() {
        let store = MemoryStore::new();
        let base = SharedResource {
            owner_account_uuid: "a".into(),
            resource_uuid: "r".into(),
            resource_type: "Image".into(),
            receiver_account_uuid: None,
            to_public: true,
        };
        let direct = SharedResource { receiver_account_uuid: Some("b".into()), to_public: false, ..base.clone() };
        assert_eq!(store.insert_shares(vec![base.clone(), direct.clone()]).unwrap(), 2);
        assert_eq!(store.insert_shares(vec![direct]).unwrap(), 0);
        assert_eq!(store.delete_shares(&["r".into()], Some(&["b".to_string()])).unwrap(), 1);
        assert_eq!(store.shares_of(&["r".into()]).unwrap(), vec![base]);
        assert_eq!(store.delete_shares(&["r".into()], None).unwrap(), 1);
    }

    #[test]
    fn shares_of_account_cover_owned_and_received() {
        let store = MemoryStore::new();
        let share = |owner: &str, resource: &str, receiver: Option<&str>| SharedResource {
            owner_account_uuid: owner.into(),
            resource_uuid: resource.into(),
            resource_type: "Image".into(),
            receiver_account_uuid: receiver.map(|r| r.to_string()),
            to_public: receiver.is_none(),
        };
        store
            .insert_shares(vec![share("a", "r1", None), share("a", "r1", Some("c")), share("b", "r2", Some("a")), share("b", "r3", None)])
            .unwrap();
        assert_eq!(store.delete_shares_of_account("a").unwrap(), 3);
        assert_eq!(store.shares_of(&["r1".into(), "r2".into(), "r3".into()]).unwrap(), vec![share("b", "r3", None)]);
    }

    #[test]
    fn ownerships_move_between_accounts() {
        let store = MemoryStore::new();
        for (owner, r) in [("a", "r1"), ("a", "r2"), ("b", "r3")] {
            store.insert_ownership(ResourceOwnership { account_uuid: owner.into(), resource_uuid: r.into(), resource_type: "Vm".into() }).unwrap();
        }
        assert_eq!(store.transfer_ownerships("a", "admin").unwrap(), 2);
        assert!(store.owned_resource_uuids("a", "Vm").unwrap().is_empty());
        let mut moved = store.owned_resource_uuids("admin", "Vm").unwrap();
        moved.sort();
        assert_eq!(moved, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(store.owned_resource_uuids("b", "Vm").unwrap(), vec!["r3".to_string()]);
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.now(), Err(StoreError::Unavailable { .. })));
        assert!(store.find_account("x").is_err());
        store.set_unavailable(false);
        assert!(store.find_account("x").unwrap().is_none());
    }

    #[test]
    fn page_window() {
        assert_eq!(Page::new(1, 2).apply(vec![1, 2, 3, 4]), vec![2, 3]);
        assert_eq!(Page::all().apply(vec![1, 2]), vec![1, 2]);
    }
}
