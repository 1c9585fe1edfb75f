//! Per-account quota ceilings.
//!
//! Resource-type plugins report their default ceilings at startup. The defaults
//! become account-independent configuration rows (only for names not configured
//! yet), and each new account gets its own copy of the configured values.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::identity::model::{AccountQuota, QuotaConfig};
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPair {
    /// Resource type name, e.g. `vm.num`.
    pub name: String,
    pub value: i64,
}

impl QuotaPair {
    pub fn new(name: impl Into<String>, value: i64) -> Self { QuotaPair { name: name.into(), value } }
}

/// Default ceilings plus the operation that must be quota-checked against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub pairs: Vec<QuotaPair>,
    pub message_type: String,
}

/// Implemented by resource-type plugins.
pub trait ReportQuota: Send + Sync {
    /// Reporter name used in startup diagnostics.
    fn name(&self) -> &str;
    fn report_quota(&self) -> Vec<Quota>;
}

pub struct QuotaRegistry {
    store: Arc<dyn EntityStore>,
    by_message: HashMap<String, Quota>,
}

impl QuotaRegistry {
    /// Gathers every reporter's defaults and writes the missing configuration rows.
    /// A resource type reported twice aborts before anything is written.
    pub fn collect(store: Arc<dyn EntityStore>, reporters: &[Arc<dyn ReportQuota>]) -> AppResult<Self> {
        let mut defaults: BTreeMap<String, i64> = BTreeMap::new();
        let mut by_message: HashMap<String, Quota> = HashMap::new();

        for reporter in reporters.iter() {
            for quota in reporter.report_quota().into_iter() {
                for p in quota.pairs.iter() {
                    if defaults.contains_key(&p.name) {
                        return Err(AppError::internal(format!(
                            "duplicate DefaultQuota[resourceType: {}] reported by {}",
                            p.name,
                            reporter.name()
                        )));
                    }
                    defaults.insert(p.name.clone(), p.value);
                }
                by_message.insert(quota.message_type.clone(), quota);
            }
        }

        let existing = store.quota_config_names()?;
        let fresh: Vec<QuotaConfig> = defaults
            .into_iter()
            .filter(|(name, _)| !existing.contains(name))
            .map(|(name, value)| {
                debug!(target: "cloud_iam::quota", "create default quota[name: {}, value: {}] config", name, value);
                QuotaConfig { description: Some(format!("default quota for {}", name)), name, value, default_value: value }
            })
            .collect();
        if !fresh.is_empty() {
            info!(target: "cloud_iam::quota", "registered {} default quota configs", fresh.len());
            store.insert_quota_configs(fresh)?;
        }

        Ok(QuotaRegistry { store, by_message })
    }

    pub fn quota_for_message(&self, message_type: &str) -> Option<&Quota> { self.by_message.get(message_type) }

    /// One row per configured quota name, copied from the current configuration.
    pub fn seed_account(&self, account_uuid: &str) -> AppResult<usize> {
        let rows: Vec<AccountQuota> = self
            .store
            .quota_configs()?
            .into_iter()
            .map(|c| AccountQuota { account_uuid: account_uuid.to_string(), name: c.name, value: c.value })
            .collect();
        let n = rows.len();
        self.store.insert_account_quotas(rows)?;
        Ok(n)
    }

    pub fn account_quota(&self, account_uuid: &str, name: &str) -> AppResult<i64> {
        match self.store.find_account_quota(account_uuid, name)? {
            Some(q) => Ok(q.value),
            None => Err(AppError::not_found(format!("unable to find quota[name: {}] of account[uuid: {}]", name, account_uuid))),
        }
    }

    pub fn update_quota(&self, account_uuid: &str, name: &str, value: i64) -> AppResult<AccountQuota> {
        if value < 0 {
            return Err(AppError::invalid_argument(format!("quota[name: {}] cannot be negative: {}", name, value)));
        }
        let quota = AccountQuota { account_uuid: account_uuid.to_string(), name: name.to_string(), value };
        if !self.store.update_account_quota(quota.clone())? {
            return Err(AppError::not_found(format!("unable to find quota[name: {}] of account[uuid: {}]", name, account_uuid)));
        }
        info!(target: "cloud_iam::quota", "quota[name: {}] of account[uuid: {}] set to {}", name, account_uuid, value);
        Ok(quota)
    }

    /// Admission helper for handlers: `used + requested` must stay within the account's ceiling.
    pub fn ensure_within(&self, account_uuid: &str, name: &str, used: i64, requested: i64) -> AppResult<()> {
        let limit = self.account_quota(account_uuid, name)?;
        if used.saturating_add(requested) > limit {
            return Err(AppError::quota_exceeded(format!(
                "quota exceeded. The account[uuid: {}] exceeds a quota[name: {}, value: {}], used: {}, requested: {}",
                account_uuid, name, limit, used, requested
            )));
        }
        Ok(())
    }

    /// `name        value` lines of every reported default, sorted by name.
    pub fn describe_defaults(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .by_message
            .values()
            .flat_map(|q| q.pairs.iter().map(|p| format!("{}        {}", p.name, p.value)))
            .collect();
        lines.sort();
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;

    struct Reporter {
        name: &'static str,
        quotas: Vec<Quota>,
    }

    impl ReportQuota for Reporter {
        fn name(&self) -> &str { self.name }
        fn report_quota(&self) -> Vec<Quota> { self.quotas.clone() }
    }

    fn reporter(name: &'static str, message_type: &str, pairs: &[(&str, i64)]) -> Arc<dyn ReportQuota> {
        Arc::new(Reporter {
            name,
            quotas: vec![Quota {
                pairs: pairs.iter().map(|(n, v)| QuotaPair::new(*n, *v)).collect(),
                message_type: message_type.into(),
            }],
        })
    }

    #[test]
    fn collect_inserts_defaults_and_maps_messages() {
        let store = Arc::new(MemoryStore::new());
        let reg = QuotaRegistry::collect(
            store.clone(),
            &[reporter("vm", "APICreateVmInstanceMsg", &[("vm.num", 20), ("vm.cpuNum", 80)]), reporter("eip", "APICreateEipMsg", &[("eip.num", 20)])],
        )
        .unwrap();
        let mut names = store.quota_config_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["eip.num", "vm.cpuNum", "vm.num"]);
        assert_eq!(reg.quota_for_message("APICreateEipMsg").unwrap().pairs[0].name, "eip.num");
        assert!(reg.quota_for_message("APIDeleteEipMsg").is_none());
        let cfg = store.quota_configs().unwrap().into_iter().find(|c| c.name == "vm.num").unwrap();
        assert_eq!(cfg.description.as_deref(), Some("default quota for vm.num"));
    }

    #[test]
    fn duplicate_default_fails_before_persisting() {
        let store = Arc::new(MemoryStore::new());
        let err = QuotaRegistry::collect(
            store.clone(),
            &[reporter("first", "A", &[("x.num", 1)]), reporter("second", "B", &[("x.num", 2)])],
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.message(), "duplicate DefaultQuota[resourceType: x.num] reported by second");
        assert!(store.quota_config_names().unwrap().is_empty());
    }

    #[test]
    fn rerun_keeps_configured_values() {
        let store = Arc::new(MemoryStore::new());
        let reporters = [reporter("vm", "A", &[("vm.num", 20)])];
        QuotaRegistry::collect(store.clone(), &reporters).unwrap();
        QuotaRegistry::collect(store.clone(), &reporters).unwrap();
        assert_eq!(store.quota_configs().unwrap().len(), 1);
    }

    #[test]
    fn seed_update_and_enforce() {
        let store = Arc::new(MemoryStore::new());
        let reg = QuotaRegistry::collect(store.clone(), &[reporter("vm", "A", &[("vm.num", 2), ("volume.num", 4)])]).unwrap();
        assert_eq!(reg.seed_account("acc").unwrap(), 2);
        assert_eq!(reg.account_quota("acc", "vm.num").unwrap(), 2);

        assert!(reg.ensure_within("acc", "vm.num", 1, 1).is_ok());
        assert_eq!(reg.ensure_within("acc", "vm.num", 2, 1).unwrap_err().kind(), ErrorKind::QuotaExceeded);

        reg.update_quota("acc", "vm.num", 10).unwrap();
        assert_eq!(reg.account_quota("acc", "vm.num").unwrap(), 10);
        assert_eq!(reg.update_quota("acc", "nope", 1).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(reg.update_quota("acc", "vm.num", -1).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn describe_lists_defaults() {
        let store = Arc::new(MemoryStore::new());
        let reg = QuotaRegistry::collect(store, &[reporter("vm", "A", &[("vm.num", 20)])]).unwrap();
        assert_eq!(reg.describe_defaults(), vec!["vm.num        20".to_string()]);
    }
}
