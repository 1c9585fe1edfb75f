//! Resource ownership and cross-account sharing.
//!
//! Every tracked resource has exactly one owner account, recorded when the
//! resource-type plugin creates it. Sharing relaxes visibility for plain
//! references but never for operation targets, and never moves ownership.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::identity::model::{AccountType, ResourceOwnership, SharedResource};
use crate::store::EntityStore;

/// What a caller may see of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "uuids", rename_all = "snake_case")]
pub enum Visibility {
    /// System administrators; no filter applies.
    Unrestricted,
    Restricted(BTreeSet<String>),
    /// A normal account that owns nothing of the type and has nothing shared to it.
    None,
}

impl Visibility {
    pub fn allows(&self, resource_uuid: &str) -> bool {
        match self {
            Visibility::Unrestricted => true,
            Visibility::Restricted(set) => set.contains(resource_uuid),
            Visibility::None => false,
        }
    }
}

/// Resource uuids carried by one ownership-checked field of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub field: String,
    pub uuids: Vec<String>,
    pub operation_target: bool,
}

impl ResourceRef {
    pub fn plain(field: impl Into<String>, uuids: Vec<String>) -> Self {
        ResourceRef { field: field.into(), uuids, operation_target: false }
    }

    pub fn target(field: impl Into<String>, uuids: Vec<String>) -> Self {
        ResourceRef { field: field.into(), uuids, operation_target: true }
    }
}

pub struct OwnershipResolver {
    store: Arc<dyn EntityStore>,
    tracked: HashSet<String>,
}

impl OwnershipResolver {
    pub fn new(store: Arc<dyn EntityStore>, tracked_types: &[String]) -> Self {
        Self { store, tracked: tracked_types.iter().cloned().collect() }
    }

    pub fn is_ownership_tracked(&self, resource_type: &str) -> bool { self.tracked.contains(resource_type) }

    pub fn register_ownership(&self, account_uuid: &str, resource_uuid: &str, resource_type: &str) -> AppResult<()> {
        if !self.is_ownership_tracked(resource_type) {
            return Err(AppError::internal(format!(
                "resource type[{}] is not tracked for account ownership, cannot register resource[uuid: {}]",
                resource_type, resource_uuid
            )));
        }
        self.store.insert_ownership(ResourceOwnership {
            account_uuid: account_uuid.to_string(),
            resource_uuid: resource_uuid.to_string(),
            resource_type: resource_type.to_string(),
        })?;
        debug!(
            target: "cloud_iam::ownership",
            "resource[uuid: {}, type: {}] is owned by account[uuid: {}]", resource_uuid, resource_type, account_uuid
        );
        Ok(())
    }

    pub fn owner_of(&self, resource_uuid: &str) -> AppResult<String> {
        let found = self.store.ownerships_of(&[resource_uuid.to_string()])?;
        match found.into_iter().next() {
            Some(o) => Ok(o.account_uuid),
            None => Err(AppError::not_found(format!("unable to find the owner account of resource[uuid: {}]", resource_uuid))),
        }
    }

    pub fn visible_resources(&self, account_uuid: &str, resource_type: &str) -> AppResult<Visibility> {
        let Some(account_type) = self.store.account_type(account_uuid)? else {
            return Err(AppError::invalid_argument(format!("unable to find account[uuid: {}]", account_uuid)));
        };
        if account_type == AccountType::SystemAdmin {
            return Ok(Visibility::Unrestricted);
        }
        let mut visible: BTreeSet<String> = self.store.owned_resource_uuids(account_uuid, resource_type)?.into_iter().collect();
        visible.extend(self.store.shared_resource_uuids(account_uuid, resource_type)?);
        if visible.is_empty() {
            Ok(Visibility::None)
        } else {
            Ok(Visibility::Restricted(visible))
        }
    }

    /// Fails on the first reference owned by a different account.
    ///
    /// Plain references are satisfied by a public share or a share to `account_uuid`;
    /// operation targets need direct ownership. References without an ownership
    /// record are left for the handler to validate.
    pub fn check_field_ownership(&self, account_uuid: &str, refs: &[ResourceRef]) -> AppResult<()> {
        let mut plain: Vec<String> = Vec::new();
        let mut targets: Vec<String> = Vec::new();
        for r in refs.iter() {
            let bucket = if r.operation_target { &mut targets } else { &mut plain };
            for u in r.uuids.iter() {
                if !bucket.contains(u) {
                    bucket.push(u.clone());
                }
            }
        }

        if !plain.is_empty() {
            let shared: HashSet<String> = self
                .store
                .shares_of(&plain)?
                .into_iter()
                .filter(|s| s.visible_to(account_uuid))
                .map(|s| s.resource_uuid)
                .collect();
            plain.retain(|u| !shared.contains(u));
        }

        let mut unresolved = targets;
        for u in plain.into_iter() {
            if !unresolved.contains(&u) {
                unresolved.push(u);
            }
        }
        if unresolved.is_empty() {
            return Ok(());
        }

        for o in self.store.ownerships_of(&unresolved)?.iter() {
            if o.account_uuid != account_uuid {
                return Err(AppError::permission_denied(format!(
                    "operation denied. The resource[uuid: {}, type: {}] doesn't belong to the account[uuid: {}]",
                    o.resource_uuid, o.resource_type, account_uuid
                )));
            }
        }
        Ok(())
    }

    /// Shares owned resources publicly or with the listed accounts. Returns the number of
    /// new share records; sharing something already shared writes nothing.
    pub fn share(&self, resource_uuids: &[String], to_public: bool, receivers: &[String]) -> AppResult<usize> {
        let owned = self.owned_records(resource_uuids)?;
        let mut shares = Vec::new();
        for o in owned.iter() {
            if to_public {
                shares.push(SharedResource {
                    owner_account_uuid: o.account_uuid.clone(),
                    resource_uuid: o.resource_uuid.clone(),
                    resource_type: o.resource_type.clone(),
                    receiver_account_uuid: None,
                    to_public: true,
                });
            } else {
                for r in receivers.iter() {
                    shares.push(SharedResource {
                        owner_account_uuid: o.account_uuid.clone(),
                        resource_uuid: o.resource_uuid.clone(),
                        resource_type: o.resource_type.clone(),
                        receiver_account_uuid: Some(r.clone()),
                        to_public: false,
                    });
                }
            }
        }
        let n = self.store.insert_shares(shares)?;
        info!(target: "cloud_iam::ownership", "shared {} resources, to_public={}, receivers={:?}", owned.len(), to_public, receivers);
        Ok(n)
    }

    /// `all` drops every share of the resources; otherwise the listed receivers lose
    /// their direct shares and, with `to_public`, the public share goes too.
    pub fn revoke(&self, resource_uuids: &[String], to_public: bool, all: bool, receivers: &[String]) -> AppResult<usize> {
        if all {
            return Ok(self.store.delete_shares(resource_uuids, None)?);
        }
        let mut removed = self.store.delete_shares(resource_uuids, Some(receivers))?;
        if to_public {
            removed += self.store.delete_public_shares(resource_uuids)?;
        }
        Ok(removed)
    }

    /// Removes ownership and sharing records of deleted resources.
    pub fn on_resources_deleted(&self, resource_type: &str, resource_uuids: &[String]) -> AppResult<()> {
        if resource_uuids.is_empty() || !self.is_ownership_tracked(resource_type) {
            return Ok(());
        }
        let owners = self.store.delete_ownerships(resource_type, resource_uuids)?;
        let shares = self.store.delete_shares(resource_uuids, None)?;
        debug!(
            target: "cloud_iam::ownership",
            "deleted {} ownership and {} sharing records of {} resources", owners, shares, resource_type
        );
        Ok(())
    }

    /// Drops every share the account gave or received and hands its resources to `heir`.
    /// Ownership rows are moved rather than deleted, since a resource without an
    /// ownership record passes the ownership check for any account.
    pub fn on_account_deleted(&self, account_uuid: &str, heir_account_uuid: &str) -> AppResult<(usize, usize)> {
        let shares = self.store.delete_shares_of_account(account_uuid)?;
        let moved = self.store.transfer_ownerships(account_uuid, heir_account_uuid)?;
        info!(
            target: "cloud_iam::ownership",
            "account[uuid: {}] gone: dropped {} sharing records, {} resources now owned by account[uuid: {}]",
            account_uuid, shares, moved, heir_account_uuid
        );
        Ok((shares, moved))
    }

    fn owned_records(&self, resource_uuids: &[String]) -> AppResult<Vec<ResourceOwnership>> {
        let owned = self.store.ownerships_of(resource_uuids)?;
        if let Some(missing) = resource_uuids.iter().find(|u| !owned.iter().any(|o| &o.resource_uuid == *u)) {
            return Err(AppError::not_found(format!("unable to find the owner account of resource[uuid: {}]", missing)));
        }
        Ok(owned)
    }
}

#[cfg(test)]
#[path = "ownership_tests.rs"]
mod tests;
