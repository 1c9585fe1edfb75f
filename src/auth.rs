//! Per-request authentication and authorization.
//!
//! Order for every inbound message: exempt operations pass untouched, then the
//! session reference is resolved and attached, then the policy check runs, then
//! operation-specific structural validation. Any failure rejects the message
//! before a handler sees it.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::api::{ApiBody, ApiMessage};
use crate::catalog::{ActionCatalog, ActionDescriptor};
use crate::error::{AppError, AppResult};
use crate::identity::model::{AccountType, Session, StatementEffect};
use crate::ownership::{OwnershipResolver, ResourceRef};
use crate::policy::{ActionPattern, PolicyEngine, TieredDecision};
use crate::identity::SessionManager;
use crate::store::EntityStore;

pub struct Authenticator {
    store: Arc<dyn EntityStore>,
    sessions: Arc<SessionManager>,
    policies: Arc<PolicyEngine>,
    ownership: Arc<OwnershipResolver>,
    catalog: Arc<ActionCatalog>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn EntityStore>,
        sessions: Arc<SessionManager>,
        policies: Arc<PolicyEngine>,
        ownership: Arc<OwnershipResolver>,
        catalog: Arc<ActionCatalog>,
    ) -> Self {
        Self { store, sessions, policies, ownership, catalog }
    }

    pub fn intercept(&self, msg: &mut ApiMessage) -> AppResult<()> {
        if msg.body.is_session_exempt() {
            return Ok(());
        }
        let session = self.session_check(msg)?;
        msg.session = Some(session.clone());
        self.policy_check(&session, &msg.body)?;
        self.validate(&session, &mut msg.body)
    }

    fn session_check(&self, msg: &ApiMessage) -> AppResult<Session> {
        let Some(uuid) = msg.session_uuid.as_deref() else {
            return Err(AppError::invalid_session(format!("session of message[{}] is null", msg.message_type())));
        };
        self.sessions.validate(uuid)
    }

    pub fn policy_check(&self, session: &Session, body: &ApiBody) -> AppResult<()> {
        let api = body.message_type();
        let Some(account_type) = self.store.account_type(&session.account_uuid)? else {
            return Err(AppError::invalid_session(format!("the account[uuid: {}] of the session no longer exists", session.account_uuid)));
        };
        if account_type == AccountType::SystemAdmin {
            return Ok(());
        }

        let Some(action) = self.catalog.get(api) else {
            debug!(target: "cloud_iam::auth", "API[{}] is not in the action catalog, treated as admin only", api);
            return Err(AppError::permission_denied(format!("API[{}] is admin only", api)));
        };
        if action.admin_only {
            return Err(AppError::permission_denied(format!("API[{}] is admin only", api)));
        }
        if action.account_only && !session.is_account_session() {
            return Err(AppError::permission_denied(format!(
                "API[{}] can only be called by an account, the current session is a user session[user uuid:{}]",
                api,
                session.user_uuid.as_deref().unwrap_or_default()
            )));
        }

        let refs = ownership_refs(action, body)?;
        if !refs.is_empty() {
            self.ownership.check_field_ownership(&session.account_uuid, &refs)?;
        }

        let Some(user_uuid) = session.user_uuid.as_deref() else {
            return Ok(());
        };
        let user_name = self.store.find_user(user_uuid)?.map(|u| u.name).unwrap_or_default();
        let user_policies = self.store.user_policies(user_uuid)?;
        let decision = self.policies.evaluate_tiers(&action.actions, &user_policies, || {
            self.store.group_policies(user_uuid).map_err(AppError::from)
        })?;

        match decision {
            Some(d) => use_decision(api, &user_name, session, d),
            None => Err(AppError::permission_denied(format!(
                "user[name: {}, uuid: {}] has no policy set for this operation, API[{}] is denied by default. \
                 You may either create policies for this user or add the user into a group with polices set",
                user_name, user_uuid, api
            ))),
        }
    }

    /// Structural checks of identity operations. May fill in defaults on the body.
    pub fn validate(&self, session: &Session, body: &mut ApiBody) -> AppResult<()> {
        let acting = session.account_uuid.as_str();
        match body {
            ApiBody::CreateAccount { name, .. } => {
                if self.store.account_name_exists(name)? {
                    return Err(AppError::invalid_argument(format!("unable to create an account. An account already called {}", name)));
                }
            }
            ApiBody::UpdateAccount { uuid, name, .. } => {
                let target = uuid.get_or_insert_with(|| acting.to_string()).clone();
                if let Some(n) = name.as_deref() {
                    if self.store.find_account_by_name(n)?.is_some_and(|a| a.uuid != target) {
                        return Err(AppError::invalid_argument(format!("unable to rename the account. An account already called {}", n)));
                    }
                }
                if self.store.account_type(acting)? == Some(AccountType::SystemAdmin) {
                    return Ok(());
                }
                let Some(account) = self.store.find_account(&target)? else {
                    return Err(AppError::not_found(format!("unable to find account[uuid: {}]", target)));
                };
                if account.uuid != acting {
                    return Err(AppError::permission_denied(format!(
                        "account[uuid: {}, name: {}] is a normal account, it cannot reset the password of another account[uuid: {}]",
                        acting, account.name, target
                    )));
                }
            }
            ApiBody::DeleteAccount { uuid } => {
                if self.store.account_type(uuid)? == Some(AccountType::SystemAdmin) {
                    return Err(AppError::invalid_argument("unable to delete an account. The account is an admin account"));
                }
            }
            ApiBody::CreateUser { name, .. } => {
                if self.store.find_user_by_name(acting, name)?.is_some() {
                    return Err(AppError::invalid_argument(format!(
                        "unable to create a user. A user called {} is already under the account[uuid:{}]",
                        name, acting
                    )));
                }
            }
            ApiBody::UpdateUser { uuid, .. } => match session.user_uuid.as_deref() {
                None => {
                    let Some(target) = uuid.as_deref() else {
                        return Err(AppError::invalid_argument(
                            "the current session is an account session. You need to specify the field 'uuid' to the user you want to reset the password",
                        ));
                    };
                    if self.store.account_type(acting)? != Some(AccountType::SystemAdmin) {
                        self.user_of_account(target, acting)?;
                    }
                }
                Some(own) => {
                    if let Some(target) = uuid.as_deref() {
                        if target != own {
                            return Err(AppError::invalid_argument(format!(
                                "cannot change the password, you are not the owner user of user[uuid:{}]",
                                target
                            )));
                        }
                    }
                    *uuid = Some(own.to_string());
                }
            },
            ApiBody::CreateUserGroup { name, .. } => {
                if self.store.group_name_exists(acting, name)? {
                    return Err(AppError::invalid_argument(format!(
                        "unable to create a group. A group called {} is already under the account[uuid:{}]",
                        name, acting
                    )));
                }
            }
            ApiBody::AddUserToGroup { user_uuid, group_uuid } => {
                self.user_of_account(user_uuid, acting)?;
                self.group_of_account(group_uuid, acting)?;
            }
            ApiBody::CreatePolicy { statements, .. } => {
                for s in statements.iter() {
                    if s.actions.is_empty() {
                        return Err(AppError::invalid_argument(format!(
                            "a statement must have a non-empty action field. Invalid statement[{}]",
                            serde_json::to_string(s).unwrap_or_else(|_| s.name.clone())
                        )));
                    }
                    for a in s.actions.iter() {
                        ActionPattern::compile(a).map_err(|e| {
                            AppError::invalid_argument(format!("invalid statement[name: {}]: {}", s.name, e))
                        })?;
                    }
                }
            }
            ApiBody::DeletePolicy { uuid } => {
                if self.store.account_type(acting)? != Some(AccountType::SystemAdmin) {
                    self.policy_of_account(uuid, acting)?;
                }
            }
            ApiBody::AttachPolicyToUser { policy_uuid, user_uuid }
            | ApiBody::DetachPolicyFromUser { policy_uuid, user_uuid } => {
                self.policy_of_account(policy_uuid, acting)?;
                self.user_of_account(user_uuid, acting)?;
            }
            ApiBody::AttachPolicyToUserGroup { policy_uuid, group_uuid }
            | ApiBody::DetachPolicyFromUserGroup { policy_uuid, group_uuid } => {
                self.policy_of_account(policy_uuid, acting)?;
                self.group_of_account(group_uuid, acting)?;
            }
            ApiBody::ShareResource { account_uuids, to_public, .. } => {
                if !*to_public && account_uuids.is_empty() {
                    return Err(AppError::invalid_argument("toPublic is set to false, accountUuids cannot be null or empty"));
                }
            }
            ApiBody::RevokeResourceSharing { account_uuids, all, .. } => {
                if !*all && account_uuids.is_empty() {
                    return Err(AppError::invalid_argument("all is set to false, accountUuids cannot be null or empty"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn policy_of_account(&self, policy_uuid: &str, account_uuid: &str) -> AppResult<()> {
        let Some(p) = self.store.find_policy(policy_uuid)? else {
            return Err(AppError::not_found(format!("unable to find policy[uuid: {}]", policy_uuid)));
        };
        if p.account_uuid != account_uuid {
            return Err(AppError::invalid_argument(format!(
                "policy[name: {}, uuid: {}] doesn't belong to the account[uuid: {}]",
                p.name, p.uuid, account_uuid
            )));
        }
        Ok(())
    }

    fn user_of_account(&self, user_uuid: &str, account_uuid: &str) -> AppResult<()> {
        let Some(u) = self.store.find_user(user_uuid)? else {
            return Err(AppError::not_found(format!("unable to find user[uuid: {}]", user_uuid)));
        };
        if u.account_uuid != account_uuid {
            return Err(AppError::invalid_argument(format!(
                "user[name: {}, uuid: {}] doesn't belong to the account[uuid: {}]",
                u.name, u.uuid, account_uuid
            )));
        }
        Ok(())
    }

    fn group_of_account(&self, group_uuid: &str, account_uuid: &str) -> AppResult<()> {
        let Some(g) = self.store.find_group(group_uuid)? else {
            return Err(AppError::not_found(format!("unable to find group[uuid: {}]", group_uuid)));
        };
        if g.account_uuid != account_uuid {
            return Err(AppError::invalid_argument(format!(
                "group[name: {}, uuid: {}] doesn't belong to the account[uuid: {}]",
                g.name, g.uuid, account_uuid
            )));
        }
        Ok(())
    }
}

fn ownership_refs(action: &ActionDescriptor, body: &ApiBody) -> AppResult<Vec<ResourceRef>> {
    let mut refs = Vec::new();
    for f in action.ownership_fields.iter() {
        let uuids = body.field_values(&f.name).unwrap_or_default();
        if uuids.is_empty() {
            if f.required {
                return Err(AppError::invalid_argument(format!(
                    "missing mandatory field[{}] of API[{}]",
                    f.name,
                    body.message_type()
                )));
            }
            continue;
        }
        trace!(target: "cloud_iam::auth", "account check on field[{}] of API[{}]: {:?}", f.name, body.message_type(), uuids);
        refs.push(ResourceRef { field: f.name.clone(), uuids, operation_target: f.operation_target });
    }
    Ok(refs)
}

fn use_decision(api: &str, user_name: &str, session: &Session, d: TieredDecision) -> AppResult<()> {
    let TieredDecision { tier, decision } = d;
    match decision.effect {
        StatementEffect::Allow => {
            debug!(
                target: "cloud_iam::auth",
                "API[name: {}, action: {}] is approved by a {}[name: {}, uuid: {}], statement[name: {}, action: {}]",
                api, decision.action, tier, decision.policy_name, decision.policy_uuid, decision.statement_name, decision.pattern
            );
            Ok(())
        }
        StatementEffect::Deny => {
            debug!(
                target: "cloud_iam::auth",
                "API[name: {}, action: {}] is denied by a {}[name: {}, uuid: {}], statement[name: {}, action: {}]",
                api, decision.action, tier, decision.policy_name, decision.policy_uuid, decision.statement_name, decision.pattern
            );
            Err(AppError::permission_denied(format!(
                "{} denied. user[name: {}, uuid: {}] is denied to execute API[{}]",
                tier,
                user_name,
                session.user_uuid.as_deref().unwrap_or_default(),
                api
            )))
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
