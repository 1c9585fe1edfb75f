//! Identity service facade.
//!
//! `AccountManager::start` wires every component, makes sure the initial system
//! administrator exists, builds the action catalog, collects default quotas and
//! starts the session sweeper. `process` runs one inbound message through the
//! authenticator and, for identity operations, the matching handler.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiBody, ApiMessage, ApiReply, IDENTITY_OPERATION_TYPES};
use crate::auth::Authenticator;
use crate::catalog::{ActionCatalog, ActionDeclaration, IDENTITY_CATEGORY, identity_declarations};
use crate::config::IdentityConfig;
use crate::error::{AppError, AppResult};
use crate::identity::model::{Account, AccountType, Policy, Session, Statement, User, UserGroup};
use crate::identity::password::hash_credential;
use crate::identity::{AuthProvider, LocalAuthProvider, LoginRequest, SessionManager, SessionSweeper, new_uuid};
use crate::ownership::OwnershipResolver;
use crate::policy::PolicyEngine;
use crate::quota::{QuotaRegistry, ReportQuota};
use crate::store::{EntityStore, Page};

/// What resource-type plugins contribute at startup.
#[derive(Default)]
pub struct PluginSet {
    /// Every plugin operation type, declared or not.
    pub operation_types: Vec<String>,
    pub declarations: Vec<ActionDeclaration>,
    pub quota_reporters: Vec<Arc<dyn ReportQuota>>,
}

pub struct AccountManager {
    cfg: IdentityConfig,
    store: Arc<dyn EntityStore>,
    sessions: Arc<SessionManager>,
    policies: Arc<PolicyEngine>,
    ownership: Arc<OwnershipResolver>,
    catalog: Arc<ActionCatalog>,
    quotas: QuotaRegistry,
    login: LocalAuthProvider,
    auth: Authenticator,
    sweeper: Mutex<Option<SessionSweeper>>,
}

impl AccountManager {
    /// The sweeper needs a tokio runtime; without one the manager still works but
    /// expired sessions are only removed when validated.
    pub fn start(store: Arc<dyn EntityStore>, cfg: IdentityConfig, plugins: PluginSet) -> AppResult<Self> {
        cfg.validate()?;

        let sessions = Arc::new(SessionManager::new(store.clone(), &cfg));
        let policies = Arc::new(PolicyEngine::new());
        let ownership = Arc::new(OwnershipResolver::new(store.clone(), &cfg.tracked_resource_types));

        ensure_initial_admin(store.as_ref(), &cfg)?;

        let mut operation_types: Vec<String> = IDENTITY_OPERATION_TYPES.iter().map(|s| s.to_string()).collect();
        operation_types.extend(plugins.operation_types);
        let mut declarations = identity_declarations();
        declarations.extend(plugins.declarations);
        let catalog = Arc::new(ActionCatalog::build(operation_types, declarations)?);

        let quotas = QuotaRegistry::collect(store.clone(), &plugins.quota_reporters)?;

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(SessionSweeper::spawn(sessions.clone(), StdDuration::from_secs(cfg.session_cleanup_interval_secs))),
            Err(_) => {
                warn!(target: "cloud_iam::session", "no tokio runtime, expired session sweeper not started");
                None
            }
        };

        let login = LocalAuthProvider::new(store.clone(), sessions.clone());
        let auth = Authenticator::new(store.clone(), sessions.clone(), policies.clone(), ownership.clone(), catalog.clone());
        info!(target: "cloud_iam::auth", "account manager started, {} operations catalogued", catalog.len());

        Ok(AccountManager {
            cfg,
            store,
            sessions,
            policies,
            ownership,
            catalog,
            quotas,
            login,
            auth,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Stops the sweeper. Idempotent.
    pub fn stop(&self) {
        if let Some(s) = self.sweeper.lock().take() {
            s.stop();
        }
    }

    pub fn is_sweeping(&self) -> bool { self.sweeper.lock().as_ref().map(|s| s.is_running()).unwrap_or(false) }

    pub fn config(&self) -> &IdentityConfig { &self.cfg }
    pub fn sessions(&self) -> &Arc<SessionManager> { &self.sessions }
    pub fn ownership(&self) -> &Arc<OwnershipResolver> { &self.ownership }
    pub fn catalog(&self) -> &Arc<ActionCatalog> { &self.catalog }
    pub fn quotas(&self) -> &QuotaRegistry { &self.quotas }

    /// Authenticate and authorize in place. On success `msg.session` is set for every
    /// operation that needs one.
    pub fn intercept(&self, msg: &mut ApiMessage) -> AppResult<()> { self.auth.intercept(msg) }

    /// Intercept, then handle. Failures come back as `ApiReply::Error`.
    pub fn process(&self, mut msg: ApiMessage) -> ApiReply {
        let out = self.intercept(&mut msg).and_then(|_| self.handle(&msg));
        match out {
            Ok(reply) => reply,
            Err(e) => {
                debug!(target: "cloud_iam::auth", "API[{}, id: {}] rejected: {}", msg.message_type(), msg.id, e);
                ApiReply::Error(e.to_reply())
            }
        }
    }

    /// Handles an intercepted message. Plugin operations return `ApiReply::Forward`.
    pub fn handle(&self, msg: &ApiMessage) -> AppResult<ApiReply> {
        match &msg.body {
            ApiBody::LogInByAccount { account_name, password } => {
                let req = LoginRequest::Account { account_name: account_name.clone(), password: password.clone() };
                Ok(ApiReply::Session(self.login.login(&req)?))
            }
            ApiBody::LogInByUser { account_uuid, account_name, user_name, password } => {
                let req = LoginRequest::User {
                    account_uuid: account_uuid.clone(),
                    account_name: account_name.clone(),
                    user_name: user_name.clone(),
                    password: password.clone(),
                };
                Ok(ApiReply::Session(self.login.login(&req)?))
            }
            ApiBody::LogOut { session_uuid } => {
                self.sessions.logout(session_uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::ValidateSession { session_uuid } => Ok(ApiReply::SessionValid(self.sessions.is_known(session_uuid)?)),
            ApiBody::CreateAccount { name, password, description, account_type, resource_uuid } => {
                let account = self.create_account(
                    name,
                    password,
                    description.clone(),
                    account_type.unwrap_or(AccountType::Normal),
                    resource_uuid.clone(),
                )?;
                Ok(ApiReply::Account(account))
            }
            ApiBody::UpdateAccount { uuid, name, password, description } => {
                let session = acting(msg)?;
                let target = uuid.as_deref().unwrap_or(&session.account_uuid);
                let Some(mut account) = self.store.find_account(target)? else {
                    return Err(AppError::not_found(format!("unable to find account[uuid: {}]", target)));
                };
                if let Some(n) = name {
                    account.name = n.clone();
                }
                if let Some(d) = description {
                    account.description = Some(d.clone());
                }
                if let Some(p) = password {
                    account.password_hash = hash_credential(p)?;
                }
                self.store.update_account(account.clone())?;
                Ok(ApiReply::Account(account))
            }
            ApiBody::DeleteAccount { uuid } => {
                self.delete_account(uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::ListAccount { page } => Ok(ApiReply::Accounts(self.store.list_accounts(*page)?)),
            ApiBody::CreateUser { name, password, description } => {
                let session = acting(msg)?;
                let user = User {
                    uuid: new_uuid(),
                    account_uuid: session.account_uuid.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    password_hash: hash_credential(password)?,
                    created_at: self.store.now()?,
                };
                self.store.insert_user(user.clone())?;
                Ok(ApiReply::User(user))
            }
            ApiBody::UpdateUser { uuid, password, description } => {
                let Some(target) = uuid.as_deref() else {
                    return Err(AppError::invalid_argument("the field 'uuid' of the user to update is missing"));
                };
                let Some(mut user) = self.store.find_user(target)? else {
                    return Err(AppError::not_found(format!("unable to find user[uuid: {}]", target)));
                };
                if let Some(p) = password {
                    user.password_hash = hash_credential(p)?;
                }
                if let Some(d) = description {
                    user.description = Some(d.clone());
                }
                self.store.update_user(user.clone())?;
                Ok(ApiReply::User(user))
            }
            ApiBody::ListUser { page } => {
                let session = acting(msg)?;
                Ok(ApiReply::Users(self.store.list_users(&session.account_uuid, *page)?))
            }
            ApiBody::CreateUserGroup { name, description } => {
                let session = acting(msg)?;
                let group = UserGroup {
                    uuid: new_uuid(),
                    account_uuid: session.account_uuid.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    created_at: self.store.now()?,
                };
                self.store.insert_group(group.clone())?;
                Ok(ApiReply::Group(group))
            }
            ApiBody::AddUserToGroup { user_uuid, group_uuid } => {
                self.store.add_user_to_group(group_uuid, user_uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::CreatePolicy { name, statements } => {
                let session = acting(msg)?;
                let policy = Policy {
                    uuid: new_uuid(),
                    account_uuid: session.account_uuid.clone(),
                    name: name.clone(),
                    statements: statements.clone(),
                };
                self.policies
                    .register(&policy)
                    .map_err(|e| AppError::invalid_argument(format!("invalid policy[name: {}]: {}", name, e)))?;
                if let Err(e) = self.store.insert_policies(vec![policy.clone()]) {
                    self.policies.evict(&policy.uuid);
                    return Err(e.into());
                }
                Ok(ApiReply::Policy(policy))
            }
            ApiBody::DeletePolicy { uuid } => {
                self.store.delete_policy(uuid)?;
                self.policies.evict(uuid);
                Ok(ApiReply::Done)
            }
            ApiBody::ListPolicy { page } => {
                let session = acting(msg)?;
                Ok(ApiReply::Policies(self.store.list_policies(&session.account_uuid, *page)?))
            }
            ApiBody::AttachPolicyToUser { policy_uuid, user_uuid } => {
                self.store.attach_policy_to_user(policy_uuid, user_uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::DetachPolicyFromUser { policy_uuid, user_uuid } => {
                self.store.detach_policy_from_user(policy_uuid, user_uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::AttachPolicyToUserGroup { policy_uuid, group_uuid } => {
                self.store.attach_policy_to_group(policy_uuid, group_uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::DetachPolicyFromUserGroup { policy_uuid, group_uuid } => {
                self.store.detach_policy_from_group(policy_uuid, group_uuid)?;
                Ok(ApiReply::Done)
            }
            ApiBody::ShareResource { resource_uuids, account_uuids, to_public } => {
                Ok(ApiReply::Shares(self.ownership.share(resource_uuids, *to_public, account_uuids)?))
            }
            ApiBody::RevokeResourceSharing { resource_uuids, account_uuids, to_public, all } => {
                Ok(ApiReply::Shares(self.ownership.revoke(resource_uuids, *to_public, *all, account_uuids)?))
            }
            ApiBody::UpdateQuota { account_uuid, name, value } => {
                Ok(ApiReply::Quota(self.quotas.update_quota(account_uuid, name, *value)?))
            }
            ApiBody::Resource(_) => Ok(ApiReply::Forward),
        }
    }

    /// Creates the account with its two default policies and a copy of every configured quota.
    pub fn create_account(
        &self,
        name: &str,
        password: &str,
        description: Option<String>,
        account_type: AccountType,
        uuid: Option<String>,
    ) -> AppResult<Account> {
        let account = Account {
            uuid: uuid.unwrap_or_else(new_uuid),
            name: name.to_string(),
            description,
            password_hash: hash_credential(password)?,
            account_type,
            created_at: self.store.now()?,
        };
        self.store.insert_account(account.clone())?;
        self.store.insert_policies(default_policies(&account.uuid))?;
        let quotas = self.quotas.seed_account(&account.uuid)?;
        info!(
            target: "cloud_iam::auth",
            "created account[uuid: {}, name: {}, type: {:?}] with {} quotas", account.uuid, account.name, account.account_type, quotas
        );
        Ok(account)
    }

    /// Removes the account and everything that hangs off it: sessions, users,
    /// groups, policies, quotas and sharing records. Resources it owned pass to the
    /// initial system administrator.
    pub fn delete_account(&self, uuid: &str) -> AppResult<()> {
        let sessions = self.sessions.logout_account(uuid)?;
        self.ownership.on_account_deleted(uuid, &self.cfg.initial_admin_uuid)?;
        let users = self.store.delete_users_of_account(uuid)?;
        let groups = self.store.delete_groups_of_account(uuid)?;
        let policies = self.store.delete_policies_of_account(uuid)?;
        for p in policies.iter() {
            self.policies.evict(p);
        }
        self.store.delete_account_quotas(uuid)?;
        if !self.store.delete_account(uuid)? {
            return Err(AppError::not_found(format!("unable to find account[uuid: {}]", uuid)));
        }
        info!(
            target: "cloud_iam::auth",
            "deleted account[uuid: {}]: {} sessions, {} users, {} groups, {} policies",
            uuid, sessions, users, groups, policies.len()
        );
        Ok(())
    }

    pub fn list_accounts(&self, page: Page) -> AppResult<Vec<Account>> { Ok(self.store.list_accounts(page)?) }

    pub fn list_users(&self, account_uuid: &str, page: Page) -> AppResult<Vec<User>> { Ok(self.store.list_users(account_uuid, page)?) }

    pub fn list_policies(&self, account_uuid: &str, page: Page) -> AppResult<Vec<Policy>> { Ok(self.store.list_policies(account_uuid, page)?) }
}

impl Drop for AccountManager {
    fn drop(&mut self) { self.stop(); }
}

fn acting(msg: &ApiMessage) -> AppResult<&Session> {
    msg.session
        .as_ref()
        .ok_or_else(|| AppError::invalid_session(format!("message[{}] has not been authenticated", msg.message_type())))
}

fn default_policies(account_uuid: &str) -> Vec<Policy> {
    let reset_action = format!("{}:{}", IDENTITY_CATEGORY, crate::api::msg::UPDATE_USER);
    vec![
        Policy {
            uuid: new_uuid(),
            account_uuid: account_uuid.to_string(),
            name: format!("DEFAULT-READ-{}", account_uuid),
            statements: vec![Statement::allow(format!("read-permission-for-account-{}", account_uuid), &[".*:read"])],
        },
        Policy {
            uuid: new_uuid(),
            account_uuid: account_uuid.to_string(),
            name: format!("USER-RESET-PASSWORD-{}", account_uuid),
            statements: vec![Statement::allow(
                format!("user-reset-password-{}", account_uuid),
                &[reset_action.as_str()],
            )],
        },
    ]
}

fn ensure_initial_admin(store: &dyn EntityStore, cfg: &IdentityConfig) -> AppResult<()> {
    if let Some(existing) = store.find_account_by_name(&cfg.initial_admin_name)? {
        if existing.account_type != AccountType::SystemAdmin {
            return Err(AppError::internal(format!(
                "account[name: {}] exists but is not a system admin account",
                cfg.initial_admin_name
            )));
        }
        return Ok(());
    }
    let admin = Account {
        uuid: cfg.initial_admin_uuid.clone(),
        name: cfg.initial_admin_name.clone(),
        description: Some("initial system admin".to_string()),
        password_hash: hash_credential(&cfg.initial_admin_password)?,
        account_type: AccountType::SystemAdmin,
        created_at: store.now()?,
    };
    store.insert_account(admin)?;
    info!(target: "cloud_iam::auth", "created initial system admin[name: {}, uuid: {}]", cfg.initial_admin_name, cfg.initial_admin_uuid);
    Ok(())
}
