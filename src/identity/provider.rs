use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::Session;
use super::password::credential_matches;
use super::session::SessionManager;
use crate::error::{AppError, AppResult};
use crate::store::EntityStore;

pub const WRONG_ACCOUNT_CREDENTIALS: &str = "wrong account name or password";
pub const WRONG_USER_CREDENTIALS: &str = "wrong username or password";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum LoginRequest {
    Account {
        account_name: String,
        password: String,
    },
    /// The account is named by uuid, or by name when the uuid is absent.
    User {
        #[serde(default)]
        account_uuid: Option<String>,
        #[serde(default)]
        account_name: Option<String>,
        user_name: String,
        password: String,
    },
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> AppResult<Session>;
}

/// Verifies credentials against the entity store and opens a session on success.
pub struct LocalAuthProvider {
    store: Arc<dyn EntityStore>,
    sessions: Arc<SessionManager>,
}

impl LocalAuthProvider {
    pub fn new(store: Arc<dyn EntityStore>, sessions: Arc<SessionManager>) -> Self { Self { store, sessions } }

    fn login_account(&self, account_name: &str, password: &str) -> AppResult<Session> {
        let account = self.store.find_account_by_name(account_name)?;
        let Some(account) = account.filter(|a| credential_matches(&a.password_hash, password)) else {
            debug!(target: "cloud_iam::auth", "login rejected for account name '{}'", account_name);
            return Err(AppError::authentication(WRONG_ACCOUNT_CREDENTIALS));
        };
        self.sessions.create_session(&account.uuid, None)
    }

    fn login_user(&self, account_uuid: Option<&str>, account_name: Option<&str>, user_name: &str, password: &str) -> AppResult<Session> {
        let account_uuid = match (account_uuid, account_name) {
            (Some(uuid), _) => Some(uuid.to_string()),
            (None, Some(name)) => self.store.find_account_by_name(name)?.map(|a| a.uuid),
            (None, None) => {
                return Err(AppError::invalid_argument("accountUuid and accountName cannot both be null"));
            }
        };
        let user = match account_uuid {
            Some(acc) => self.store.find_user_by_name(&acc, user_name)?,
            None => None,
        };
        let Some(user) = user.filter(|u| credential_matches(&u.password_hash, password)) else {
            debug!(target: "cloud_iam::auth", "login rejected for user name '{}'", user_name);
            return Err(AppError::authentication(WRONG_USER_CREDENTIALS));
        };
        self.sessions.create_session(&user.account_uuid, Some(&user.uuid))
    }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> AppResult<Session> {
        match req {
            LoginRequest::Account { account_name, password } => self.login_account(account_name, password),
            LoginRequest::User { account_uuid, account_name, user_name, password } => {
                self.login_user(account_uuid.as_deref(), account_name.as_deref(), user_name, password)
            }
        }
    }
}
