//! Inbound operation envelope and replies.
//!
//! Identity operations are variants of the closed `ApiBody` union; operations
//! owned by resource-type plugins travel as `ApiBody::Resource` with their
//! ownership-relevant fields already extracted by the plugin.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorReply;
use crate::identity::model::{Account, AccountQuota, AccountType, Policy, Session, Statement, User, UserGroup};
use crate::identity::new_uuid;
use crate::store::Page;

/// Operation type names, also used as catalog keys and in `category:<type>` identifiers.
pub mod msg {
    pub const LOG_IN_BY_ACCOUNT: &str = "APILogInByAccountMsg";
    pub const LOG_IN_BY_USER: &str = "APILogInByUserMsg";
    pub const LOG_OUT: &str = "APILogOutMsg";
    pub const VALIDATE_SESSION: &str = "APIValidateSessionMsg";
    pub const CREATE_ACCOUNT: &str = "APICreateAccountMsg";
    pub const UPDATE_ACCOUNT: &str = "APIUpdateAccountMsg";
    pub const DELETE_ACCOUNT: &str = "APIDeleteAccountMsg";
    pub const LIST_ACCOUNT: &str = "APIListAccountMsg";
    pub const CREATE_USER: &str = "APICreateUserMsg";
    pub const UPDATE_USER: &str = "APIUpdateUserMsg";
    pub const LIST_USER: &str = "APIListUserMsg";
    pub const CREATE_USER_GROUP: &str = "APICreateUserGroupMsg";
    pub const ADD_USER_TO_GROUP: &str = "APIAddUserToGroupMsg";
    pub const CREATE_POLICY: &str = "APICreatePolicyMsg";
    pub const DELETE_POLICY: &str = "APIDeletePolicyMsg";
    pub const LIST_POLICY: &str = "APIListPolicyMsg";
    pub const ATTACH_POLICY_TO_USER: &str = "APIAttachPolicyToUserMsg";
    pub const DETACH_POLICY_FROM_USER: &str = "APIDetachPolicyFromUserMsg";
    pub const ATTACH_POLICY_TO_USER_GROUP: &str = "APIAttachPolicyToUserGroupMsg";
    pub const DETACH_POLICY_FROM_USER_GROUP: &str = "APIDetachPolicyFromUserGroupMsg";
    pub const SHARE_RESOURCE: &str = "APIShareResourceMsg";
    pub const REVOKE_RESOURCE_SHARING: &str = "APIRevokeResourceSharingMsg";
    pub const UPDATE_QUOTA: &str = "APIUpdateQuotaMsg";
}

pub const IDENTITY_OPERATION_TYPES: &[&str] = &[
    msg::LOG_IN_BY_ACCOUNT,
    msg::LOG_IN_BY_USER,
    msg::LOG_OUT,
    msg::VALIDATE_SESSION,
    msg::CREATE_ACCOUNT,
    msg::UPDATE_ACCOUNT,
    msg::DELETE_ACCOUNT,
    msg::LIST_ACCOUNT,
    msg::CREATE_USER,
    msg::UPDATE_USER,
    msg::LIST_USER,
    msg::CREATE_USER_GROUP,
    msg::ADD_USER_TO_GROUP,
    msg::CREATE_POLICY,
    msg::DELETE_POLICY,
    msg::LIST_POLICY,
    msg::ATTACH_POLICY_TO_USER,
    msg::DETACH_POLICY_FROM_USER,
    msg::ATTACH_POLICY_TO_USER_GROUP,
    msg::DETACH_POLICY_FROM_USER_GROUP,
    msg::SHARE_RESOURCE,
    msg::REVOKE_RESOURCE_SHARING,
    msg::UPDATE_QUOTA,
];

/// A plugin operation. `fields` maps each field name to the resource uuids it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOperation {
    pub message_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ResourceOperation {
    pub fn new(message_type: impl Into<String>) -> Self {
        ResourceOperation { message_type: message_type.into(), fields: BTreeMap::new() }
    }

    pub fn with_field(mut self, name: impl Into<String>, uuids: &[&str]) -> Self {
        self.fields.insert(name.into(), uuids.iter().map(|u| u.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiBody {
    LogInByAccount {
        account_name: String,
        password: String,
    },
    LogInByUser {
        #[serde(default)]
        account_uuid: Option<String>,
        #[serde(default)]
        account_name: Option<String>,
        user_name: String,
        password: String,
    },
    LogOut {
        session_uuid: String,
    },
    ValidateSession {
        session_uuid: String,
    },
    CreateAccount {
        name: String,
        password: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        account_type: Option<AccountType>,
        #[serde(default)]
        resource_uuid: Option<String>,
    },
    UpdateAccount {
        #[serde(default)]
        uuid: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    DeleteAccount {
        uuid: String,
    },
    ListAccount {
        #[serde(default)]
        page: Page,
    },
    CreateUser {
        name: String,
        password: String,
        #[serde(default)]
        description: Option<String>,
    },
    UpdateUser {
        #[serde(default)]
        uuid: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    ListUser {
        #[serde(default)]
        page: Page,
    },
    CreateUserGroup {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    AddUserToGroup {
        user_uuid: String,
        group_uuid: String,
    },
    CreatePolicy {
        name: String,
        statements: Vec<Statement>,
    },
    DeletePolicy {
        uuid: String,
    },
    ListPolicy {
        #[serde(default)]
        page: Page,
    },
    AttachPolicyToUser {
        policy_uuid: String,
        user_uuid: String,
    },
    DetachPolicyFromUser {
        policy_uuid: String,
        user_uuid: String,
    },
    AttachPolicyToUserGroup {
        policy_uuid: String,
        group_uuid: String,
    },
    DetachPolicyFromUserGroup {
        policy_uuid: String,
        group_uuid: String,
    },
    ShareResource {
        resource_uuids: Vec<String>,
        #[serde(default)]
        account_uuids: Vec<String>,
        #[serde(default)]
        to_public: bool,
    },
    RevokeResourceSharing {
        resource_uuids: Vec<String>,
        #[serde(default)]
        account_uuids: Vec<String>,
        #[serde(default)]
        to_public: bool,
        #[serde(default)]
        all: bool,
    },
    UpdateQuota {
        account_uuid: String,
        name: String,
        value: i64,
    },
    Resource(ResourceOperation),
}

impl ApiBody {
    pub fn message_type(&self) -> &str {
        match self {
            ApiBody::LogInByAccount { .. } => msg::LOG_IN_BY_ACCOUNT,
            ApiBody::LogInByUser { .. } => msg::LOG_IN_BY_USER,
            ApiBody::LogOut { .. } => msg::LOG_OUT,
            ApiBody::ValidateSession { .. } => msg::VALIDATE_SESSION,
            ApiBody::CreateAccount { .. } => msg::CREATE_ACCOUNT,
            ApiBody::UpdateAccount { .. } => msg::UPDATE_ACCOUNT,
            ApiBody::DeleteAccount { .. } => msg::DELETE_ACCOUNT,
            ApiBody::ListAccount { .. } => msg::LIST_ACCOUNT,
            ApiBody::CreateUser { .. } => msg::CREATE_USER,
            ApiBody::UpdateUser { .. } => msg::UPDATE_USER,
            ApiBody::ListUser { .. } => msg::LIST_USER,
            ApiBody::CreateUserGroup { .. } => msg::CREATE_USER_GROUP,
            ApiBody::AddUserToGroup { .. } => msg::ADD_USER_TO_GROUP,
            ApiBody::CreatePolicy { .. } => msg::CREATE_POLICY,
            ApiBody::DeletePolicy { .. } => msg::DELETE_POLICY,
            ApiBody::ListPolicy { .. } => msg::LIST_POLICY,
            ApiBody::AttachPolicyToUser { .. } => msg::ATTACH_POLICY_TO_USER,
            ApiBody::DetachPolicyFromUser { .. } => msg::DETACH_POLICY_FROM_USER,
            ApiBody::AttachPolicyToUserGroup { .. } => msg::ATTACH_POLICY_TO_USER_GROUP,
            ApiBody::DetachPolicyFromUserGroup { .. } => msg::DETACH_POLICY_FROM_USER_GROUP,
            ApiBody::ShareResource { .. } => msg::SHARE_RESOURCE,
            ApiBody::RevokeResourceSharing { .. } => msg::REVOKE_RESOURCE_SHARING,
            ApiBody::UpdateQuota { .. } => msg::UPDATE_QUOTA,
            ApiBody::Resource(op) => op.message_type.as_str(),
        }
    }

    /// Operations that run without a session.
    pub fn is_session_exempt(&self) -> bool {
        matches!(
            self,
            ApiBody::LogInByAccount { .. } | ApiBody::LogInByUser { .. } | ApiBody::LogOut { .. } | ApiBody::ValidateSession { .. }
        )
    }

    /// Uuids carried by a named field; `None` when the operation has no such field.
    pub fn field_values(&self, field: &str) -> Option<Vec<String>> {
        match (self, field) {
            (ApiBody::ShareResource { resource_uuids, .. }, "resourceUuids") => Some(resource_uuids.clone()),
            (ApiBody::RevokeResourceSharing { resource_uuids, .. }, "resourceUuids") => Some(resource_uuids.clone()),
            (ApiBody::Resource(op), name) => op.fields.get(name).cloned(),
            _ => None,
        }
    }
}

/// One inbound request. `session` is filled in by the authenticator once the
/// session reference has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub id: String,
    #[serde(default)]
    pub session_uuid: Option<String>,
    #[serde(skip)]
    pub session: Option<Session>,
    pub body: ApiBody,
}

impl ApiMessage {
    pub fn new(body: ApiBody) -> Self { ApiMessage { id: new_uuid(), session_uuid: None, session: None, body } }

    pub fn with_session(mut self, session_uuid: impl Into<String>) -> Self {
        self.session_uuid = Some(session_uuid.into());
        self
    }

    pub fn message_type(&self) -> &str { self.body.message_type() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum ApiReply {
    Session(Session),
    SessionValid(bool),
    Account(Account),
    Accounts(Vec<Account>),
    User(User),
    Users(Vec<User>),
    Group(UserGroup),
    Policy(Policy),
    Policies(Vec<Policy>),
    Quota(AccountQuota),
    /// Number of sharing records written or removed.
    Shares(usize),
    /// Passed authorization; the operation belongs to another service.
    Forward,
    Done,
    Error(ErrorReply),
}
