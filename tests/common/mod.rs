#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use tracing_subscriber::{fmt, EnvFilter};

use cloud_iam::catalog::{ActionDeclaration, FieldDeclaration};
use cloud_iam::identity::model::{Session, Statement};
use cloud_iam::{AccountManager, ApiBody, ApiMessage, ApiReply, EntityStore, ErrorReply, IdentityConfig, MemoryStore, PluginSet, Quota, QuotaPair, ReportQuota};

pub const START_VM: &str = "APIStartVmInstanceMsg";
pub const DESTROY_VM: &str = "APIDestroyVmInstanceMsg";
pub const CREATE_VM: &str = "APICreateVmInstanceMsg";
pub const ADD_ZONE: &str = "APIAddZoneMsg";

static TRACING: Once = Once::new();

/// RUST_LOG=cloud_iam=debug shows the authorization trail of a failing test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

pub struct VmQuota;

impl ReportQuota for VmQuota {
    fn name(&self) -> &str { "VmQuota" }

    fn report_quota(&self) -> Vec<Quota> {
        vec![Quota { pairs: vec![QuotaPair::new("vm.num", 20), QuotaPair::new("vm.cpuNum", 80)], message_type: CREATE_VM.to_string() }]
    }
}

pub fn compute_plugins() -> PluginSet {
    PluginSet {
        operation_types: vec![START_VM.into(), DESTROY_VM.into(), CREATE_VM.into(), ADD_ZONE.into()],
        declarations: vec![
            ActionDeclaration::new(START_VM, "compute")
                .names(&["start"])
                .field(FieldDeclaration::uuid("uuid").required().target())
                .field(FieldDeclaration::uuid_list("l3NetworkUuids")),
            ActionDeclaration::new(DESTROY_VM, "compute").names(&["DeleteVm"]).field(FieldDeclaration::uuid("uuid").required().target()),
            ActionDeclaration::new(CREATE_VM, "compute").names(&["create"]),
        ],
        quota_reporters: vec![Arc::new(VmQuota)],
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub mgr: AccountManager,
}

impl Fixture {
    pub fn new() -> Self { Self::with_config(IdentityConfig::default()) }

    pub fn with_config(cfg: IdentityConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::with_clock(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()));
        let dyn_store: Arc<dyn EntityStore> = store.clone();
        let mgr = AccountManager::start(dyn_store, cfg, compute_plugins()).expect("manager starts");
        Fixture { store, mgr }
    }

    pub fn send(&self, session: Option<&str>, body: ApiBody) -> ApiReply {
        let mut m = ApiMessage::new(body);
        if let Some(s) = session {
            m = m.with_session(s);
        }
        self.mgr.process(m)
    }

    pub fn ok(&self, session: Option<&str>, body: ApiBody) -> ApiReply {
        match self.send(session, body) {
            ApiReply::Error(e) => panic!("unexpected failure: {:?}", e),
            r => r,
        }
    }

    pub fn err(&self, session: Option<&str>, body: ApiBody) -> ErrorReply {
        match self.send(session, body) {
            ApiReply::Error(e) => e,
            r => panic!("expected a failure, got {:?}", r),
        }
    }

    pub fn login_account(&self, name: &str, password: &str) -> Session {
        let body = ApiBody::LogInByAccount { account_name: name.into(), password: password.into() };
        match self.ok(None, body) {
            ApiReply::Session(s) => s,
            r => panic!("expected a session, got {:?}", r),
        }
    }

    pub fn login_user(&self, account_name: &str, user_name: &str, password: &str) -> Session {
        let body = ApiBody::LogInByUser {
            account_uuid: None,
            account_name: Some(account_name.into()),
            user_name: user_name.into(),
            password: password.into(),
        };
        match self.ok(None, body) {
            ApiReply::Session(s) => s,
            r => panic!("expected a session, got {:?}", r),
        }
    }

    pub fn admin(&self) -> Session { self.login_account("admin", "password") }

    /// Creates a normal account through the API and returns its uuid.
    pub fn create_account(&self, admin_session: &str, name: &str, password: &str) -> String {
        let body = ApiBody::CreateAccount {
            name: name.into(),
            password: password.into(),
            description: None,
            account_type: None,
            resource_uuid: None,
        };
        match self.ok(Some(admin_session), body) {
            ApiReply::Account(a) => a.uuid,
            r => panic!("expected an account, got {:?}", r),
        }
    }

    pub fn create_user(&self, account_session: &str, name: &str, password: &str) -> String {
        let body = ApiBody::CreateUser { name: name.into(), password: password.into(), description: None };
        match self.ok(Some(account_session), body) {
            ApiReply::User(u) => u.uuid,
            r => panic!("expected a user, got {:?}", r),
        }
    }

    pub fn create_group(&self, account_session: &str, name: &str) -> String {
        match self.ok(Some(account_session), ApiBody::CreateUserGroup { name: name.into(), description: None }) {
            ApiReply::Group(g) => g.uuid,
            r => panic!("expected a group, got {:?}", r),
        }
    }

    pub fn create_policy(&self, account_session: &str, name: &str, statements: Vec<Statement>) -> String {
        match self.ok(Some(account_session), ApiBody::CreatePolicy { name: name.into(), statements }) {
            ApiReply::Policy(p) => p.uuid,
            r => panic!("expected a policy, got {:?}", r),
        }
    }
}

pub fn start_vm(uuid: &str) -> ApiBody {
    ApiBody::Resource(cloud_iam::ResourceOperation::new(START_VM).with_field("uuid", &[uuid]))
}

pub fn destroy_vm(uuid: &str) -> ApiBody {
    ApiBody::Resource(cloud_iam::ResourceOperation::new(DESTROY_VM).with_field("uuid", &[uuid]))
}

pub fn list_users() -> ApiBody { ApiBody::ListUser { page: Default::default() } }
