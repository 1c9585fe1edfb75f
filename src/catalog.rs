//! Static per-operation authorization metadata.
//!
//! The catalog is built once at startup from the list of known operation types
//! and an explicit declaration table. Operation types without a declaration are
//! administrator-only.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::api::msg;
use crate::error::{AppError, AppResult};

pub const IDENTITY_CATEGORY: &str = "identity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Uuid,
    UuidList,
    /// Anything else; refused when marked for ownership checking.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub operation_target: bool,
}

impl FieldDeclaration {
    pub fn uuid(name: impl Into<String>) -> Self {
        FieldDeclaration { name: name.into(), kind: FieldKind::Uuid, required: false, operation_target: false }
    }

    pub fn uuid_list(name: impl Into<String>) -> Self {
        FieldDeclaration { name: name.into(), kind: FieldKind::UuidList, required: false, operation_target: false }
    }

    pub fn required(mut self) -> Self { self.required = true; self }

    pub fn target(mut self) -> Self { self.operation_target = true; self }
}

/// What an operation type declares about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDeclaration {
    pub message_type: String,
    pub category: String,
    pub names: Vec<String>,
    pub admin_only: bool,
    pub account_only: bool,
    pub fields: Vec<FieldDeclaration>,
}

impl ActionDeclaration {
    pub fn new(message_type: impl Into<String>, category: impl Into<String>) -> Self {
        ActionDeclaration {
            message_type: message_type.into(),
            category: category.into(),
            names: Vec::new(),
            admin_only: false,
            account_only: false,
            fields: Vec::new(),
        }
    }

    pub fn names(mut self, names: &[&str]) -> Self {
        self.names.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn admin_only(mut self) -> Self { self.admin_only = true; self }

    pub fn account_only(mut self) -> Self { self.account_only = true; self }

    pub fn field(mut self, f: FieldDeclaration) -> Self { self.fields.push(f); self }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnershipField {
    pub name: String,
    pub required: bool,
    pub operation_target: bool,
}

/// Resolved metadata of one operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDescriptor {
    pub message_type: String,
    /// Empty for undeclared operations.
    pub category: String,
    /// `category:name` per declared name, then `category:<message type>`.
    pub actions: Vec<String>,
    pub admin_only: bool,
    pub account_only: bool,
    pub ownership_fields: Vec<OwnershipField>,
}

impl ActionDescriptor {
    fn undeclared(message_type: &str) -> Self {
        ActionDescriptor {
            message_type: message_type.to_string(),
            category: String::new(),
            actions: Vec::new(),
            admin_only: true,
            account_only: true,
            ownership_fields: Vec::new(),
        }
    }

    fn from_declaration(d: ActionDeclaration) -> AppResult<Self> {
        let mut ownership_fields = Vec::with_capacity(d.fields.len());
        for f in d.fields.into_iter() {
            if f.kind == FieldKind::Other {
                return Err(AppError::internal(format!(
                    "field {}.{} is marked for account check, however, it is not a resource uuid or a list of resource uuids",
                    d.message_type, f.name
                )));
            }
            ownership_fields.push(OwnershipField { name: f.name, required: f.required, operation_target: f.operation_target });
        }
        let mut actions: Vec<String> = d.names.iter().map(|n| format!("{}:{}", d.category, n)).collect();
        actions.push(format!("{}:{}", d.category, d.message_type));
        Ok(ActionDescriptor {
            message_type: d.message_type,
            category: d.category,
            actions,
            admin_only: d.admin_only,
            account_only: d.account_only,
            ownership_fields,
        })
    }
}

#[derive(Debug, Default)]
pub struct ActionCatalog {
    by_type: HashMap<String, ActionDescriptor>,
}

impl ActionCatalog {
    pub fn build<I, S>(operation_types: I, declarations: Vec<ActionDeclaration>) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declared: HashMap<String, ActionDeclaration> = HashMap::new();
        for d in declarations.into_iter() {
            if declared.contains_key(&d.message_type) {
                return Err(AppError::internal(format!("operation {} declares its actions twice", d.message_type)));
            }
            declared.insert(d.message_type.clone(), d);
        }

        let mut by_type = HashMap::new();
        for t in operation_types.into_iter() {
            let t: String = t.into();
            let descriptor = match declared.remove(&t) {
                Some(d) => ActionDescriptor::from_declaration(d)?,
                None => {
                    debug!(target: "cloud_iam::catalog", "operation[{}] has no action declaration, assume it's an admin only operation", t);
                    ActionDescriptor::undeclared(&t)
                }
            };
            by_type.insert(t, descriptor);
        }

        if let Some(orphan) = declared.keys().next() {
            return Err(AppError::internal(format!("actions declared for unknown operation {}", orphan)));
        }
        debug!(target: "cloud_iam::catalog", "action catalog built with {} operations", by_type.len());
        Ok(ActionCatalog { by_type })
    }

    pub fn get(&self, message_type: &str) -> Option<&ActionDescriptor> { self.by_type.get(message_type) }

    pub fn len(&self) -> usize { self.by_type.len() }

    pub fn is_empty(&self) -> bool { self.by_type.is_empty() }

    /// `Name: category:a, category:b` for every operation a non-admin can be granted, sorted.
    pub fn describe(&self) -> Vec<String> {
        let sorted: BTreeMap<&String, &ActionDescriptor> = self.by_type.iter().collect();
        sorted
            .into_values()
            .filter(|d| !d.admin_only && !d.account_only)
            .map(|d| format!("{}: {}", short_name(&d.message_type), d.actions.join(", ")))
            .collect()
    }
}

fn short_name(message_type: &str) -> &str {
    let s = message_type.strip_prefix("API").unwrap_or(message_type);
    s.strip_suffix("Msg").unwrap_or(s)
}

/// Declarations of the identity operations handled by this crate.
pub fn identity_declarations() -> Vec<ActionDeclaration> {
    let decl = |t: &str| ActionDeclaration::new(t, IDENTITY_CATEGORY);
    vec![
        decl(msg::UPDATE_ACCOUNT).account_only(),
        decl(msg::CREATE_USER).account_only(),
        decl(msg::UPDATE_USER),
        decl(msg::CREATE_USER_GROUP).account_only(),
        decl(msg::ADD_USER_TO_GROUP).account_only(),
        decl(msg::CREATE_POLICY).account_only(),
        decl(msg::DELETE_POLICY).account_only(),
        decl(msg::ATTACH_POLICY_TO_USER).account_only(),
        decl(msg::DETACH_POLICY_FROM_USER).account_only(),
        decl(msg::ATTACH_POLICY_TO_USER_GROUP).account_only(),
        decl(msg::DETACH_POLICY_FROM_USER_GROUP).account_only(),
        decl(msg::SHARE_RESOURCE).account_only().field(FieldDeclaration::uuid_list("resourceUuids").required().target()),
        decl(msg::REVOKE_RESOURCE_SHARING).account_only().field(FieldDeclaration::uuid_list("resourceUuids").required().target()),
        decl(msg::LIST_USER).names(&["read"]),
        decl(msg::LIST_POLICY).names(&["read"]),
    ]
}
