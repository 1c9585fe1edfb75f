//! Identity, session and policy authorization core.
//!
//! Every inbound API message goes through [`AccountManager::intercept`]: session
//! check, operation flags, ownership of referenced resources, then the user and
//! group policy tiers. Identity operations are handled in place; resource
//! operations are forwarded to their plugins once authorized.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod ownership;
pub mod policy;
pub mod quota;
pub mod store;

pub use api::{ApiBody, ApiMessage, ApiReply, ResourceOperation};
pub use catalog::{ActionCatalog, ActionDeclaration, FieldDeclaration};
pub use config::IdentityConfig;
pub use error::{AppError, AppResult, ErrorKind, ErrorReply};
pub use manager::{AccountManager, PluginSet};
pub use ownership::{OwnershipResolver, Visibility};
pub use quota::{Quota, QuotaPair, ReportQuota};
pub use store::{EntityStore, MemoryStore, Page};

// Test-only printing helper: expands to eprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
