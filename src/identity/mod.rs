//! Accounts, users, credentials and sessions.
//! Keep the public surface thin and split implementation across sub-modules.

pub mod model;
pub mod password;
mod provider;
mod session;

pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, WRONG_ACCOUNT_CREDENTIALS, WRONG_USER_CREDENTIALS};
pub use session::{SESSION_EXPIRED, SessionManager, SessionSweeper, new_uuid};
