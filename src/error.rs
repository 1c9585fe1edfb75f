//! Unified identity error model.
//! Every authentication, authorization and validation failure is an `AppError`;
//! the transport turns it into an `ErrorReply` instead of forwarding the request.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Authentication { code: String, message: String },
    InvalidSession { code: String, message: String },
    PermissionDenied { code: String, message: String },
    InvalidArgument { code: String, message: String },
    QuotaExceeded { code: String, message: String },
    NotFound { code: String, message: String },
    Internal { code: String, message: String },
}

/// Coarse error kind, used by callers that only branch on the category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    InvalidSession,
    PermissionDenied,
    InvalidArgument,
    QuotaExceeded,
    NotFound,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Authentication { .. } => ErrorKind::Authentication,
            AppError::InvalidSession { .. } => ErrorKind::InvalidSession,
            AppError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            AppError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            AppError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn code_str(&self) -> &str {
        match self {
            AppError::Authentication { code, .. }
            | AppError::InvalidSession { code, .. }
            | AppError::PermissionDenied { code, .. }
            | AppError::InvalidArgument { code, .. }
            | AppError::QuotaExceeded { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Authentication { message, .. }
            | AppError::InvalidSession { message, .. }
            | AppError::PermissionDenied { message, .. }
            | AppError::InvalidArgument { message, .. }
            | AppError::QuotaExceeded { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn authentication<S: Into<String>>(msg: S) -> Self { AppError::Authentication { code: "IDENTITY.1000".into(), message: msg.into() } }
    pub fn invalid_session<S: Into<String>>(msg: S) -> Self { AppError::InvalidSession { code: "IDENTITY.1001".into(), message: msg.into() } }
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self { AppError::PermissionDenied { code: "IDENTITY.1002".into(), message: msg.into() } }
    pub fn quota_exceeded<S: Into<String>>(msg: S) -> Self { AppError::QuotaExceeded { code: "IDENTITY.1003".into(), message: msg.into() } }
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self { AppError::InvalidArgument { code: "SYS.1007".into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::NotFound { code: "SYS.1005".into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AppError::Internal { code: "SYS.1000".into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Authentication { .. } => 401,
            AppError::InvalidSession { .. } => 401,
            AppError::PermissionDenied { .. } => 403,
            AppError::InvalidArgument { .. } => 400,
            AppError::QuotaExceeded { .. } => 429,
            AppError::NotFound { .. } => 404,
            AppError::Internal { .. } => 500,
        }
    }

    /// Structured reply carried back through the transport.
    pub fn to_reply(&self) -> ErrorReply {
        ErrorReply { kind: self.kind(), code: self.code_str().to_string(), message: self.message().to_string() }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<crate::store::StoreError> for AppError {
    fn from(err: crate::store::StoreError) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
