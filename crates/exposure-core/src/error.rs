//! Shared error taxonomy for callable boundaries.
//!
//! Component crates keep their own `thiserror` enums (`StoreError`,
//! `PushError`, ...) and only convert into `CallableError` at the outermost
//! boundary. The same layering is kept between e.g. `StorageError`/
//! `EventLogError`/`SyncError` and the CLI's `ExitCode`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire error code.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    ResourceExhausted,
    PermissionDenied,
    NotFound,
    Internal,
}

/// The error shape returned by every callable.
///
/// `message` must never include hashed ids or other internal identifiers.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
#[error("{code:?}: {message}")]
pub struct CallableError {
    pub code: ErrorCode,
    pub message: String,
}

impl CallableError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceExhausted, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}
