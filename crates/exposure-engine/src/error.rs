//! `exposure-engine`'s own error enum, converted into `CallableError` only
//! at the callable boundary: the same layering `exposure-store`'s
//! `StoreError` and `exposure-push`'s `PushError` keep from the core error
//! taxonomy.

use exposure_core::error::{CallableError, ErrorCode};
use exposure_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    NotificationBatch(#[from] exposure_batch::NotificationBatchError),
    #[error(transparent)]
    FcmBatch(#[from] exposure_batch::FcmBatchError),
}

impl From<EngineError> for CallableError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(msg) => CallableError::new(ErrorCode::NotFound, msg),
            EngineError::InvalidArgument(msg) => CallableError::new(ErrorCode::InvalidArgument, msg),
            EngineError::PermissionDenied(msg) => CallableError::new(ErrorCode::PermissionDenied, msg),
            EngineError::RateLimited(msg) => CallableError::new(ErrorCode::ResourceExhausted, msg),
            EngineError::Store(StoreError::NotFound(msg)) => CallableError::new(ErrorCode::NotFound, msg),
            EngineError::Store(StoreError::InvalidArgument(msg)) => {
                CallableError::new(ErrorCode::InvalidArgument, msg)
            }
            EngineError::Store(StoreError::PermissionDenied(msg)) => {
                CallableError::new(ErrorCode::PermissionDenied, msg)
            }
            EngineError::Store(StoreError::Unauthenticated) => {
                CallableError::new(ErrorCode::Unauthenticated, "unauthenticated")
            }
            EngineError::Store(StoreError::ResourceExhausted(msg)) => {
                CallableError::new(ErrorCode::ResourceExhausted, msg)
            }
            EngineError::Store(other) => {
                tracing::error!(error = %other, "store error surfaced as internal");
                CallableError::new(ErrorCode::Internal, "internal error")
            }
            EngineError::NotificationBatch(err) => {
                tracing::error!(error = %err, "notification batch error surfaced as internal");
                CallableError::new(ErrorCode::Internal, "internal error")
            }
            EngineError::FcmBatch(err) => {
                tracing::error!(error = %err, "fcm batch error surfaced as internal");
                CallableError::new(ErrorCode::Internal, "internal error")
            }
        }
    }
}
