use thiserror::Error;

use exposure_core::types::NotificationKind;
use exposure_push::{dispatch_multicast, MulticastOutcome, PushDispatcher, PushError, PushMessage};

#[derive(Debug, Error)]
pub enum FcmBatchError {
    #[error("batch already sent")]
    AlreadySent,
    #[error(transparent)]
    Push(#[from] PushError),
}

/// One push queued for delivery. An empty `token` is accepted here and
/// dropped silently at send time, mirroring the underlying dispatcher's
/// contract.
pub struct PendingPush {
    pub token: String,
    pub notification_id: String,
    pub kind: NotificationKind,
}

/// Collects pending pushes, grouping and multicasting them on `send`.
/// Sending once is terminal.
pub struct FcmBatcher {
    pending: Vec<PendingPush>,
    sent: bool,
}

impl FcmBatcher {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            sent: false,
        }
    }

    pub fn add(&mut self, push: PendingPush) -> Result<(), FcmBatchError> {
        if self.sent {
            return Err(FcmBatchError::AlreadySent);
        }
        self.pending.push(push);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub async fn send<D: PushDispatcher>(&mut self, dispatcher: &D) -> Result<MulticastOutcome, FcmBatchError> {
        if self.sent {
            return Err(FcmBatchError::AlreadySent);
        }
        self.sent = true;

        let messages: Vec<PushMessage> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|p| PushMessage::new(p.token, p.notification_id, p.kind))
            .collect();

        Ok(dispatch_multicast(dispatcher, &messages).await?)
    }
}

impl Default for FcmBatcher {
    fn default() -> Self {
        Self::new()
    }
}
