//! In-memory dispatcher for tests, mirroring the teacher's
//! `prober::receipt::MemoryReceiptStore` "recorder" pattern.

use std::sync::Mutex;

use crate::dispatcher::{PushDispatcher, TokenOutcome};
use crate::error::PushError;
use crate::payload::PushMessage;

#[derive(Default)]
pub struct MockDispatcher {
    sent: Mutex<Vec<PushMessage>>,
    invalid_tokens: Mutex<Vec<String>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a token as one that should be classified invalid on send.
    pub fn mark_invalid(&self, token: impl Into<String>) {
        self.invalid_tokens.lock().unwrap().push(token.into());
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl PushDispatcher for MockDispatcher {
    async fn send_single(&self, message: &PushMessage) -> Result<TokenOutcome, PushError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.invalid_tokens.lock().unwrap().contains(&message.token) {
            Ok(TokenOutcome::InvalidToken)
        } else {
            Ok(TokenOutcome::Success)
        }
    }

    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<TokenOutcome>, PushError> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.send_single(message).await?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::dispatch_multicast;
    use exposure_core::types::NotificationKind;

    #[tokio::test]
    async fn marked_invalid_tokens_are_classified_and_recorded() {
        let mock = MockDispatcher::new();
        mock.mark_invalid("stale-token");
        let messages = vec![
            PushMessage::new("stale-token", "n1", NotificationKind::Exposure),
            PushMessage::new("fresh-token", "n1", NotificationKind::Exposure),
        ];
        let outcome = dispatch_multicast(&mock, &messages).await.unwrap();
        assert_eq!(outcome.invalid_token_indices, vec![0]);
        assert_eq!(mock.sent().len(), 2);
    }
}
