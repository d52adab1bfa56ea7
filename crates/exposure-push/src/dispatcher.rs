//! Dispatcher trait, multicast grouping/batching, and outcome aggregation.

use crate::error::PushError;
use crate::payload::PushMessage;

/// Platform cap on a single multicast call's token list.
pub const MULTICAST_BATCH_CAP: usize = 500;

/// Per-token delivery result from a single multicast call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenOutcome {
    Success,
    /// `invalid-registration-token` or `registration-token-not-registered`.
    /// The owning user's `fcmToken` must be cleared.
    InvalidToken,
    /// Any other per-token failure; logged and counted, no cleanup.
    OtherFailure,
}

/// Aggregate result of dispatching a (possibly multi-batch) multicast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MulticastOutcome {
    pub success_count: u64,
    pub failure_count: u64,
    /// Indices into the original `messages` slice whose token is invalid.
    pub invalid_token_indices: Vec<usize>,
}

/// A push transport. Implementations only need to deliver one already-grouped,
/// already-capped batch; grouping/batching/aggregation lives in
/// [`dispatch_multicast`].
pub trait PushDispatcher: Send + Sync {
    fn send_single(
        &self,
        message: &PushMessage,
    ) -> impl std::future::Future<Output = Result<TokenOutcome, PushError>> + Send;

    /// Send one batch (already ≤ [`MULTICAST_BATCH_CAP`], already uniform in
    /// loc-key/type signature). Returns one [`TokenOutcome`] per input
    /// message, same order.
    fn send_batch(
        &self,
        messages: &[PushMessage],
    ) -> impl std::future::Future<Output = Result<Vec<TokenOutcome>, PushError>> + Send;
}

/// Group `messages` by `(titleLocKey, bodyLocKey, type)`, split each group
/// into batches of at most [`MULTICAST_BATCH_CAP`] tokens, dispatch every
/// batch, and fold the per-token results back into global-index terms.
pub async fn dispatch_multicast<D: PushDispatcher>(
    dispatcher: &D,
    messages: &[PushMessage],
) -> Result<MulticastOutcome, PushError> {
    let mut groups: std::collections::HashMap<(&'static str, &'static str, String), Vec<usize>> =
        std::collections::HashMap::new();
    for (idx, message) in messages.iter().enumerate() {
        if message.token.is_empty() {
            continue; // dropped silently, not sent, not counted as failure
        }
        groups.entry(message.group_signature()).or_default().push(idx);
    }

    let mut outcome = MulticastOutcome::default();
    for indices in groups.into_values() {
        for batch_indices in indices.chunks(MULTICAST_BATCH_CAP) {
            let batch: Vec<PushMessage> = batch_indices.iter().map(|&i| messages[i].clone()).collect();
            let results = dispatcher.send_batch(&batch).await?;
            for (local_idx, result) in results.into_iter().enumerate() {
                let global_idx = batch_indices[local_idx];
                match result {
                    TokenOutcome::Success => outcome.success_count += 1,
                    TokenOutcome::InvalidToken => {
                        outcome.failure_count += 1;
                        outcome.invalid_token_indices.push(global_idx);
                    }
                    TokenOutcome::OtherFailure => outcome.failure_count += 1,
                }
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PushMessage;
    use exposure_core::types::NotificationKind;
    use std::sync::Mutex;

    struct RecordingDispatcher {
        batches_seen: Mutex<Vec<usize>>,
        fail_token: Option<String>,
    }

    impl PushDispatcher for RecordingDispatcher {
        async fn send_single(&self, _message: &PushMessage) -> Result<TokenOutcome, PushError> {
            Ok(TokenOutcome::Success)
        }

        async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<TokenOutcome>, PushError> {
            self.batches_seen.lock().unwrap().push(messages.len());
            Ok(messages
                .iter()
                .map(|m| {
                    if Some(&m.token) == self.fail_token.as_ref() {
                        TokenOutcome::InvalidToken
                    } else {
                        TokenOutcome::Success
                    }
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn empty_tokens_are_dropped_silently() {
        let dispatcher = RecordingDispatcher {
            batches_seen: Mutex::new(Vec::new()),
            fail_token: None,
        };
        let messages = vec![
            PushMessage::new("", "n1", NotificationKind::Exposure),
            PushMessage::new("tok-1", "n2", NotificationKind::Exposure),
        ];
        let outcome = dispatch_multicast(&dispatcher, &messages).await.unwrap();
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failure_count, 0);
    }

    #[tokio::test]
    async fn groups_split_by_signature_and_batched_at_cap() {
        let dispatcher = RecordingDispatcher {
            batches_seen: Mutex::new(Vec::new()),
            fail_token: None,
        };
        let mut messages = Vec::new();
        for i in 0..600 {
            messages.push(PushMessage::new(format!("tok-{i}"), "n1", NotificationKind::Exposure));
        }
        for i in 0..5 {
            messages.push(PushMessage::new(format!("upd-{i}"), "n2", NotificationKind::Update));
        }
        let outcome = dispatch_multicast(&dispatcher, &messages).await.unwrap();
        assert_eq!(outcome.success_count, 605);

        let seen = dispatcher.batches_seen.lock().unwrap();
        assert!(seen.iter().all(|&n| n <= MULTICAST_BATCH_CAP));
        assert_eq!(seen.iter().sum::<usize>(), 605);
    }

    #[tokio::test]
    async fn invalid_token_indices_map_back_to_the_input_slice() {
        let dispatcher = RecordingDispatcher {
            batches_seen: Mutex::new(Vec::new()),
            fail_token: Some("bad-token".to_string()),
        };
        let messages = vec![
            PushMessage::new("good-1", "n1", NotificationKind::Exposure),
            PushMessage::new("bad-token", "n1", NotificationKind::Exposure),
            PushMessage::new("good-2", "n1", NotificationKind::Exposure),
        ];
        let outcome = dispatch_multicast(&dispatcher, &messages).await.unwrap();
        assert_eq!(outcome.invalid_token_indices, vec![1]);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failure_count, 1);
    }
}
