//! Picks the push transport at startup: a real `FcmDispatcher` when
//! `--fcm-endpoint`/`--fcm-token` are configured, otherwise a logging
//! [`MockDispatcher`] so a daemon run without push credentials still
//! exercises every other code path.

use exposure_push::dispatcher::{PushDispatcher, TokenOutcome};
use exposure_push::{FcmDispatcher, MockDispatcher, PushError, PushMessage};

use crate::config::Config;

pub enum AnyDispatcher {
    Fcm(FcmDispatcher),
    Logging(MockDispatcher),
}

impl AnyDispatcher {
    pub fn from_config(config: &Config) -> Self {
        match (&config.fcm_endpoint, &config.fcm_token) {
            (Some(endpoint), Some(token)) => AnyDispatcher::Fcm(FcmDispatcher::new(endpoint.clone(), token.clone())),
            _ => {
                tracing::warn!("no FCM endpoint/token configured; pushes will be logged, not delivered");
                AnyDispatcher::Logging(MockDispatcher::new())
            }
        }
    }
}

impl PushDispatcher for AnyDispatcher {
    async fn send_single(&self, message: &PushMessage) -> Result<TokenOutcome, PushError> {
        match self {
            AnyDispatcher::Fcm(d) => d.send_single(message).await,
            AnyDispatcher::Logging(d) => {
                tracing::debug!(notification_id = %message.data.notification_id, "logging dispatcher: push suppressed");
                d.send_single(message).await
            }
        }
    }

    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<TokenOutcome>, PushError> {
        match self {
            AnyDispatcher::Fcm(d) => d.send_batch(messages).await,
            AnyDispatcher::Logging(d) => d.send_batch(messages).await,
        }
    }
}
