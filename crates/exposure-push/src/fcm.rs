//! FCM v1 push dispatcher.
//!
//! Posts one message per device token to `:send`. FCM v1 has no true
//! server-side multicast endpoint, so "multicast" batching happens at the
//! grouping/capping layer in [`crate::dispatcher`] and this dispatcher just
//! fires the batch's requests.

use serde_json::json;

use crate::dispatcher::{PushDispatcher, TokenOutcome};
use crate::error::PushError;
use crate::payload::PushMessage;

const INVALID_REGISTRATION_TOKEN: &str = "invalid-registration-token";
const REGISTRATION_TOKEN_NOT_REGISTERED: &str = "registration-token-not-registered";

/// FCM v1 HTTP dispatcher.
pub struct FcmDispatcher {
    client: reqwest::Client,
    send_endpoint: String,
    bearer_token: String,
}

impl FcmDispatcher {
    /// `send_endpoint` is the full `https://fcm.googleapis.com/v1/projects/<project>/messages:send`
    /// URL; `bearer_token` is an already-minted OAuth2 access token (minting
    /// it is the project's auth concern, out of scope here).
    pub fn new(send_endpoint: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_endpoint: send_endpoint.into(),
            bearer_token: bearer_token.into(),
        }
    }

    fn build_body(message: &PushMessage) -> serde_json::Value {
        json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title_loc_key": message.title_loc_key,
                    "body_loc_key": message.body_loc_key,
                },
                "data": {
                    "notificationId": message.data.notification_id,
                    "type": message.data.kind,
                },
                "android": { "notification": { "channel_id": "exposure_alerts" } },
                "apns": {
                    "payload": {
                        "aps": {
                            "alert": {
                                "loc-key": message.title_loc_key,
                                "body-loc-key": message.body_loc_key,
                            }
                        }
                    }
                },
            }
        })
    }

    async fn classify_response(&self, response: reqwest::Response) -> Result<TokenOutcome, PushError> {
        let status = response.status();
        if status.is_success() {
            return Ok(TokenOutcome::Success);
        }
        let body = response.text().await.unwrap_or_default();
        if body.contains(INVALID_REGISTRATION_TOKEN) || body.contains(REGISTRATION_TOKEN_NOT_REGISTERED) {
            return Ok(TokenOutcome::InvalidToken);
        }
        tracing::warn!(status = %status, body = %body, "fcm send failed");
        Ok(TokenOutcome::OtherFailure)
    }
}

impl PushDispatcher for FcmDispatcher {
    async fn send_single(&self, message: &PushMessage) -> Result<TokenOutcome, PushError> {
        let response = self
            .client
            .post(&self.send_endpoint)
            .bearer_auth(&self.bearer_token)
            .json(&Self::build_body(message))
            .send()
            .await?;
        self.classify_response(response).await
    }

    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<TokenOutcome>, PushError> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.send_single(message).await?);
        }
        Ok(outcomes)
    }
}
