//! Push notification dispatch: localization-key payloads, multicast
//! grouping/batching, and invalid-token classification.

pub mod dispatcher;
pub mod error;
pub mod fcm;
pub mod mock;
pub mod payload;

pub use dispatcher::{dispatch_multicast, MulticastOutcome, PushDispatcher, TokenOutcome, MULTICAST_BATCH_CAP};
pub use error::PushError;
pub use fcm::FcmDispatcher;
pub use mock::MockDispatcher;
pub use payload::{LocKeyPair, PushData, PushMessage};
