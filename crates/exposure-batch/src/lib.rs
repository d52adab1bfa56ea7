//! One-shot-commit batchers, generalized from the teacher's batch-bounded
//! writes (`Storage::put_event` loop, `SyncManager`'s `max_batch`-bounded
//! delta responses) to the `Store`'s ≤500-op batch cap and the push
//! dispatcher's ≤500-token multicast cap.

mod fcm_batcher;
mod notification_batcher;

pub use fcm_batcher::{FcmBatchError, FcmBatcher, PendingPush};
pub use notification_batcher::{NotificationBatchError, NotificationBatcher, PendingNotification};
