//! Exposure Notification Core: shared domain types, hashing, and error taxonomy.
//!
//! # Modules
//!
//! - [`hashing`]: domain-separated SHA-256 derivations (H_I, H_N, H_R, H_C)
//! - [`incubation`]: per-STI incubation windows
//! - [`types`]: collection entities (User, Interaction, Report, Notification, ...)
//! - [`error`]: shared error taxonomy for callable boundaries

pub mod error;
pub mod hashing;
pub mod incubation;
pub mod time;
pub mod types;

pub use error::{CallableError, ErrorCode};
pub use hashing::HashDigest;
