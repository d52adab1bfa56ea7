//! Report Processor (C9) and Callable API (C10): orchestrates
//! positive/negative/retraction report processing and the six authenticated
//! entry points that produce side effects through it.
//!
//! # Modules
//!
//! - [`callable`]: the synchronous callable boundary (`reportPositiveTest`,
//!   `reportNegativeTest`, `getChainLinkInfo`, `deleteExposureReport`,
//!   `recoverAccount`, `exportUserData`)
//! - [`processor`]: the trigger-invoked half of positive/negative/retraction
//!   handling (chain propagation, batched writes, push fan-out)
//! - [`chain`]: chain-visualization construction and node-status mutation
//!   shared by `callable` and `processor`
//! - [`retention`]: the retention sweeper (C11), periodic bulk deletion
//!   past the retention horizon
//! - [`triggers`]: the trigger/scheduler adapter (C12), converts an
//!   external "report written" or "time fires" signal into a call into
//!   `processor`/`retention`
//! - [`error`]: this crate's error enum and its conversion to
//!   [`exposure_core::error::CallableError`]

pub mod callable;
pub mod chain;
pub mod error;
pub mod processor;
pub mod retention;
pub mod triggers;

pub use error::EngineError;
