//! Transfer Core
//!
//! Domain core for a ledger transfer plugin: the transfer data model and
//! state machine primitives, the per-id idempotent registry, the pluggable
//! crypto-condition verifier, and the expiry scheduler that cancels
//! unfulfilled escrows.
//!
//! # Invariants
//!
//! - A transfer id is globally unique per registry instance; identical
//!   resubmission is a no-op, conflicting resubmission fails
//! - `fulfillment` is set iff the state is `Fulfilled`, and at most once
//! - Terminal states (`Fulfilled`, `Rejected`, `Cancelled`, `Completed`)
//!   permit no further transition
//! - All transitions for one id serialize through a single check-and-set

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod condition;
pub mod config;
pub mod error;
pub mod expiry;
pub mod registry;
pub mod types;

// Re-exports
pub use condition::{ConditionVerifier, PreimageSha256, Verification};
pub use config::{LedgerInfo, PluginConfig};
pub use error::{Error, Result};
pub use expiry::ExpiryScheduler;
pub use registry::{PutOutcome, TransferRegistry};
pub use types::{
    Account, Condition, Direction, Fulfillment, Transfer, TransferRecord, TransferState,
};
