//! Ledger Transfer Plugin
//!
//! A plugin interface for moving value between two accounts on a shared
//! ledger, with asynchronous notifications about each transfer's outcome.
//! Two variants are supported: optimistic (one-phase, completes on
//! acceptance) and universal (two-phase escrow gated by a crypto-condition,
//! with expiry, fulfillment, rejection, and idempotent retry).
//!
//! # Architecture
//!
//! - **Facade**: [`Plugin`] implements [`LedgerPlugin`], the externally
//!   visible API
//! - **Notifier**: typed [`PluginEvent`]s on a broadcast channel, emitted
//!   only after the registry mutation commits
//! - **Relay**: two paired instances reconcile through message exchange,
//!   never shared mutable memory
//! - **Core**: registry, condition verifier, and expiry scheduler live in
//!   the `transfer-core` crate

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod event;
pub mod metrics;
pub mod pair;
pub mod plugin;
pub mod relay;

// Re-exports
pub use event::{EventEmitter, PluginEvent};
pub use pair::{pair_plugins, pair_plugins_with_verifier};
pub use plugin::{LedgerPlugin, Plugin};
pub use relay::Notice;
pub use transfer_core::{
    Account, Condition, ConditionVerifier, Direction, Error, Fulfillment, LedgerInfo,
    PluginConfig, PreimageSha256, Result, Transfer, TransferRecord, TransferState, Verification,
};
