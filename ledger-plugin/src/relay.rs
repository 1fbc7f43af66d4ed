//! Counterparty relay
//!
//! Two plugin instances sharing one ledger are independent state-holders
//! reconciled by message exchange, never by shared mutable memory. Each
//! instance owns a bounded mpsc sender towards its counterparty and a task
//! draining its own inbox. One channel per direction means notices for a
//! given transfer arrive in the order its state actually transitioned.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use transfer_core::{Fulfillment, Transfer};
use uuid::Uuid;

use crate::plugin::PluginShared;

/// A notification relayed to the counterparty plugin instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notice {
    /// Optimistic transfer completed
    Transfer(Transfer),
    /// Escrow accepted
    Prepare(Transfer),
    /// Escrow executed with this fulfillment
    Fulfill {
        /// Transfer id
        id: Uuid,
        /// The presented fulfillment
        fulfillment: Fulfillment,
    },
    /// Escrow rejected by the receiver
    Reject {
        /// Transfer id
        id: Uuid,
        /// Receiver-supplied reason
        reason: Option<String>,
    },
    /// Reply to a completed optimistic transfer
    Reply {
        /// Transfer id
        id: Uuid,
        /// Opaque reply payload
        message: Vec<u8>,
    },
}

impl Notice {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::Transfer(_) => "transfer",
            Notice::Prepare(_) => "prepare",
            Notice::Fulfill { .. } => "fulfill",
            Notice::Reject { .. } => "reject",
            Notice::Reply { .. } => "reply",
        }
    }
}

/// Spawn the task that applies counterparty notices to the local plugin
///
/// Application is guarded by the same state machine rules as local
/// operations, so a late or duplicate notice is a logged no-op rather
/// than a double transition.
pub(crate) fn spawn_relay(
    shared: Arc<PluginShared>,
    mut inbox: mpsc::Receiver<Notice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = inbox.recv().await {
            debug!(kind = notice.kind(), account = %shared.config().account, "applying counterparty notice");
            shared.apply_notice(notice);
        }
        info!(account = %shared.config().account, "counterparty channel closed, relay stopping");
    })
}
