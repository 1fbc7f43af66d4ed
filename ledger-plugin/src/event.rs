//! Typed plugin notifications
//!
//! Local listeners subscribe to a broadcast channel of [`PluginEvent`]s.
//! Events are dispatched strictly after the underlying registry mutation
//! commits, so a listener that immediately queries the plugin (for example
//! `get_fulfillment` right after a fulfill event) sees state that already
//! reflects the notification.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use transfer_core::{Fulfillment, Transfer};
use uuid::Uuid;

use crate::metrics::NOTIFICATION_EMIT_TOTAL;

/// A notification emitted by a plugin instance
///
/// `Outgoing*` variants are observed by the sender of record, `Incoming*`
/// variants by the receiver. Transfer-bearing variants carry a full
/// snapshot of the transfer at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PluginEvent {
    /// Session established
    Connect,
    /// Session torn down
    Disconnect,
    /// Optimistic transfer completed, sender side
    OutgoingTransfer(Transfer),
    /// Optimistic transfer completed, receiver side
    IncomingTransfer(Transfer),
    /// Escrow accepted, sender side
    OutgoingPrepare(Transfer),
    /// Escrow accepted, receiver side
    IncomingPrepare(Transfer),
    /// Escrow executed, sender side
    OutgoingFulfill {
        /// The fulfilled transfer
        transfer: Transfer,
        /// The presented fulfillment
        fulfillment: Fulfillment,
    },
    /// Escrow executed, receiver side
    IncomingFulfill {
        /// The fulfilled transfer
        transfer: Transfer,
        /// The presented fulfillment
        fulfillment: Fulfillment,
    },
    /// Escrow rejected by the receiver, sender side
    OutgoingReject {
        /// The rejected transfer
        transfer: Transfer,
        /// Receiver-supplied reason
        reason: Option<String>,
    },
    /// Escrow rejected by the receiver, receiver side
    IncomingReject {
        /// The rejected transfer
        transfer: Transfer,
        /// Receiver-supplied reason
        reason: Option<String>,
    },
    /// Escrow expired unfulfilled, sender side
    OutgoingCancel(Transfer),
    /// Escrow expired unfulfilled, receiver side
    IncomingCancel(Transfer),
    /// Reply to a completed optimistic transfer
    Reply {
        /// The transfer being replied to
        transfer: Transfer,
        /// Opaque reply payload
        message: Vec<u8>,
    },
}

impl PluginEvent {
    /// Canonical snake_case notification name
    pub fn name(&self) -> &'static str {
        match self {
            PluginEvent::Connect => "connect",
            PluginEvent::Disconnect => "disconnect",
            PluginEvent::OutgoingTransfer(_) => "outgoing_transfer",
            PluginEvent::IncomingTransfer(_) => "incoming_transfer",
            PluginEvent::OutgoingPrepare(_) => "outgoing_prepare",
            PluginEvent::IncomingPrepare(_) => "incoming_prepare",
            PluginEvent::OutgoingFulfill { .. } => "outgoing_fulfill",
            PluginEvent::IncomingFulfill { .. } => "incoming_fulfill",
            PluginEvent::OutgoingReject { .. } => "outgoing_reject",
            PluginEvent::IncomingReject { .. } => "incoming_reject",
            PluginEvent::OutgoingCancel(_) => "outgoing_cancel",
            PluginEvent::IncomingCancel(_) => "incoming_cancel",
            PluginEvent::Reply { .. } => "reply",
        }
    }

    /// Id of the transfer this event concerns, if any
    pub fn transfer_id(&self) -> Option<Uuid> {
        match self {
            PluginEvent::Connect | PluginEvent::Disconnect => None,
            PluginEvent::OutgoingTransfer(t)
            | PluginEvent::IncomingTransfer(t)
            | PluginEvent::OutgoingPrepare(t)
            | PluginEvent::IncomingPrepare(t)
            | PluginEvent::OutgoingCancel(t)
            | PluginEvent::IncomingCancel(t) => Some(t.id),
            PluginEvent::OutgoingFulfill { transfer, .. }
            | PluginEvent::IncomingFulfill { transfer, .. }
            | PluginEvent::OutgoingReject { transfer, .. }
            | PluginEvent::IncomingReject { transfer, .. }
            | PluginEvent::Reply { transfer, .. } => Some(transfer.id),
        }
    }
}

/// Broadcast-based notifier for local listeners
#[derive(Debug)]
pub struct EventEmitter {
    sender: broadcast::Sender<PluginEvent>,
}

impl EventEmitter {
    /// Create an emitter with the given channel depth
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe a new local listener
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all current listeners
    ///
    /// Having no listener is not an error; the event is simply dropped.
    pub fn emit(&self, event: PluginEvent) {
        NOTIFICATION_EMIT_TOTAL
            .with_label_values(&[event.name()])
            .inc();
        debug!(event = event.name(), id = ?event.transfer_id(), "emitting plugin event");
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transfer_core::Account;

    fn sample_transfer() -> Transfer {
        Transfer {
            id: Uuid::new_v4(),
            ledger: "example.ledger.".to_string(),
            from_account: Account::new("example.ledger.alice"),
            to_account: Account::new("example.ledger.bob"),
            amount: "1.0".to_string(),
            data: None,
            note_to_self: None,
            execution_condition: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_event_names() {
        let transfer = sample_transfer();
        assert_eq!(PluginEvent::Connect.name(), "connect");
        assert_eq!(
            PluginEvent::OutgoingPrepare(transfer.clone()).name(),
            "outgoing_prepare"
        );
        assert_eq!(
            PluginEvent::IncomingCancel(transfer.clone()).name(),
            "incoming_cancel"
        );
        assert_eq!(
            PluginEvent::Reply {
                transfer,
                message: vec![1, 2, 3],
            }
            .name(),
            "reply"
        );
    }

    #[test]
    fn test_event_transfer_id() {
        let transfer = sample_transfer();
        assert_eq!(PluginEvent::Connect.transfer_id(), None);
        assert_eq!(
            PluginEvent::IncomingTransfer(transfer.clone()).transfer_id(),
            Some(transfer.id)
        );
    }

    #[tokio::test]
    async fn test_emitter_delivers_to_subscribers() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PluginEvent::Connect);
        let event = rx.recv().await.unwrap();
        assert_eq!(event, PluginEvent::Connect);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let emitter = EventEmitter::new(16);
        emitter.emit(PluginEvent::Disconnect);
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = PluginEvent::OutgoingTransfer(sample_transfer());
        let json = serde_json::to_string(&event).unwrap();
        let back: PluginEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
