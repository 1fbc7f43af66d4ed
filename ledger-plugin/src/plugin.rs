//! Plugin facade and transfer state machine
//!
//! The facade validates inputs, drives the registry through legal state
//! transitions, applies the crypto-condition check, and hands committed
//! transitions to the notifier. Emission always follows the commit: by the
//! time a listener observes an event, the registry already reflects it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use transfer_core::{
    ConditionVerifier, Direction, Error, ExpiryScheduler, Fulfillment, LedgerInfo, PluginConfig,
    PreimageSha256, PutOutcome, Result, Transfer, TransferRecord, TransferRegistry, TransferState,
    Verification,
};
use uuid::Uuid;

use crate::event::{EventEmitter, PluginEvent};
use crate::metrics::{TRANSFER_FINAL_TOTAL, TRANSFER_SUBMIT_TOTAL};
use crate::relay::Notice;

/// The externally visible ledger plugin interface
///
/// One instance represents one party's view of the shared ledger. All
/// operations are asynchronous and may be invoked concurrently; transitions
/// for a single transfer id serialize internally.
#[async_trait]
pub trait LedgerPlugin: Send + Sync {
    /// Establish the session and emit `connect`
    async fn connect(&self) -> Result<()>;

    /// Tear down the session and emit `disconnect`
    async fn disconnect(&self) -> Result<()>;

    /// Current session flag
    fn is_connected(&self) -> bool;

    /// Ledger metadata (precision, scale, currency)
    async fn get_info(&self) -> Result<LedgerInfo>;

    /// Informational balance as a decimal string
    async fn get_balance(&self) -> Result<String>;

    /// Known connector accounts on this ledger
    async fn get_connectors(&self) -> Result<Vec<String>>;

    /// Submit an optimistic transfer (or an escrow when a condition is set)
    async fn send_transfer(&self, transfer: Transfer) -> Result<()>;

    /// Submit a transfer; a present execution condition selects the escrow path
    async fn send(&self, transfer: Transfer) -> Result<()>;

    /// Present a fulfillment for a prepared transfer
    async fn fulfill_condition(&self, id: Uuid, fulfillment: Fulfillment) -> Result<()>;

    /// Retrieve the stored fulfillment of an executed transfer
    async fn get_fulfillment(&self, id: Uuid) -> Result<Fulfillment>;

    /// Reject a prepared incoming transfer (receiver only)
    async fn reject_incoming_transfer(&self, id: Uuid, reason: Option<String>) -> Result<()>;

    /// Reply to a completed optimistic transfer
    async fn reply_to_transfer(&self, id: Uuid, message: Vec<u8>) -> Result<()>;
}

/// Shared state behind one plugin instance
pub(crate) struct PluginShared {
    config: PluginConfig,
    registry: TransferRegistry,
    expiry: ExpiryScheduler,
    events: EventEmitter,
    verifier: Arc<dyn ConditionVerifier>,
    connected: AtomicBool,
    peer: Option<mpsc::Sender<Notice>>,
}

/// A ledger plugin instance
///
/// Cheap to clone; clones share the same registry and session.
#[derive(Clone)]
pub struct Plugin {
    inner: Arc<PluginShared>,
}

impl Plugin {
    /// Build a plugin wired to a counterparty mailbox
    pub(crate) fn with_peer(
        config: PluginConfig,
        verifier: Arc<dyn ConditionVerifier>,
        peer: Option<mpsc::Sender<Notice>>,
    ) -> Self {
        let events = EventEmitter::new(config.event_capacity);
        Self {
            inner: Arc::new(PluginShared {
                config,
                registry: TransferRegistry::new(),
                expiry: ExpiryScheduler::new(),
                events,
                verifier,
                connected: AtomicBool::new(false),
                peer,
            }),
        }
    }

    /// Build a plugin with no counterparty, using the default preimage scheme
    ///
    /// Useful for exercising the facade in isolation; relayed notifications
    /// are skipped.
    pub fn standalone(config: PluginConfig) -> Self {
        Self::with_peer(config, Arc::new(PreimageSha256), None)
    }

    /// Subscribe to this instance's notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot the record for a transfer, if known
    pub fn transfer_record(&self, id: Uuid) -> Option<TransferRecord> {
        self.inner.registry.get(id)
    }

    /// Current state of a transfer, if known
    pub fn state_of(&self, id: Uuid) -> Option<TransferState> {
        self.inner.registry.get(id).map(|record| record.state)
    }

    pub(crate) fn shared(&self) -> Arc<PluginShared> {
        Arc::clone(&self.inner)
    }
}

#[async_trait]
impl LedgerPlugin for Plugin {
    async fn connect(&self) -> Result<()> {
        self.inner.connected.store(true, Ordering::SeqCst);
        info!(account = %self.inner.config.account, "plugin connected");
        self.inner.events.emit(PluginEvent::Connect);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner.connected.store(false, Ordering::SeqCst);
        info!(account = %self.inner.config.account, "plugin disconnected");
        self.inner.events.emit(PluginEvent::Disconnect);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn get_info(&self) -> Result<LedgerInfo> {
        self.inner.ensure_connected()?;
        Ok(self.inner.config.info.clone())
    }

    async fn get_balance(&self) -> Result<String> {
        self.inner.ensure_connected()?;
        Ok(self.inner.config.balance.clone())
    }

    async fn get_connectors(&self) -> Result<Vec<String>> {
        self.inner.ensure_connected()?;
        Ok(self.inner.config.connectors.clone())
    }

    async fn send_transfer(&self, transfer: Transfer) -> Result<()> {
        self.inner.submit(transfer).await
    }

    async fn send(&self, transfer: Transfer) -> Result<()> {
        self.inner.submit(transfer).await
    }

    async fn fulfill_condition(&self, id: Uuid, fulfillment: Fulfillment) -> Result<()> {
        self.inner.ensure_connected()?;

        let verifier = Arc::clone(&self.inner.verifier);
        let (transfer, direction) = self.inner.registry.update(id, |record| {
            match record.state {
                TransferState::Prepared => {}
                TransferState::Fulfilled => {
                    return Err(Error::Repeat(format!("transfer {} already fulfilled", id)))
                }
                other => {
                    return Err(Error::NotAccepted(format!(
                        "transfer {} is {}, cannot fulfill",
                        id, other
                    )))
                }
            }

            let condition = record
                .transfer
                .execution_condition
                .clone()
                .ok_or_else(|| {
                    Error::NotAccepted(format!("transfer {} has no execution condition", id))
                })?;

            match verifier.verify(&condition, &fulfillment) {
                Verification::Malformed => Err(Error::InvalidFields(
                    "fulfillment failed structural parsing".to_string(),
                )),
                Verification::Mismatch => Err(Error::NotAccepted(
                    "fulfillment does not satisfy the condition".to_string(),
                )),
                Verification::Match => {
                    record.fulfillment = Some(fulfillment.clone());
                    record.set_state(TransferState::Fulfilled);
                    Ok((record.transfer.clone(), record.direction))
                }
            }
        })?;

        self.inner.expiry.disarm(&id);
        TRANSFER_FINAL_TOTAL.with_label_values(&["fulfilled"]).inc();
        info!(%id, "transfer fulfilled");

        let event = match direction {
            Direction::Outgoing => PluginEvent::OutgoingFulfill {
                transfer,
                fulfillment: fulfillment.clone(),
            },
            Direction::Incoming => PluginEvent::IncomingFulfill {
                transfer,
                fulfillment: fulfillment.clone(),
            },
        };
        self.inner.events.emit(event);
        self.inner.relay(Notice::Fulfill { id, fulfillment }).await
    }

    async fn get_fulfillment(&self, id: Uuid) -> Result<Fulfillment> {
        self.inner.ensure_connected()?;
        let record = self
            .inner
            .registry
            .get(id)
            .ok_or(Error::TransferNotFound(id))?;
        record.fulfillment.ok_or(Error::MissingFulfillment(id))
    }

    async fn reject_incoming_transfer(&self, id: Uuid, reason: Option<String>) -> Result<()> {
        self.inner.ensure_connected()?;

        let transfer = self.inner.registry.update(id, |record| {
            if record.direction != Direction::Incoming {
                return Err(Error::NotAccepted(format!(
                    "transfer {} may only be rejected by its receiver",
                    id
                )));
            }
            match record.state {
                TransferState::Prepared => {}
                TransferState::Rejected => {
                    return Err(Error::Repeat(format!("transfer {} already rejected", id)))
                }
                other => {
                    return Err(Error::NotAccepted(format!(
                        "transfer {} is {}, cannot reject",
                        id, other
                    )))
                }
            }
            record.rejection_reason = reason.clone();
            record.set_state(TransferState::Rejected);
            Ok(record.transfer.clone())
        })?;

        self.inner.expiry.disarm(&id);
        TRANSFER_FINAL_TOTAL.with_label_values(&["rejected"]).inc();
        info!(%id, "incoming transfer rejected");

        self.inner.events.emit(PluginEvent::IncomingReject {
            transfer,
            reason: reason.clone(),
        });
        self.inner.relay(Notice::Reject { id, reason }).await
    }

    async fn reply_to_transfer(&self, id: Uuid, message: Vec<u8>) -> Result<()> {
        self.inner.ensure_connected()?;

        let record = self
            .inner
            .registry
            .get(id)
            .ok_or(Error::TransferNotFound(id))?;
        if record.direction != Direction::Incoming {
            return Err(Error::NotAccepted(format!(
                "transfer {} may only be replied to by its receiver",
                id
            )));
        }
        if record.state != TransferState::Completed {
            return Err(Error::NotAccepted(format!(
                "transfer {} is {}, reply is only valid once completed",
                id, record.state
            )));
        }

        self.inner.relay(Notice::Reply { id, message }).await
    }
}

impl PluginShared {
    pub(crate) fn config(&self) -> &PluginConfig {
        &self.config
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Send a notice to the counterparty, if one is wired up
    async fn relay(&self, notice: Notice) -> Result<()> {
        if let Some(peer) = &self.peer {
            peer.send(notice)
                .await
                .map_err(|_| Error::Channel("counterparty mailbox closed".to_string()))?;
        }
        Ok(())
    }

    /// Accept a transfer submission and commit its first transition
    async fn submit(self: &Arc<Self>, transfer: Transfer) -> Result<()> {
        self.ensure_connected()?;
        transfer.validate(chrono::Utc::now())?;

        if transfer.ledger != self.config.ledger {
            return Err(Error::InvalidFields(format!(
                "transfer ledger '{}' does not match plugin ledger '{}'",
                transfer.ledger, self.config.ledger
            )));
        }

        let universal = transfer.is_universal();
        let path = if universal { "universal" } else { "optimistic" };
        let state = if universal {
            TransferState::Prepared
        } else {
            TransferState::Completed
        };

        let record = TransferRecord::new(transfer.clone(), Direction::Outgoing, state);
        match self.registry.put(record) {
            PutOutcome::Created => {
                TRANSFER_SUBMIT_TOTAL
                    .with_label_values(&[path, "created"])
                    .inc();

                if universal {
                    info!(id = %transfer.id, amount = %transfer.amount, "transfer prepared");
                    // Emit before arming: a near-now deadline must not get
                    // its cancel event ahead of the prepare event
                    self.events.emit(PluginEvent::OutgoingPrepare(transfer.clone()));
                    // Validation guarantees expires_at is present here
                    if let Some(expires_at) = transfer.expires_at {
                        self.arm_expiry(transfer.id, expires_at);
                    }
                    self.relay(Notice::Prepare(transfer)).await
                } else {
                    TRANSFER_FINAL_TOTAL.with_label_values(&["completed"]).inc();
                    info!(id = %transfer.id, amount = %transfer.amount, "transfer completed");
                    self.events.emit(PluginEvent::OutgoingTransfer(transfer.clone()));
                    self.relay(Notice::Transfer(transfer)).await
                }
            }
            PutOutcome::Duplicate => {
                TRANSFER_SUBMIT_TOTAL
                    .with_label_values(&[path, "duplicate"])
                    .inc();
                debug!(id = %transfer.id, "identical resubmission resolved without side effects");
                Ok(())
            }
            PutOutcome::Conflict => {
                TRANSFER_SUBMIT_TOTAL
                    .with_label_values(&[path, "conflict"])
                    .inc();
                Err(Error::DuplicateId(transfer.id))
            }
        }
    }

    /// Arm the cancellation timer for a prepared transfer
    fn arm_expiry(self: &Arc<Self>, id: Uuid, expires_at: chrono::DateTime<chrono::Utc>) {
        let shared = Arc::clone(self);
        self.expiry.arm(id, expires_at, move || async move {
            shared.expire(id);
        });
    }

    /// Expiry callback: cancel the escrow if it is still prepared
    ///
    /// Checked against live registry state, so a late tick after a fulfill
    /// or reject is a no-op.
    fn expire(&self, id: Uuid) {
        let outcome = self.registry.update(id, |record| {
            if record.state != TransferState::Prepared {
                return Ok(None);
            }
            record.set_state(TransferState::Cancelled);
            Ok(Some((record.transfer.clone(), record.direction)))
        });

        match outcome {
            Ok(Some((transfer, direction))) => {
                self.expiry.disarm(&id);
                TRANSFER_FINAL_TOTAL.with_label_values(&["cancelled"]).inc();
                info!(%id, "transfer expired unfulfilled, cancelled");
                let event = match direction {
                    Direction::Outgoing => PluginEvent::OutgoingCancel(transfer),
                    Direction::Incoming => PluginEvent::IncomingCancel(transfer),
                };
                self.events.emit(event);
            }
            Ok(None) => {
                debug!(%id, "expiry fired after terminal transition, ignoring");
            }
            Err(e) => {
                warn!(%id, error = %e, "expiry fired for unknown transfer");
            }
        }
    }

    /// Apply a counterparty notice to the local registry
    ///
    /// Mirrors the remote transition under the same guards as local
    /// operations; stale or duplicate notices are logged no-ops.
    pub(crate) fn apply_notice(self: &Arc<Self>, notice: Notice) {
        match notice {
            Notice::Transfer(transfer) => {
                let record = TransferRecord::new(
                    transfer.clone(),
                    Direction::Incoming,
                    TransferState::Completed,
                );
                match self.registry.put(record) {
                    PutOutcome::Created => {
                        self.events.emit(PluginEvent::IncomingTransfer(transfer));
                    }
                    PutOutcome::Duplicate => {
                        debug!(id = %transfer.id, "mirrored transfer already known");
                    }
                    PutOutcome::Conflict => {
                        warn!(id = %transfer.id, "conflicting mirrored transfer ignored");
                    }
                }
            }

            Notice::Prepare(transfer) => {
                let record = TransferRecord::new(
                    transfer.clone(),
                    Direction::Incoming,
                    TransferState::Prepared,
                );
                match self.registry.put(record) {
                    PutOutcome::Created => {
                        let expires_at = transfer.expires_at;
                        let id = transfer.id;
                        self.events.emit(PluginEvent::IncomingPrepare(transfer));
                        if let Some(expires_at) = expires_at {
                            self.arm_expiry(id, expires_at);
                        }
                    }
                    PutOutcome::Duplicate => {
                        debug!(id = %transfer.id, "mirrored prepare already known");
                    }
                    PutOutcome::Conflict => {
                        warn!(id = %transfer.id, "conflicting mirrored prepare ignored");
                    }
                }
            }

            Notice::Fulfill { id, fulfillment } => {
                let applied = self.registry.update(id, |record| {
                    if record.state != TransferState::Prepared {
                        return Ok(None);
                    }
                    record.fulfillment = Some(fulfillment.clone());
                    record.set_state(TransferState::Fulfilled);
                    Ok(Some((record.transfer.clone(), record.direction)))
                });
                match applied {
                    Ok(Some((transfer, direction))) => {
                        self.expiry.disarm(&id);
                        let event = match direction {
                            Direction::Outgoing => PluginEvent::OutgoingFulfill {
                                transfer,
                                fulfillment,
                            },
                            Direction::Incoming => PluginEvent::IncomingFulfill {
                                transfer,
                                fulfillment,
                            },
                        };
                        self.events.emit(event);
                    }
                    Ok(None) => debug!(%id, "mirrored fulfill arrived after terminal transition"),
                    Err(e) => debug!(%id, error = %e, "mirrored fulfill for unknown transfer"),
                }
            }

            Notice::Reject { id, reason } => {
                let applied = self.registry.update(id, |record| {
                    if record.state != TransferState::Prepared {
                        return Ok(None);
                    }
                    record.rejection_reason = reason.clone();
                    record.set_state(TransferState::Rejected);
                    Ok(Some((record.transfer.clone(), record.direction)))
                });
                match applied {
                    Ok(Some((transfer, direction))) => {
                        self.expiry.disarm(&id);
                        let event = match direction {
                            Direction::Outgoing => PluginEvent::OutgoingReject { transfer, reason },
                            Direction::Incoming => PluginEvent::IncomingReject { transfer, reason },
                        };
                        self.events.emit(event);
                    }
                    Ok(None) => debug!(%id, "mirrored reject arrived after terminal transition"),
                    Err(e) => debug!(%id, error = %e, "mirrored reject for unknown transfer"),
                }
            }

            Notice::Reply { id, message } => match self.registry.get(id) {
                Some(record) => {
                    self.events.emit(PluginEvent::Reply {
                        transfer: record.transfer,
                        message,
                    });
                }
                None => debug!(%id, "reply for unknown transfer ignored"),
            },
        }
    }
}
