//! Core types for ledger transfers
//!
//! The central entity is [`Transfer`]: an immutable submission whose
//! lifecycle is tracked by a [`TransferRecord`] in the registry. Amounts
//! are kept as decimal strings to preserve arbitrary precision and are
//! parsed with `rust_decimal` only for validation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Opaque account identifier on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account(String);

impl Account {
    /// Create new account identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded execution condition (base64url SHA-256 digest, no padding)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition(String);

impl Condition {
    /// Wrap an encoded condition
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Get the encoded form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Structurally decode to the 32-byte digest
    pub fn decode(&self) -> Result<[u8; 32]> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.0)
            .map_err(|e| Error::InvalidFields(format!("condition is not valid base64url: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| Error::InvalidFields("condition digest must be 32 bytes".to_string()))
    }
}

/// Encoded fulfillment (base64url preimage, no padding)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment(String);

impl Fulfillment {
    /// Wrap an encoded fulfillment
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Get the encoded form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Structurally decode to the preimage bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        URL_SAFE_NO_PAD.decode(&self.0).map_err(|e| {
            Error::InvalidFields(format!("fulfillment is not valid base64url: {}", e))
        })
    }
}

/// A transfer submission
///
/// Presence of `execution_condition` selects the universal (two-phase,
/// escrowed) path; absence selects the optimistic (one-phase) path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Caller-supplied unique identifier, immutable once first accepted
    pub id: Uuid,

    /// Ledger/namespace the transfer belongs to
    pub ledger: String,

    /// Sending account
    pub from_account: Account,

    /// Receiving account
    pub to_account: Account,

    /// Decimal amount as a string, strictly positive
    pub amount: String,

    /// Opaque payload, not interpreted by the core
    #[serde(default)]
    pub data: Option<Vec<u8>>,

    /// Opaque sender-private payload
    #[serde(default)]
    pub note_to_self: Option<Vec<u8>>,

    /// Execution condition; presence selects the universal path
    #[serde(default)]
    pub execution_condition: Option<Condition>,

    /// Escrow deadline; mandatory when `execution_condition` is present
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// True when this transfer takes the universal (condition-gated) path
    pub fn is_universal(&self) -> bool {
        self.execution_condition.is_some()
    }

    /// Parse the amount string into an exact decimal
    pub fn parsed_amount(&self) -> Result<Decimal> {
        Decimal::from_str(&self.amount)
            .map_err(|e| Error::InvalidFields(format!("amount '{}': {}", self.amount, e)))
    }

    /// Validate required fields against the acceptance rules
    ///
    /// No side effects: a validation failure must leave no trace in the
    /// registry, so this runs before any insertion.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.ledger.is_empty() {
            return Err(Error::InvalidFields("ledger must not be empty".to_string()));
        }
        if self.from_account.is_empty() {
            return Err(Error::InvalidFields(
                "from_account must not be empty".to_string(),
            ));
        }
        if self.to_account.is_empty() {
            return Err(Error::InvalidFields(
                "to_account must not be empty".to_string(),
            ));
        }

        let amount = self.parsed_amount()?;
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidFields(format!(
                "amount must be strictly positive, got {}",
                self.amount
            )));
        }

        if let Some(condition) = &self.execution_condition {
            condition.decode()?;

            let expires_at = self.expires_at.ok_or_else(|| {
                Error::InvalidFields(
                    "expires_at is required when execution_condition is present".to_string(),
                )
            })?;
            if expires_at <= now {
                return Err(Error::InvalidFields(format!(
                    "expires_at {} must lie strictly in the future",
                    expires_at.to_rfc3339()
                )));
            }
        }

        Ok(())
    }

    /// Compare against a resubmission of the same id
    ///
    /// Optional fields absent on the resend are treated as unsupplied and
    /// ignored. Any supplied field that differs makes the resend a conflict.
    pub fn same_submission(&self, resend: &Transfer) -> bool {
        if self.id != resend.id
            || self.ledger != resend.ledger
            || self.from_account != resend.from_account
            || self.to_account != resend.to_account
            || self.amount != resend.amount
        {
            return false;
        }

        fn optional_matches<T: PartialEq>(stored: &Option<T>, resent: &Option<T>) -> bool {
            resent.is_none() || stored == resent
        }

        optional_matches(&self.data, &resend.data)
            && optional_matches(&self.note_to_self, &resend.note_to_self)
            && optional_matches(&self.execution_condition, &resend.execution_condition)
            && optional_matches(&self.expires_at, &resend.expires_at)
    }
}

/// Transfer state
///
/// Universal path: `Proposed → Prepared → {Fulfilled | Cancelled | Rejected}`.
/// Optimistic path: `Proposed → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// Submitted, not yet accepted
    Proposed,
    /// Escrowed awaiting fulfillment (universal path)
    Prepared,
    /// Condition satisfied, fulfillment stored (terminal)
    Fulfilled,
    /// Rejected by the receiver (terminal)
    Rejected,
    /// Expired unfulfilled (terminal)
    Cancelled,
    /// Optimistic transfer finished (terminal)
    Completed,
}

impl TransferState {
    /// Check if the state permits no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Fulfilled
                | TransferState::Rejected
                | TransferState::Cancelled
                | TransferState::Completed
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::Proposed => "proposed",
            TransferState::Prepared => "prepared",
            TransferState::Fulfilled => "fulfilled",
            TransferState::Rejected => "rejected",
            TransferState::Cancelled => "cancelled",
            TransferState::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

/// Orientation of a record relative to the local plugin instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// This plugin is the sender of record
    Outgoing,
    /// This plugin is the receiver of record
    Incoming,
}

/// Registry entry tracking a transfer's lifecycle on one side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    /// The accepted transfer, immutable
    pub transfer: Transfer,

    /// Current state
    pub state: TransferState,

    /// Orientation relative to the owning plugin
    pub direction: Direction,

    /// Set exactly once, on the transition to `Fulfilled`
    pub fulfillment: Option<Fulfillment>,

    /// Reason supplied by the receiver on rejection
    pub rejection_reason: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Create a record in its initial accepted state
    pub fn new(transfer: Transfer, direction: Direction, state: TransferState) -> Self {
        let now = Utc::now();
        Self {
            transfer,
            state,
            direction,
            fulfillment: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a state transition, bumping the update timestamp
    pub fn set_state(&mut self, state: TransferState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Invariant: fulfillment is stored iff the state is `Fulfilled`
    pub fn holds_fulfillment_invariant(&self) -> bool {
        self.fulfillment.is_some() == (self.state == TransferState::Fulfilled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sha2::{Digest, Sha256};

    fn encoded_condition(preimage: &[u8]) -> Condition {
        Condition::new(URL_SAFE_NO_PAD.encode(Sha256::digest(preimage)))
    }

    fn base_transfer() -> Transfer {
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
    fn test_optimistic_transfer_validates() {
        let transfer = base_transfer();
        assert!(transfer.validate(Utc::now()).is_ok());
        assert!(!transfer.is_universal());
    }

    #[test]
    fn test_amount_must_be_positive() {
        let mut transfer = base_transfer();

        transfer.amount = "0".to_string();
        assert!(matches!(
            transfer.validate(Utc::now()),
            Err(Error::InvalidFields(_))
        ));

        transfer.amount = "-3.50".to_string();
        assert!(matches!(
            transfer.validate(Utc::now()),
            Err(Error::InvalidFields(_))
        ));

        transfer.amount = "not-a-number".to_string();
        assert!(matches!(
            transfer.validate(Utc::now()),
            Err(Error::InvalidFields(_))
        ));
    }

    #[test]
    fn test_amount_string_preserved_verbatim() {
        let mut transfer = base_transfer();
        transfer.amount = "0.000000000000000001".to_string();
        assert!(transfer.validate(Utc::now()).is_ok());
        assert_eq!(transfer.amount, "0.000000000000000001");
    }

    #[test]
    fn test_condition_requires_future_expiry() {
        let now = Utc::now();
        let mut transfer = base_transfer();
        transfer.execution_condition = Some(encoded_condition(b"secret"));

        // No expiry at all
        assert!(matches!(
            transfer.validate(now),
            Err(Error::InvalidFields(_))
        ));

        // Expiry in the past
        transfer.expires_at = Some(now - Duration::seconds(1));
        assert!(matches!(
            transfer.validate(now),
            Err(Error::InvalidFields(_))
        ));

        // Expiry exactly now is not strictly in the future
        transfer.expires_at = Some(now);
        assert!(matches!(
            transfer.validate(now),
            Err(Error::InvalidFields(_))
        ));

        // Future expiry passes
        transfer.expires_at = Some(now + Duration::seconds(30));
        assert!(transfer.validate(now).is_ok());
        assert!(transfer.is_universal());
    }

    #[test]
    fn test_malformed_condition_rejected() {
        let now = Utc::now();
        let mut transfer = base_transfer();
        transfer.execution_condition = Some(Condition::new("!!!not-base64url!!!"));
        transfer.expires_at = Some(now + Duration::seconds(30));
        assert!(matches!(
            transfer.validate(now),
            Err(Error::InvalidFields(_))
        ));

        // Valid base64 but wrong digest length
        transfer.execution_condition = Some(Condition::new(URL_SAFE_NO_PAD.encode(b"short")));
        assert!(matches!(
            transfer.validate(now),
            Err(Error::InvalidFields(_))
        ));
    }

    #[test]
    fn test_same_submission_ignores_unsupplied_fields() {
        let mut stored = base_transfer();
        stored.data = Some(b"payload".to_vec());

        let mut resend = stored.clone();
        resend.data = None;
        assert!(stored.same_submission(&resend));

        resend.data = Some(b"different".to_vec());
        assert!(!stored.same_submission(&resend));
    }

    #[test]
    fn test_same_submission_detects_conflicts() {
        let stored = base_transfer();

        let mut resend = stored.clone();
        assert!(stored.same_submission(&resend));

        resend.amount = "2.0".to_string();
        assert!(!stored.same_submission(&resend));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransferState::Proposed.is_terminal());
        assert!(!TransferState::Prepared.is_terminal());
        assert!(TransferState::Fulfilled.is_terminal());
        assert!(TransferState::Rejected.is_terminal());
        assert!(TransferState::Cancelled.is_terminal());
        assert!(TransferState::Completed.is_terminal());
    }

    #[test]
    fn test_fulfillment_invariant() {
        let mut record = TransferRecord::new(
            base_transfer(),
            Direction::Outgoing,
            TransferState::Prepared,
        );
        assert!(record.holds_fulfillment_invariant());

        record.fulfillment = Some(Fulfillment::new(URL_SAFE_NO_PAD.encode(b"secret")));
        record.set_state(TransferState::Fulfilled);
        assert!(record.holds_fulfillment_invariant());
    }

    #[test]
    fn test_transfer_serde_roundtrip() {
        let mut transfer = base_transfer();
        transfer.execution_condition = Some(encoded_condition(b"secret"));
        transfer.expires_at = Some(Utc::now() + Duration::seconds(30));

        let json = serde_json::to_string(&transfer).unwrap();
        let back: Transfer = serde_json::from_str(&json).unwrap();
        assert_eq!(transfer, back);
    }
}
