//! Crypto-condition verification
//!
//! The verifier is a pluggable capability behind [`ConditionVerifier`]; the
//! state machine never assumes a particular condition algebra. The default
//! scheme is SHA-256 preimage: the condition is the base64url digest, the
//! fulfillment is the base64url preimage.

use sha2::{Digest, Sha256};

use crate::types::{Condition, Fulfillment};

/// Result of checking a fulfillment against a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Fulfillment cryptographically satisfies the condition
    Match,
    /// Both parse, but the fulfillment does not satisfy the condition
    Mismatch,
    /// Either side fails structural parsing
    Malformed,
}

/// Pluggable condition verification capability
///
/// Implementations must be pure: verification is side-effect-free and
/// safely re-playable for idempotency checks.
pub trait ConditionVerifier: Send + Sync {
    /// Decide whether `fulfillment` satisfies `condition`
    fn verify(&self, condition: &Condition, fulfillment: &Fulfillment) -> Verification;
}

/// SHA-256 preimage scheme
#[derive(Debug, Clone, Copy, Default)]
pub struct PreimageSha256;

impl PreimageSha256 {
    /// Derive the condition for a preimage
    pub fn condition_for(preimage: &[u8]) -> Condition {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        Condition::new(URL_SAFE_NO_PAD.encode(Sha256::digest(preimage)))
    }

    /// Encode a preimage as its fulfillment
    pub fn fulfillment_for(preimage: &[u8]) -> Fulfillment {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        Fulfillment::new(URL_SAFE_NO_PAD.encode(preimage))
    }
}

impl ConditionVerifier for PreimageSha256 {
    fn verify(&self, condition: &Condition, fulfillment: &Fulfillment) -> Verification {
        let digest = match condition.decode() {
            Ok(digest) => digest,
            Err(_) => return Verification::Malformed,
        };
        let preimage = match fulfillment.decode() {
            Ok(preimage) => preimage,
            Err(_) => return Verification::Malformed,
        };

        if Sha256::digest(&preimage).as_slice() == digest {
            Verification::Match
        } else {
            Verification::Mismatch
        }
    }
}
