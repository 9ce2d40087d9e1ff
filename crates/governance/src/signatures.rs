//! Signed vote payloads
//!
//! A relayer may submit votes on behalf of voters. Each payload is signed by
//! the voter's ed25519 key and carries a nonce so the same signature cannot
//! be replayed.

use crate::errors::{GovernanceError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use yieldsplit_types::{CycleNumber, Identity};

/// Domain tag prepended to every signed message
const VOTE_DOMAIN: &[u8] = b"yieldsplit/vote/v1";

/// What a voter signs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    /// Claimed voter (ed25519 public key bytes)
    pub voter: Identity,
    /// Cycle the vote is meant for
    pub cycle: CycleNumber,
    /// Per-voter replay nonce
    pub nonce: u64,
    /// Points per recipient slot
    pub points: Vec<u32>,
}

impl VotePayload {
    /// Canonical byte encoding covered by the signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(VOTE_DOMAIN.len() + 56 + self.points.len() * 4);
        message.extend_from_slice(VOTE_DOMAIN);
        message.extend_from_slice(&self.voter);
        message.extend_from_slice(&self.cycle.to_be_bytes());
        message.extend_from_slice(&self.nonce.to_be_bytes());
        message.extend_from_slice(&(self.points.len() as u64).to_be_bytes());
        for point in &self.points {
            message.extend_from_slice(&point.to_be_bytes());
        }
        message
    }
}

/// Payload plus the voter's signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedVote {
    pub payload: VotePayload,
    #[serde(with = "serde_bytes")]
    pub signature: [u8; 64],
}

impl SignedVote {
    /// Sign `payload` with `key`. The payload's voter is overwritten with the
    /// key's public bytes.
    pub fn sign(key: &SigningKey, mut payload: VotePayload) -> Self {
        payload.voter = key.verifying_key().to_bytes();
        let signature = key.sign(&payload.signing_bytes());
        Self {
            payload,
            signature: signature.to_bytes(),
        }
    }
}

/// Authenticates a vote payload and returns the voter it proves
pub trait SignatureOracle: Send + Sync {
    fn recover_voter(&self, payload: &VotePayload, signature: &[u8; 64]) -> Result<Identity>;
}

/// Oracle for voters whose identity is their ed25519 public key
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519SignatureOracle;

impl SignatureOracle for Ed25519SignatureOracle {
    fn recover_voter(&self, payload: &VotePayload, signature: &[u8; 64]) -> Result<Identity> {
        let verifying_key = VerifyingKey::from_bytes(&payload.voter)
            .map_err(|e| GovernanceError::InvalidSignature(format!("bad voter key: {e}")))?;
        let signature = Signature::from_bytes(signature);
        verifying_key
            .verify(&payload.signing_bytes(), &signature)
            .map_err(|e| GovernanceError::InvalidSignature(e.to_string()))?;
        Ok(payload.voter)
    }
}
