//! Sync engine error module.

use crate::primitives::{AccountId, BridgeId, Nullifier, TxHash};

/// Top level error enumerating any error that may occur during sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError<E>
where
    E: std::fmt::Debug + std::fmt::Display,
{
    /// Provider error.
    #[error("provider error. {0}")]
    ProviderError(#[from] ProviderError),
    /// Proof decode error.
    #[error("proof error. {0}")]
    ProofError(#[from] ProofError),
    /// Sync mode error.
    #[error("sync mode error. {0}")]
    SyncModeError(#[from] SyncModeError),
    /// No user record for the requested account.
    #[error("unknown user {0}")]
    UnknownUser(AccountId),
    /// A settled DeFi deposit has no matching entry in the block's
    /// interaction results. Protocol violation; halting beats divergence.
    #[error("no interaction result for {bridge_id} in rollup {rollup_id}")]
    MissingInteractionResult {
        /// Bridge of the deposit proof.
        bridge_id: BridgeId,
        /// Rollup being processed.
        rollup_id: u32,
    },
    /// A claim resolved to a DeFi tx that is not in storage.
    #[error("claim {nullifier} references missing defi tx {tx_hash}")]
    MissingDefiTx {
        /// Nullifier the claim was registered under.
        nullifier: Nullifier,
        /// The absent transaction record.
        tx_hash: TxHash,
    },
    /// Database error.
    #[error("database error. {0}")]
    DatabaseError(E),
}

/// Provider errors.
///
/// Errors associated with reaching the rollup provider and receiving invalid
/// data from it.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Provider request failed.
    #[error("provider request failed. {0}")]
    RequestFailed(String),
    /// Fetch task was dropped.
    #[error("fetch task was dropped.")]
    FetcherDropped,
}

/// Wire decode errors for rollup blocks and off-chain payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    /// Rollup proof data shorter than its header.
    #[error("rollup proof data truncated. expected at least {expected} bytes, found {found}")]
    TruncatedRollup {
        /// Minimum byte length implied by the header.
        expected: usize,
        /// Actual byte length.
        found: usize,
    },
    /// Inner proof slice of the wrong length.
    #[error("inner proof truncated. expected {expected} bytes, found {found}")]
    TruncatedInnerProof {
        /// Required byte length.
        expected: usize,
        /// Actual byte length.
        found: usize,
    },
    /// Unrecognised proof id discriminant.
    #[error("unknown proof id {0}")]
    UnknownProofId(u32),
    /// Off-chain payload of the wrong length for its proof kind.
    #[error("invalid off-chain data for {kind} proof. expected {expected} bytes, found {found}")]
    InvalidOffchainData {
        /// Proof kind the payload belongs to.
        kind: &'static str,
        /// Required byte length.
        expected: usize,
        /// Actual byte length.
        found: usize,
    },
    /// Block supplied fewer off-chain payloads than inner proofs.
    #[error("missing off-chain data for inner proof {proof_index} of rollup {rollup_id}")]
    MissingOffchainData {
        /// Rollup being processed.
        rollup_id: u32,
        /// Index of the inner proof within the rollup.
        proof_index: usize,
    },
}

/// Sync mode error.
#[derive(Debug, thiserror::Error)]
pub enum SyncModeError {
    /// Invalid sync state discriminant.
    #[error("invalid sync state. {0}")]
    InvalidSyncState(u8),
}
