//! Persistent data model: the user record, notes, claims and transaction
//! records, plus the traits a database implements to back the sync engine.

use std::sync::Arc;
use std::sync::atomic::{self, AtomicU8};

use num_bigint::BigUint;

use crate::decrypt::TreeNote;
use crate::error::SyncModeError;
use crate::primitives::{
    AccountId, AliasHash, BridgeId, Commitment, EthAddress, Nullifier, PublicKey, SecretKey,
    TxHash,
};
use crate::rollup::InnerProofData;

pub mod traits;

/// Per-user synchronizer record.
#[derive(Debug, Clone)]
pub struct UserData {
    /// Account identity this record belongs to.
    pub id: AccountId,
    /// Account public key.
    pub public_key: PublicKey,
    /// Account private key, used for trial decryption and nullifier
    /// derivation.
    pub private_key: SecretKey,
    /// Account nonce.
    pub account_nonce: u32,
    /// Registered alias hash, if an account proof has been seen.
    pub alias_hash: Option<AliasHash>,
    /// Index of the highest rollup fully applied; -1 before first sync.
    pub synced_to_rollup: i64,
}

/// A UTXO-style value note owned by the user.
#[derive(Debug, Clone)]
pub struct Note {
    /// Asset the value is denominated in.
    pub asset_id: u32,
    /// Note value. Zero-valued notes are never persisted.
    pub value: BigUint,
    /// On-chain commitment, the storage key of the note.
    pub commitment: Commitment,
    /// Commitment preimage secret.
    pub secret: [u8; 32],
    /// Nullifier derived from the commitment and the owner's private key.
    pub nullifier: Nullifier,
    /// Set once the nullifier has appeared on-chain; the note is spent.
    pub nullified: bool,
    /// Owning account.
    pub owner: AccountId,
    /// Public key of the note creator, all-zero for protocol-authored notes.
    pub creator_pubkey: [u8; 32],
    /// Nullifier of the input note this note was minted against.
    pub input_nullifier: Nullifier,
    /// Data-tree index. Zero while the note is pending.
    pub index: u64,
    /// Whether a subsequent proof may chain from this note pre-settlement.
    pub allow_chain: bool,
    /// True until the note's commitment is observed in a block.
    pub pending: bool,
}

/// Pending DeFi interaction outcome, redeemable by a claim proof.
#[derive(Debug, Clone)]
pub struct Claim {
    /// DeFi deposit transaction the claim belongs to.
    pub tx_hash: TxHash,
    /// Partial-state secret for the output notes.
    pub secret: [u8; 32],
    /// Claim-note nullifier the redeeming proof will reveal.
    pub nullifier: Nullifier,
    /// Owning account.
    pub owner: AccountId,
}

/// Signing key registered by an account proof.
#[derive(Debug, Clone)]
pub struct SigningKeyRecord {
    /// Account the key spends for.
    pub account_id: AccountId,
    /// The spending key.
    pub key: [u8; 32],
    /// Data-tree index of the account note carrying the key.
    pub tree_index: u64,
}

/// A settled or pending join-split (deposit, withdraw or send).
#[derive(Debug, Clone)]
pub struct UserJoinSplitTx {
    /// Transaction id.
    pub tx_hash: TxHash,
    /// Account the record belongs to.
    pub user_id: AccountId,
    /// Asset moved.
    pub asset_id: u32,
    /// Public value entering the rollup (deposits).
    pub public_input: BigUint,
    /// Public value leaving the rollup (withdrawals).
    pub public_output: BigUint,
    /// Total value of the notes destroyed.
    pub private_input: BigUint,
    /// Value of the recipient output note.
    pub private_output_recipient: BigUint,
    /// Value of the change output note.
    pub private_output_sender: BigUint,
    /// L1 source of a deposit.
    pub input_owner: Option<EthAddress>,
    /// L1 destination of a withdrawal.
    pub output_owner: Option<EthAddress>,
    /// Whether this account authored the transaction.
    pub owned_by_me: bool,
    /// Creation timestamp (opaque).
    pub created: u64,
    /// Settlement timestamp, set exactly once.
    pub settled: Option<u64>,
}

/// A settled or pending account operation.
#[derive(Debug, Clone)]
pub struct UserAccountTx {
    /// Transaction id.
    pub tx_hash: TxHash,
    /// Account the record belongs to.
    pub user_id: AccountId,
    /// Alias hash the proof registers.
    pub alias_hash: AliasHash,
    /// First spending key added, if any.
    pub new_signing_key_1: Option<[u8; 32]>,
    /// Second spending key added, if any.
    pub new_signing_key_2: Option<[u8; 32]>,
    /// Whether the proof migrated the account to a new nonce.
    pub migrated: bool,
    /// Creation timestamp (opaque).
    pub created: u64,
    /// Settlement timestamp, set exactly once.
    pub settled: Option<u64>,
}

/// A settled or pending DeFi interaction.
#[derive(Debug, Clone)]
pub struct UserDefiTx {
    /// Transaction id.
    pub tx_hash: TxHash,
    /// Account the record belongs to.
    pub user_id: AccountId,
    /// Bridge the deposit feeds.
    pub bridge_id: BridgeId,
    /// Value handed to the bridge.
    pub deposit_value: BigUint,
    /// Secret for the claim's output notes.
    pub partial_state_secret: [u8; 32],
    /// Fee paid, including any linked util-tx fee.
    pub tx_fee: BigUint,
    /// Creation timestamp (opaque).
    pub created: u64,
    /// First-asset output owed to this deposit.
    pub output_value_a: BigUint,
    /// Second-asset output owed to this deposit.
    pub output_value_b: BigUint,
    /// Settlement timestamp, set when the claim materializes.
    pub settled: Option<u64>,
}

/// A join-split created solely to feed a DeFi deposit.
///
/// Has no settlement record of its own; it is linked forward to its consumer
/// by the nullifier of its first output note.
#[derive(Debug, Clone)]
pub struct UserUtilTx {
    /// Transaction id.
    pub tx_hash: TxHash,
    /// Account the record belongs to.
    pub user_id: AccountId,
    /// Asset the fee was paid in.
    pub asset_id: u32,
    /// Fee paid by this transaction, folded into the consumer's fee.
    pub tx_fee: BigUint,
    /// Nullifier of the first output note; matches the consumer proof's
    /// first nullifier.
    pub forward_link: Nullifier,
}

/// Kind-tagged transaction record carried by a locally constructed proof.
#[derive(Debug, Clone)]
pub enum UserTx {
    /// Join-split record.
    JoinSplit(UserJoinSplitTx),
    /// Account record.
    Account(UserAccountTx),
    /// DeFi deposit record.
    Defi(UserDefiTx),
}

/// A locally constructed proof handed to the pending-proof ingestor.
#[derive(Debug, Clone)]
pub struct ProofOutput {
    /// Transaction record to persist as pending.
    pub tx: UserTx,
    /// The inner proof as it will appear on-chain.
    pub proof_data: InnerProofData,
    /// Output notes decrypted trivially from local construction.
    pub output_notes: [Option<TreeNote>; 2],
    /// Proof this one chains from; persisted first.
    pub parent_proof: Option<Box<ProofOutput>>,
    /// Nullifier of the pending note this proof chains from. Informational.
    pub backward_link: Option<Nullifier>,
    /// Which output notes later proofs may chain from: 0 none, 1 first,
    /// 2 second, 3 both.
    pub allow_chain: u8,
}

impl ProofOutput {
    /// Whether chaining from the first output note is permitted.
    #[must_use]
    pub fn allow_chain_from_note_1(&self) -> bool {
        self.allow_chain == 1 || self.allow_chain == 3
    }

    /// Whether chaining from the second output note is permitted.
    #[must_use]
    pub fn allow_chain_from_note_2(&self) -> bool {
        self.allow_chain == 2 || self.allow_chain == 3
    }
}

/// Synchronizer lifecycle state.
///
/// Strict transitions: `Off -> Synching -> Monitoring -> Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No processing.
    Off = 0,
    /// Historical catch-up in progress.
    Synching = 1,
    /// Live; blocks arrive via the queue.
    Monitoring = 2,
}

impl SyncState {
    /// Reads the state out of its shared atomic representation.
    pub fn from_atomic_u8(state: &Arc<AtomicU8>) -> Result<Self, SyncModeError> {
        match state.load(atomic::Ordering::Acquire) {
            0 => Ok(Self::Off),
            1 => Ok(Self::Synching),
            2 => Ok(Self::Monitoring),
            invalid => Err(SyncModeError::InvalidSyncState(invalid)),
        }
    }

    /// Stores the state into its shared atomic representation.
    pub fn store(self, state: &Arc<AtomicU8>) {
        state.store(self as u8, atomic::Ordering::Release);
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Synching => write!(f, "synching"),
            Self::Monitoring => write!(f, "monitoring"),
        }
    }
}
