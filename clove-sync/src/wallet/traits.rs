//! Traits for interfacing a database with the sync engine.

use num_bigint::BigUint;

use crate::primitives::{AccountId, Nullifier, TxHash};
use crate::wallet::{
    Claim, Note, SigningKeyRecord, UserAccountTx, UserData, UserDefiTx, UserJoinSplitTx,
    UserUtilTx,
};

/// Convenience bound for a database implementing the full trait family.
pub trait SyncDatabase:
    SyncWallet + SyncNotes + SyncClaims + SyncTransactions + Send + Sync + 'static
{
}

impl<T> SyncDatabase for T where
    T: SyncWallet + SyncNotes + SyncClaims + SyncTransactions + Send + Sync + 'static
{
}

/// Base trait for interfacing user records with the sync engine.
pub trait SyncWallet {
    /// Errors associated with interfacing the sync engine with stored data.
    type Error: std::fmt::Debug + std::fmt::Display + std::error::Error + Send + Sync + 'static;

    /// Returns the stored user record for `account_id`, if one exists.
    fn get_user(&self, account_id: &AccountId) -> Result<Option<UserData>, Self::Error>;

    /// Replaces the stored user record.
    fn update_user(&mut self, user: &UserData) -> Result<(), Self::Error>;

    /// Adds a signing key registered by an account proof.
    fn add_signing_key(&mut self, signing_key: SigningKeyRecord) -> Result<(), Self::Error>;
}

/// Trait for interfacing [`Note`]s with stored data.
pub trait SyncNotes: SyncWallet {
    /// Upserts a note keyed by commitment.
    ///
    /// Re-adding a pending note's commitment with confirmed data is what
    /// upgrades it.
    fn add_note(&mut self, note: Note) -> Result<(), Self::Error>;

    /// Marks the note with the given nullifier as spent. No-op if unknown.
    fn nullify_note(&mut self, nullifier: &Nullifier) -> Result<(), Self::Error>;

    /// Removes the note with the given nullifier. No-op if unknown.
    fn remove_note(&mut self, nullifier: &Nullifier) -> Result<(), Self::Error>;

    /// Looks a note up by its nullifier.
    fn get_note_by_nullifier(&self, nullifier: &Nullifier) -> Result<Option<Note>, Self::Error>;

    /// Returns the user's confirmed, unspent notes.
    fn get_user_notes(&self, account_id: &AccountId) -> Result<Vec<Note>, Self::Error>;

    /// Returns the user's pending notes.
    fn get_user_pending_notes(&self, account_id: &AccountId) -> Result<Vec<Note>, Self::Error>;
}

/// Trait for interfacing [`Claim`]s with stored data.
pub trait SyncClaims: SyncWallet {
    /// Stores a claim keyed by its nullifier.
    fn add_claim(&mut self, claim: Claim) -> Result<(), Self::Error>;

    /// Looks a claim up by the nullifier its redeeming proof reveals.
    fn get_claim(&self, nullifier: &Nullifier) -> Result<Option<Claim>, Self::Error>;
}

/// Trait for interfacing transaction records with stored data.
///
/// `settle_*` operations set the settlement timestamp; callers only invoke
/// them on records that are still unsettled, preserving the set-exactly-once
/// invariant.
pub trait SyncTransactions: SyncWallet {
    /// Inserts a join-split record.
    fn add_join_split_tx(&mut self, tx: UserJoinSplitTx) -> Result<(), Self::Error>;

    /// Looks up a join-split record.
    fn get_join_split_tx(
        &self,
        tx_hash: &TxHash,
        account_id: &AccountId,
    ) -> Result<Option<UserJoinSplitTx>, Self::Error>;

    /// Settles a join-split record.
    fn settle_join_split_tx(
        &mut self,
        tx_hash: &TxHash,
        account_id: &AccountId,
        settled: u64,
    ) -> Result<(), Self::Error>;

    /// Inserts an account record.
    fn add_account_tx(&mut self, tx: UserAccountTx) -> Result<(), Self::Error>;

    /// Looks up an account record.
    fn get_account_tx(&self, tx_hash: &TxHash) -> Result<Option<UserAccountTx>, Self::Error>;

    /// Settles an account record.
    fn settle_account_tx(&mut self, tx_hash: &TxHash, settled: u64) -> Result<(), Self::Error>;

    /// Inserts a DeFi record.
    fn add_defi_tx(&mut self, tx: UserDefiTx) -> Result<(), Self::Error>;

    /// Looks up a DeFi record.
    fn get_defi_tx(&self, tx_hash: &TxHash) -> Result<Option<UserDefiTx>, Self::Error>;

    /// Records the output values owed to a DeFi deposit once its
    /// interaction result is known.
    fn update_defi_tx(
        &mut self,
        tx_hash: &TxHash,
        output_value_a: BigUint,
        output_value_b: BigUint,
    ) -> Result<(), Self::Error>;

    /// Settles a DeFi record.
    fn settle_defi_tx(&mut self, tx_hash: &TxHash, settled: u64) -> Result<(), Self::Error>;

    /// Inserts a util record.
    fn add_util_tx(&mut self, tx: UserUtilTx) -> Result<(), Self::Error>;

    /// Looks up a util record by its forward link.
    fn get_util_tx_by_link(
        &self,
        forward_link: &Nullifier,
    ) -> Result<Option<UserUtilTx>, Self::Error>;

    /// Returns the tx hashes of the user's unsettled transactions.
    fn get_unsettled_user_txs(&self, account_id: &AccountId) -> Result<Vec<TxHash>, Self::Error>;

    /// Removes a transaction record of any kind.
    fn remove_user_tx(
        &mut self,
        tx_hash: &TxHash,
        account_id: &AccountId,
    ) -> Result<(), Self::Error>;
}
