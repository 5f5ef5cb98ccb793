//! Account proof block handling.

use crate::decrypt::NoteAlgorithms;
use crate::error::SyncError;
use crate::primitives::AccountId;
use crate::rollup::offchain::OffchainAccountData;
use crate::rollup::{Block, InnerProofData};
use crate::wallet::traits::SyncDatabase;
use crate::wallet::{SigningKeyRecord, UserAccountTx};

use super::UserState;

impl<D, A> UserState<D, A>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    pub(super) async fn handle_account_tx(
        &self,
        proof: &InnerProofData,
        offchain: &OffchainAccountData,
        note_start_index: u64,
        block: &Block,
    ) -> Result<(), SyncError<D::Error>> {
        let tx_user_id =
            AccountId::new(offchain.account_public_key, offchain.account_nonce);
        if tx_user_id != self.user_id {
            return Ok(());
        }

        // alias persists with the once-per-batch user write
        {
            let mut user = self.user.write().await;
            if user.alias_hash != Some(offchain.alias_hash) {
                tracing::debug!(
                    "updating alias hash of user {} to {}",
                    self.user_id,
                    offchain.alias_hash
                );
                user.alias_hash = Some(offchain.alias_hash);
            }
        }

        let mut db = self.db.write().await;
        // account notes sit in the data tree in pairs, one per key
        for (offset, key) in [offchain.spending_key_1, offchain.spending_key_2]
            .into_iter()
            .enumerate()
        {
            if key != [0u8; 32] {
                db.add_signing_key(SigningKeyRecord {
                    account_id: self.user_id,
                    key,
                    tree_index: note_start_index + offset as u64,
                })
                .map_err(SyncError::DatabaseError)?;
            }
        }

        match db
            .get_account_tx(&proof.tx_id)
            .map_err(SyncError::DatabaseError)?
        {
            Some(tx) if tx.settled.is_none() => {
                db.settle_account_tx(&proof.tx_id, block.created)
                    .map_err(SyncError::DatabaseError)?;
                tracing::debug!("settled account tx {}", proof.tx_id);
            }
            Some(_) => {}
            None => {
                let nonzero = |key: [u8; 32]| (key != [0u8; 32]).then_some(key);
                tracing::debug!("recovered account tx {}", proof.tx_id);
                db.add_account_tx(UserAccountTx {
                    tx_hash: proof.tx_id,
                    user_id: self.user_id,
                    alias_hash: offchain.alias_hash,
                    new_signing_key_1: nonzero(offchain.spending_key_1),
                    new_signing_key_2: nonzero(offchain.spending_key_2),
                    migrated: !proof.nullifier_1.is_zero(),
                    created: block.created,
                    settled: Some(block.created),
                })
                .map_err(SyncError::DatabaseError)?;
            }
        }

        Ok(())
    }
}
