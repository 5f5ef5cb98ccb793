//! Join-split (deposit, withdraw, send) block handling.

use num_bigint::BigInt;

use crate::decrypt::{NoteAlgorithms, TreeNote};
use crate::error::SyncError;
use crate::rollup::{Block, InnerProofData, ProofId};
use crate::wallet::traits::SyncDatabase;
use crate::wallet::{Note, UserJoinSplitTx, UserUtilTx};

use super::{UserState, destroyed_value, non_negative};

impl<D, A> UserState<D, A>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    pub(super) async fn handle_join_split_tx(
        &self,
        proof: &InnerProofData,
        candidate_1: Option<TreeNote>,
        candidate_2: Option<TreeNote>,
        note_start_index: u64,
        block: &Block,
    ) -> Result<(), SyncError<D::Error>> {
        let new_note = self
            .process_new_note(note_start_index, proof.note_commitment_1, candidate_1, false, false)
            .await?;
        let change_note = self
            .process_new_note(
                note_start_index + 1,
                proof.note_commitment_2,
                candidate_2,
                false,
                false,
            )
            .await?;
        if new_note.is_none() && change_note.is_none() {
            return Ok(());
        }

        let destroyed_1 = self.nullify_note(&proof.nullifier_1).await?;
        let destroyed_2 = self.nullify_note(&proof.nullifier_2).await?;
        self.refresh_note_pickers()
            .await
            .map_err(SyncError::DatabaseError)?;

        // a send whose both outputs are ours only stages value for a later
        // DeFi deposit; it gets a util record linked forward by its first
        // output's nullifier instead of a join-split record
        if proof.proof_id == ProofId::Send
            && let (Some(new_note), Some(change_note)) = (&new_note, &change_note)
        {
            self.add_recovered_util_tx(proof, new_note, change_note, &[destroyed_1, destroyed_2])
                .await?;
            return Ok(());
        }

        let mut db = self.db.write().await;
        match db
            .get_join_split_tx(&proof.tx_id, &self.user_id)
            .map_err(SyncError::DatabaseError)?
        {
            Some(tx) if tx.settled.is_none() => {
                db.settle_join_split_tx(&proof.tx_id, &self.user_id, block.created)
                    .map_err(SyncError::DatabaseError)?;
                tracing::debug!("settled join-split tx {}", proof.tx_id);
            }
            Some(_) => {}
            None => {
                let tx = recover_join_split_tx(
                    proof,
                    new_note.as_ref(),
                    change_note.as_ref(),
                    &[destroyed_1, destroyed_2],
                    block.created,
                );
                tracing::debug!("recovered join-split tx {}", proof.tx_id);
                db.add_join_split_tx(tx).map_err(SyncError::DatabaseError)?;
            }
        }

        Ok(())
    }

    async fn add_recovered_util_tx(
        &self,
        proof: &InnerProofData,
        new_note: &Note,
        change_note: &Note,
        destroyed: &[Option<Note>],
    ) -> Result<(), SyncError<D::Error>> {
        let forward_link = new_note.nullifier;

        let mut db = self.db.write().await;
        if db
            .get_util_tx_by_link(&forward_link)
            .map_err(SyncError::DatabaseError)?
            .is_some()
        {
            // already recorded at proof construction time
            return Ok(());
        }

        let tx_fee = non_negative(
            BigInt::from(destroyed_value(destroyed))
                - BigInt::from(new_note.value.clone())
                - BigInt::from(change_note.value.clone()),
        );
        tracing::debug!("recovered util tx {} linked to {}", proof.tx_id, forward_link);
        db.add_util_tx(UserUtilTx {
            tx_hash: proof.tx_id,
            user_id: self.user_id,
            asset_id: new_note.asset_id,
            tx_fee,
            forward_link,
        })
        .map_err(SyncError::DatabaseError)?;

        Ok(())
    }
}

/// Rebuilds a join-split record from its settled proof.
///
/// Values that depended on notes we never held recover to zero.
fn recover_join_split_tx(
    proof: &InnerProofData,
    new_note: Option<&Note>,
    change_note: Option<&Note>,
    destroyed: &[Option<Note>],
    settled: u64,
) -> UserJoinSplitTx {
    let public_value = proof.public_value();
    let public_input = if proof.proof_id == ProofId::Deposit {
        public_value.clone()
    } else {
        Default::default()
    };
    let public_output = if proof.proof_id == ProofId::Withdraw {
        public_value
    } else {
        Default::default()
    };
    let input_owner = (proof.proof_id == ProofId::Deposit)
        .then(|| proof.public_owner())
        .flatten();
    let output_owner = (proof.proof_id == ProofId::Withdraw)
        .then(|| proof.public_owner())
        .flatten();

    UserJoinSplitTx {
        tx_hash: proof.tx_id,
        user_id: new_note
            .or(change_note)
            .expect("at least one output note is ours")
            .owner,
        asset_id: proof.asset_id(),
        public_input,
        public_output,
        private_input: destroyed_value(destroyed),
        private_output_recipient: new_note.map(|note| note.value.clone()).unwrap_or_default(),
        private_output_sender: change_note.map(|note| note.value.clone()).unwrap_or_default(),
        input_owner,
        output_owner,
        owned_by_me: change_note.is_some(),
        created: settled,
        settled: Some(settled),
    }
}
