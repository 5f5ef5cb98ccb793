//! Pending-proof ingestion and startup reconciliation.

use std::collections::HashSet;

use num_bigint::BigInt;
use num_traits::Zero;

use crate::client;
use crate::decrypt::NoteAlgorithms;
use crate::error::SyncError;
use crate::primitives::{Commitment, TxHash};
use crate::rollup::ProofId;
use crate::wallet::traits::SyncDatabase;
use crate::wallet::{ProofOutput, UserTx, UserUtilTx};

use super::{UserState, UserStateEvent, non_negative};

impl<D, A> UserState<D, A>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    /// Ingests a locally constructed proof: persists its transaction record
    /// and its output notes as pending, ancestors before descendants.
    ///
    /// Settlement later upgrades the pending notes in place (commitment
    /// keyed) and stamps the record's settled time.
    pub async fn add_proof(&self, proof: &ProofOutput) -> Result<(), SyncError<D::Error>> {
        let mut chain = Vec::new();
        let mut current = Some(proof);
        while let Some(proof) = current {
            chain.push(proof);
            current = proof.parent_proof.as_deref();
        }

        let mut notes_added = 0;
        for proof in chain.into_iter().rev() {
            notes_added += self.add_pending_proof(proof).await?;
        }

        if notes_added > 0 {
            self.refresh_note_pickers()
                .await
                .map_err(SyncError::DatabaseError)?;
            self.emit(UserStateEvent::UpdatedUserState {
                user_id: self.user_id,
                update: None,
            });
        }

        Ok(())
    }

    async fn add_pending_proof(&self, proof: &ProofOutput) -> Result<usize, SyncError<D::Error>> {
        if let Some(backward_link) = proof.backward_link {
            tracing::debug!("proof {} chains from {}", proof.proof_data.tx_id, backward_link);
        }

        match &proof.tx {
            UserTx::JoinSplit(tx) => {
                // a send paying our own account is the staging half of a DeFi
                // deposit; record it as a util tx linked forward by the
                // nullifier its first output will reveal
                let send_to_self = proof.proof_data.proof_id == ProofId::Send
                    && proof.output_notes[0]
                        .as_ref()
                        .is_some_and(|note| note.owner == self.user_id);
                if send_to_self {
                    let private_key = self.user.read().await.private_key.clone();
                    let forward_link = self
                        .note_algorithms
                        .value_note_nullifier(&proof.proof_data.note_commitment_1, &private_key);
                    let tx_fee = non_negative(
                        BigInt::from(tx.private_input.clone())
                            - BigInt::from(tx.private_output_recipient.clone())
                            - BigInt::from(tx.private_output_sender.clone()),
                    );
                    tracing::debug!(
                        "added pending util tx {} linked to {}",
                        tx.tx_hash,
                        forward_link
                    );
                    self.db
                        .write()
                        .await
                        .add_util_tx(UserUtilTx {
                            tx_hash: tx.tx_hash,
                            user_id: self.user_id,
                            asset_id: tx.asset_id,
                            tx_fee,
                            forward_link,
                        })
                        .map_err(SyncError::DatabaseError)?;
                } else {
                    self.db
                        .write()
                        .await
                        .add_join_split_tx(tx.clone())
                        .map_err(SyncError::DatabaseError)?;
                }
            }
            UserTx::Account(tx) => {
                self.db
                    .write()
                    .await
                    .add_account_tx(tx.clone())
                    .map_err(SyncError::DatabaseError)?;
            }
            UserTx::Defi(tx) => {
                self.db
                    .write()
                    .await
                    .add_defi_tx(tx.clone())
                    .map_err(SyncError::DatabaseError)?;
            }
        }

        // pending notes have no tree position yet
        let commitments = [
            proof.proof_data.note_commitment_1,
            proof.proof_data.note_commitment_2,
        ];
        let allow_chain = [
            proof.allow_chain_from_note_1(),
            proof.allow_chain_from_note_2(),
        ];
        let mut notes_added = 0;
        for ((candidate, commitment), allow_chain) in
            proof.output_notes.iter().zip(commitments).zip(allow_chain)
        {
            if let Some(note) = self
                .process_new_note(0, commitment, candidate.clone(), allow_chain, true)
                .await?
                && !note.value.is_zero()
            {
                notes_added += 1;
            }
        }

        Ok(notes_added)
    }

    /// Drops local pending state the provider no longer knows about.
    ///
    /// Pending records from prior sessions may have been abandoned or timed
    /// out; the provider's pending set is authoritative.
    pub(super) async fn reset_data(&self) -> Result<(), SyncError<D::Error>> {
        let pending_txs = client::get_pending_txs(self.fetch_request_sender.clone()).await?;
        let pending_tx_ids: HashSet<TxHash> = pending_txs.iter().map(|tx| tx.tx_id).collect();
        let pending_commitments: HashSet<Commitment> = pending_txs
            .iter()
            .flat_map(|tx| [tx.note_commitment_1, tx.note_commitment_2])
            .collect();

        let mut db = self.db.write().await;
        for tx_hash in db
            .get_unsettled_user_txs(&self.user_id)
            .map_err(SyncError::DatabaseError)?
        {
            if !pending_tx_ids.contains(&tx_hash) {
                tracing::debug!("dropping abandoned tx {}", tx_hash);
                db.remove_user_tx(&tx_hash, &self.user_id)
                    .map_err(SyncError::DatabaseError)?;
            }
        }

        for note in db
            .get_user_pending_notes(&self.user_id)
            .map_err(SyncError::DatabaseError)?
        {
            if !pending_commitments.contains(&note.commitment) {
                tracing::debug!("dropping orphaned pending note {}", note.commitment);
                db.remove_note(&note.nullifier)
                    .map_err(SyncError::DatabaseError)?;
            }
        }

        Ok(())
    }
}
