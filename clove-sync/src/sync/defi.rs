//! DeFi deposit and claim block handling.

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;

use crate::decrypt::{NoteAlgorithms, TreeNote};
use crate::error::SyncError;
use crate::primitives::Nullifier;
use crate::rollup::offchain::OffchainDefiDepositData;
use crate::rollup::{Block, InnerProofData};
use crate::wallet::traits::SyncDatabase;
use crate::wallet::{Claim, Note, UserDefiTx};

use super::{UserState, destroyed_value, non_negative};

impl<D, A> UserState<D, A>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    pub(super) async fn handle_defi_deposit_tx(
        &self,
        proof: &InnerProofData,
        offchain: &OffchainDefiDepositData,
        candidate: Option<TreeNote>,
        rollup_id: u32,
        note_start_index: u64,
        block: &Block,
    ) -> Result<(), SyncError<D::Error>> {
        // both outputs of a DeFi deposit belong to the depositor, so a change
        // note that does not decrypt means the deposit is not ours
        let Some(change_note) = self
            .process_new_note(
                note_start_index + 1,
                proof.note_commitment_2,
                candidate,
                false,
                false,
            )
            .await?
        else {
            return Ok(());
        };

        let private_key = self.user.read().await.private_key.clone();
        let partial_state_secret = self
            .note_algorithms
            .derive_note_secret(&offchain.partial_state_secret_eph_pub_key, &private_key);

        let interaction = block
            .interaction_result
            .iter()
            .find(|interaction| interaction.bridge_id == offchain.bridge_id)
            .ok_or(SyncError::MissingInteractionResult {
                bridge_id: offchain.bridge_id,
                rollup_id,
            })?;
        let (output_value_a, output_value_b) = if interaction.result {
            if interaction.total_input_value.is_zero() {
                tracing::warn!(
                    "interaction for {} settled with zero total input",
                    offchain.bridge_id
                );
                (BigUint::ZERO, BigUint::ZERO)
            } else {
                // deposit_value / total_input_value is exact by protocol
                (
                    &interaction.total_output_value_a * &offchain.deposit_value
                        / &interaction.total_input_value,
                    &interaction.total_output_value_b * &offchain.deposit_value
                        / &interaction.total_input_value,
                )
            }
        } else {
            (BigUint::ZERO, BigUint::ZERO)
        };

        let claim_nullifier = self
            .note_algorithms
            .claim_note_nullifier(&proof.note_commitment_1);
        self.db
            .write()
            .await
            .add_claim(Claim {
                tx_hash: proof.tx_id,
                secret: partial_state_secret,
                nullifier: claim_nullifier,
                owner: self.user_id,
            })
            .map_err(SyncError::DatabaseError)?;
        tracing::debug!("registered claim {} for tx {}", claim_nullifier, proof.tx_id);

        let destroyed_1 = self.nullify_note(&proof.nullifier_1).await?;
        let destroyed_2 = self.nullify_note(&proof.nullifier_2).await?;
        self.refresh_note_pickers()
            .await
            .map_err(SyncError::DatabaseError)?;

        let mut db = self.db.write().await;
        match db
            .get_defi_tx(&proof.tx_id)
            .map_err(SyncError::DatabaseError)?
        {
            Some(_) => {
                db.update_defi_tx(&proof.tx_id, output_value_a, output_value_b)
                    .map_err(SyncError::DatabaseError)?;
                tracing::debug!("updated defi tx {} with interaction outputs", proof.tx_id);
            }
            None => {
                // fold in the fee of the join-split staged for this deposit
                let util_fee = db
                    .get_util_tx_by_link(&proof.nullifier_1)
                    .map_err(SyncError::DatabaseError)?
                    .map(|tx| tx.tx_fee)
                    .unwrap_or_default();
                let tx_fee = non_negative(
                    BigInt::from(destroyed_value(&[destroyed_1, destroyed_2]))
                        - BigInt::from(change_note.value.clone())
                        - BigInt::from(offchain.deposit_value.clone())
                        + BigInt::from(util_fee),
                );
                tracing::debug!("recovered defi tx {}", proof.tx_id);
                db.add_defi_tx(UserDefiTx {
                    tx_hash: proof.tx_id,
                    user_id: self.user_id,
                    bridge_id: offchain.bridge_id,
                    deposit_value: offchain.deposit_value.clone(),
                    partial_state_secret,
                    tx_fee,
                    created: block.created,
                    output_value_a,
                    output_value_b,
                    settled: None,
                })
                .map_err(SyncError::DatabaseError)?;
            }
        }

        Ok(())
    }

    pub(super) async fn handle_defi_claim_tx(
        &self,
        proof: &InnerProofData,
        note_start_index: u64,
        block: &Block,
    ) -> Result<(), SyncError<D::Error>> {
        let claim = self
            .db
            .read()
            .await
            .get_claim(&proof.nullifier_1)
            .map_err(SyncError::DatabaseError)?;
        let Some(claim) = claim else {
            return Ok(());
        };
        if claim.owner != self.user_id {
            return Ok(());
        }

        let defi_tx = self
            .db
            .read()
            .await
            .get_defi_tx(&claim.tx_hash)
            .map_err(SyncError::DatabaseError)?
            .ok_or(SyncError::MissingDefiTx {
                nullifier: proof.nullifier_1,
                tx_hash: claim.tx_hash,
            })?;
        let bridge_id = defi_tx.bridge_id;

        // exactly one of these branches runs: a failed interaction refunds
        // the deposit, a successful one pays out on the bridge's output
        // asset(s)
        if defi_tx.output_value_a.is_zero() && defi_tx.output_value_b.is_zero() {
            self.add_claim_output_note(
                note_start_index,
                bridge_id.input_asset_id(),
                defi_tx.deposit_value.clone(),
                &claim,
                proof.nullifier_1,
            )
            .await?;
        } else {
            if !defi_tx.output_value_a.is_zero() {
                self.add_claim_output_note(
                    note_start_index,
                    bridge_id.output_asset_id_a(),
                    defi_tx.output_value_a.clone(),
                    &claim,
                    proof.nullifier_1,
                )
                .await?;
            }
            if !defi_tx.output_value_b.is_zero() {
                self.add_claim_output_note(
                    note_start_index + 1,
                    bridge_id.output_asset_id_b(),
                    defi_tx.output_value_b.clone(),
                    &claim,
                    proof.nullifier_2,
                )
                .await?;
            }
        }

        self.refresh_note_pickers()
            .await
            .map_err(SyncError::DatabaseError)?;

        let mut db = self.db.write().await;
        if defi_tx.settled.is_none() {
            db.settle_defi_tx(&claim.tx_hash, block.created)
                .map_err(SyncError::DatabaseError)?;
            tracing::debug!("settled defi tx {}", claim.tx_hash);
        }

        Ok(())
    }

    /// Materializes one claim output note.
    ///
    /// Claim notes are authored by the protocol on the user's behalf, so the
    /// creator key is all zero and the commitment is recomputed locally.
    async fn add_claim_output_note(
        &self,
        index: u64,
        asset_id: u32,
        value: BigUint,
        claim: &Claim,
        input_nullifier: Nullifier,
    ) -> Result<Option<Note>, SyncError<D::Error>> {
        let tree_note = TreeNote {
            value,
            asset_id,
            owner: self.user_id,
            secret: claim.secret,
            creator_pubkey: [0u8; 32],
            input_nullifier,
        };
        let commitment = self.note_algorithms.value_note_commitment(&tree_note);

        self.process_new_note(index, commitment, Some(tree_note), false, false)
            .await
    }
}
