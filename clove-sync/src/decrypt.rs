//! Batched trial decryption of viewing keys and recovery of owned notes.
//!
//! Viewing keys are gathered across an entire block batch and decrypted in a
//! single call so the curve setup cost is paid once; each surviving candidate
//! is then verified cheaply against its on-chain commitment.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::primitives::{AccountId, Commitment, Nullifier, PublicKey, SecretKey};
use crate::rollup::offchain::ViewingKey;

/// Cryptographic primitives the sync engine depends on.
///
/// Implementations wrap the curve and hash backends; the engine itself never
/// touches key material beyond passing it through.
pub trait NoteAlgorithms: Send + Sync + 'static {
    /// Commitment of a value note.
    fn value_note_commitment(&self, note: &TreeNote) -> Commitment;

    /// Nullifier of a value note, bound to its owner's private key.
    fn value_note_nullifier(&self, commitment: &Commitment, private_key: &SecretKey) -> Nullifier;

    /// Nullifier of a claim note. Not key-bound; claims are redeemed by the
    /// protocol on the owner's behalf.
    fn claim_note_nullifier(&self, commitment: &Commitment) -> Nullifier;

    /// Shared secret between an ephemeral public key and the user's private
    /// key, used as the partial-state secret of a DeFi deposit.
    fn derive_note_secret(&self, eph_pub_key: &PublicKey, private_key: &SecretKey) -> [u8; 32];

    /// Trial-decrypts a concatenation of viewing keys against `private_key`.
    ///
    /// The result is aligned with the input: entry `i` is `Some` when the
    /// `i`-th viewing key decrypted under this key. Candidates are unverified;
    /// callers must check the recomputed commitment before trusting one.
    fn batch_decrypt_note_payloads(
        &self,
        viewing_keys: &[u8],
        private_key: &SecretKey,
    ) -> Vec<Option<DecryptedNotePayload>>;
}

/// Plaintext of one successfully decrypted viewing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedNotePayload {
    /// Note value.
    pub value: BigUint,
    /// Asset the value is denominated in.
    pub asset_id: u32,
    /// Account nonce of the intended owner.
    pub account_nonce: u32,
    /// Public key of the note creator.
    pub creator_pubkey: [u8; 32],
    /// Commitment preimage secret.
    pub secret: [u8; 32],
}

/// A fully recovered note as it sits in the data tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNote {
    /// Note value.
    pub value: BigUint,
    /// Asset the value is denominated in.
    pub asset_id: u32,
    /// Owning account.
    pub owner: AccountId,
    /// Commitment preimage secret.
    pub secret: [u8; 32],
    /// Public key of the note creator, all-zero for protocol-authored notes.
    pub creator_pubkey: [u8; 32],
    /// Nullifier of the input note this note was minted against.
    pub input_nullifier: Nullifier,
}

/// Accumulates the viewing keys of one `handle_blocks` call for a single
/// batched trial decryption.
#[derive(Debug, Default)]
pub(crate) struct DecryptBatch {
    viewing_keys: Vec<u8>,
    entries: Vec<BatchEntry>,
}

#[derive(Debug)]
struct BatchEntry {
    commitment: Commitment,
    input_nullifier: Nullifier,
}

impl DecryptBatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues one viewing key together with the on-chain commitment it must
    /// reproduce and the input nullifier its note was minted against.
    pub(crate) fn push(
        &mut self,
        commitment: Commitment,
        input_nullifier: Nullifier,
        viewing_key: &ViewingKey,
    ) {
        self.viewing_keys.extend_from_slice(&viewing_key.0);
        self.entries.push(BatchEntry {
            commitment,
            input_nullifier,
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Runs the batched trial decryption and verifies each candidate.
///
/// Returns a sequence aligned with the batch: entry `i` is `Some` only when
/// viewing key `i` decrypted under `private_key` AND the recovered note's
/// recomputed commitment matches the on-chain commitment. Candidates failing
/// the check are malformed or forged and are discarded.
pub(crate) fn recover_tree_notes<A: NoteAlgorithms>(
    note_algorithms: &A,
    owner_public_key: &PublicKey,
    private_key: &SecretKey,
    batch: &DecryptBatch,
) -> Vec<Option<TreeNote>> {
    if batch.is_empty() {
        return Vec::new();
    }

    let payloads = note_algorithms.batch_decrypt_note_payloads(&batch.viewing_keys, private_key);
    debug_assert_eq!(payloads.len(), batch.len());

    payloads
        .into_iter()
        .zip(&batch.entries)
        .map(|(payload, entry)| {
            let payload = payload?;
            let tree_note = TreeNote {
                value: payload.value,
                asset_id: payload.asset_id,
                owner: AccountId::new(*owner_public_key, payload.account_nonce),
                secret: payload.secret,
                creator_pubkey: payload.creator_pubkey,
                input_nullifier: entry.input_nullifier,
            };

            if note_algorithms.value_note_commitment(&tree_note) == entry.commitment {
                Some(tree_note)
            } else {
                tracing::debug!(
                    "discarding decrypted candidate for {}: commitment mismatch",
                    entry.commitment
                );
                None
            }
        })
        .collect()
}

impl TreeNote {
    /// Whether the note carries any value. Zero-valued notes are real wire
    /// artifacts but are never persisted.
    #[must_use]
    pub fn has_value(&self) -> bool {
        !self.value.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use crate::testutils::{MockNoteAlgorithms, mock_public_key, mock_secret_key};

    use super::*;

    fn owned_note(private_key: &SecretKey) -> TreeNote {
        TreeNote {
            value: BigUint::from(250u32),
            asset_id: 3,
            owner: AccountId::new(mock_public_key(private_key), 1),
            secret: [0x55; 32],
            creator_pubkey: [0x66; 32],
            input_nullifier: Nullifier([0x77; 32]),
        }
    }

    #[test]
    fn round_trip_recovers_owned_note() {
        let note_algorithms = MockNoteAlgorithms;
        let private_key = mock_secret_key(1);
        let tree_note = owned_note(&private_key);
        let (viewing_key, commitment) = note_algorithms.seal_tree_note(&tree_note);

        let mut batch = DecryptBatch::new();
        batch.push(commitment, tree_note.input_nullifier, &viewing_key);

        let recovered = recover_tree_notes(
            &note_algorithms,
            &mock_public_key(&private_key),
            &private_key,
            &batch,
        );
        assert_eq!(recovered, vec![Some(tree_note)]);
    }

    #[test]
    fn commitment_mismatch_is_discarded() {
        let note_algorithms = MockNoteAlgorithms;
        let private_key = mock_secret_key(1);
        let tree_note = owned_note(&private_key);
        let (viewing_key, _) = note_algorithms.seal_tree_note(&tree_note);

        let mut batch = DecryptBatch::new();
        batch.push(Commitment([0xff; 32]), tree_note.input_nullifier, &viewing_key);

        let recovered = recover_tree_notes(
            &note_algorithms,
            &mock_public_key(&private_key),
            &private_key,
            &batch,
        );
        assert_eq!(recovered, vec![None]);
    }

    #[test]
    fn foreign_viewing_keys_do_not_decrypt() {
        let note_algorithms = MockNoteAlgorithms;
        let private_key = mock_secret_key(1);
        let other_key = mock_secret_key(2);
        let tree_note = owned_note(&other_key);
        let (viewing_key, commitment) = note_algorithms.seal_tree_note(&tree_note);

        let mut batch = DecryptBatch::new();
        batch.push(commitment, tree_note.input_nullifier, &viewing_key);

        let recovered = recover_tree_notes(
            &note_algorithms,
            &mock_public_key(&private_key),
            &private_key,
            &batch,
        );
        assert_eq!(recovered, vec![None]);
    }
}
