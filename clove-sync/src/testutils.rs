//! In-memory database, mock provider and deterministic note algorithms for
//! driving the sync engine in tests.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use byteorder::{BigEndian, ByteOrder};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::client::{PendingTx, RollupProvider};
use crate::decrypt::{DecryptedNotePayload, NoteAlgorithms, TreeNote};
use crate::error::ProviderError;
use crate::primitives::{
    AccountId, AliasHash, Commitment, EthAddress, Nullifier, PublicKey, SecretKey, TxHash,
};
use crate::rollup::offchain::{ViewingKey, VIEWING_KEY_SIZE};
use crate::rollup::{
    Block, DefiInteractionResult, InnerProofData, ProofId, INNER_PROOF_SIZE,
};
use crate::wallet::traits::{SyncClaims, SyncNotes, SyncTransactions, SyncWallet};
use crate::wallet::{
    Claim, Note, SigningKeyRecord, UserAccountTx, UserData, UserDefiTx, UserJoinSplitTx,
    UserUtilTx,
};

fn hash(domain: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn value_field(value: &BigUint) -> [u8; 32] {
    let bytes = value.to_bytes_be();
    assert!(bytes.len() <= 32, "value exceeds 32 bytes");
    let mut field = [0u8; 32];
    field[32 - bytes.len()..].copy_from_slice(&bytes);
    field
}

/// Deterministic secret key derived from a seed byte.
#[must_use]
pub fn mock_secret_key(seed: u8) -> SecretKey {
    SecretKey(hash("mock-secret-key", &[&[seed]]))
}

/// Public key of a mock secret key.
#[must_use]
pub fn mock_public_key(private_key: &SecretKey) -> PublicKey {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&hash("mock-public-key-x", &[&private_key.0]));
    bytes[32..].copy_from_slice(&hash("mock-public-key-y", &[&private_key.0]));
    PublicKey(bytes)
}

/// A fresh user record for a seeded mock keypair.
#[must_use]
pub fn mock_user(seed: u8, account_nonce: u32) -> UserData {
    let private_key = mock_secret_key(seed);
    let public_key = mock_public_key(&private_key);
    UserData {
        id: AccountId::new(public_key, account_nonce),
        public_key,
        private_key,
        account_nonce,
        alias_hash: None,
        synced_to_rollup: -1,
    }
}

/// A distinct alias hash for a seed byte.
#[must_use]
pub fn mock_alias_hash(seed: u8) -> AliasHash {
    let mut bytes = [0u8; 28];
    bytes.copy_from_slice(&hash("mock-alias", &[&[seed]])[..28]);
    AliasHash(bytes)
}

/// SHA-256-backed stand-in for the curve and note-hash primitives.
///
/// Viewing keys are a recipient tag followed by the plaintext payload, so
/// trial decryption succeeds exactly when the tag matches the key holder.
#[derive(Debug, Default, Clone)]
pub struct MockNoteAlgorithms;

impl MockNoteAlgorithms {
    fn viewing_key_tag(public_key: &PublicKey) -> [u8; 32] {
        hash("mock-viewing-key-tag", &[&public_key.0])
    }

    /// Encrypts a note payload to `recipient`.
    #[must_use]
    pub fn encrypt_note_payload(
        &self,
        payload: &DecryptedNotePayload,
        recipient: &PublicKey,
    ) -> ViewingKey {
        let mut bytes = [0u8; VIEWING_KEY_SIZE];
        bytes[..32].copy_from_slice(&Self::viewing_key_tag(recipient));
        bytes[32..64].copy_from_slice(&value_field(&payload.value));
        BigEndian::write_u32(&mut bytes[64..68], payload.asset_id);
        BigEndian::write_u32(&mut bytes[68..72], payload.account_nonce);
        bytes[72..104].copy_from_slice(&payload.creator_pubkey);
        bytes[104..136].copy_from_slice(&payload.secret);
        ViewingKey(bytes)
    }

    /// Encrypts `tree_note` to its owner, returning the viewing key and the
    /// commitment the chain must carry for recovery to accept it.
    #[must_use]
    pub fn seal_tree_note(&self, tree_note: &TreeNote) -> (ViewingKey, Commitment) {
        let payload = DecryptedNotePayload {
            value: tree_note.value.clone(),
            asset_id: tree_note.asset_id,
            account_nonce: tree_note.owner.account_nonce,
            creator_pubkey: tree_note.creator_pubkey,
            secret: tree_note.secret,
        };
        let viewing_key = self.encrypt_note_payload(&payload, &tree_note.owner.public_key);
        (viewing_key, self.value_note_commitment(tree_note))
    }
}

impl NoteAlgorithms for MockNoteAlgorithms {
    fn value_note_commitment(&self, note: &TreeNote) -> Commitment {
        let mut nonce = [0u8; 4];
        BigEndian::write_u32(&mut nonce, note.owner.account_nonce);
        let mut asset_id = [0u8; 4];
        BigEndian::write_u32(&mut asset_id, note.asset_id);
        Commitment(hash(
            "mock-value-note-commitment",
            &[
                &note.owner.public_key.0,
                &nonce,
                &value_field(&note.value),
                &asset_id,
                &note.secret,
                &note.creator_pubkey,
                &note.input_nullifier.0,
            ],
        ))
    }

    fn value_note_nullifier(&self, commitment: &Commitment, private_key: &SecretKey) -> Nullifier {
        Nullifier(hash(
            "mock-value-note-nullifier",
            &[&commitment.0, &private_key.0],
        ))
    }

    fn claim_note_nullifier(&self, commitment: &Commitment) -> Nullifier {
        Nullifier(hash("mock-claim-note-nullifier", &[&commitment.0]))
    }

    fn derive_note_secret(&self, eph_pub_key: &PublicKey, private_key: &SecretKey) -> [u8; 32] {
        hash("mock-note-secret", &[&eph_pub_key.0, &private_key.0])
    }

    fn batch_decrypt_note_payloads(
        &self,
        viewing_keys: &[u8],
        private_key: &SecretKey,
    ) -> Vec<Option<DecryptedNotePayload>> {
        let tag = Self::viewing_key_tag(&mock_public_key(private_key));
        viewing_keys
            .chunks(VIEWING_KEY_SIZE)
            .map(|chunk| {
                if chunk.len() != VIEWING_KEY_SIZE || chunk[..32] != tag {
                    return None;
                }
                Some(DecryptedNotePayload {
                    value: BigUint::from_bytes_be(&chunk[32..64]),
                    asset_id: BigEndian::read_u32(&chunk[64..68]),
                    account_nonce: BigEndian::read_u32(&chunk[68..72]),
                    creator_pubkey: chunk[72..104].try_into().expect("fixed split"),
                    secret: chunk[104..136].try_into().expect("fixed split"),
                })
            })
            .collect()
    }
}

/// Encodes a join-split off-chain payload.
#[must_use]
pub fn encode_join_split_offchain(
    viewing_key_1: &ViewingKey,
    viewing_key_2: &ViewingKey,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 * VIEWING_KEY_SIZE);
    bytes.extend_from_slice(&viewing_key_1.0);
    bytes.extend_from_slice(&viewing_key_2.0);
    bytes
}

/// Encodes an account off-chain payload.
#[must_use]
pub fn encode_account_offchain(
    account_public_key: &PublicKey,
    alias_hash: &AliasHash,
    account_nonce: u32,
    spending_key_1: [u8; 32],
    spending_key_2: [u8; 32],
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&account_public_key.0);
    bytes.extend_from_slice(&alias_hash.0);
    bytes.extend_from_slice(&account_nonce.to_be_bytes());
    bytes.extend_from_slice(&spending_key_1);
    bytes.extend_from_slice(&spending_key_2);
    bytes
}

/// Encodes a DeFi deposit off-chain payload.
#[must_use]
pub fn encode_defi_deposit_offchain(
    bridge_id: &crate::primitives::BridgeId,
    deposit_value: &BigUint,
    partial_state_secret_eph_pub_key: &PublicKey,
    viewing_key: &ViewingKey,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&bridge_id.0);
    bytes.extend_from_slice(&value_field(deposit_value));
    bytes.extend_from_slice(&partial_state_secret_eph_pub_key.0);
    bytes.extend_from_slice(&viewing_key.0);
    bytes
}

/// Shared-handle mock of the rollup provider.
#[derive(Debug, Default, Clone)]
pub struct MockRollupProvider {
    blocks: Arc<Mutex<Vec<Block>>>,
    pending_txs: Arc<Mutex<Vec<PendingTx>>>,
    pending_nullifiers: Arc<Mutex<Vec<Nullifier>>>,
}

impl MockRollupProvider {
    /// Appends a block to the served chain.
    pub fn add_block(&self, block: Block) {
        self.blocks.lock().unwrap().push(block);
    }

    /// Replaces the pending transaction set.
    pub fn set_pending_txs(&self, pending_txs: Vec<PendingTx>) {
        *self.pending_txs.lock().unwrap() = pending_txs;
    }

    /// Replaces the pending nullifier set.
    pub fn set_pending_nullifiers(&self, nullifiers: Vec<Nullifier>) {
        *self.pending_nullifiers.lock().unwrap() = nullifiers;
    }
}

impl RollupProvider for MockRollupProvider {
    async fn get_blocks(&self, from_rollup_id: u32) -> Result<Vec<Block>, ProviderError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|block| block.rollup_id >= from_rollup_id)
            .cloned()
            .collect())
    }

    async fn get_pending_txs(&self) -> Result<Vec<PendingTx>, ProviderError> {
        Ok(self.pending_txs.lock().unwrap().clone())
    }

    async fn get_pending_note_nullifiers(&self) -> Result<Vec<Nullifier>, ProviderError> {
        Ok(self.pending_nullifiers.lock().unwrap().clone())
    }
}

/// Builder for on-chain inner proof encodings.
#[derive(Debug, Clone)]
pub struct InnerProofBuilder {
    proof_id: ProofId,
    note_commitment_1: Commitment,
    note_commitment_2: Commitment,
    nullifier_1: Nullifier,
    nullifier_2: Nullifier,
    public_value: BigUint,
    public_owner: Option<EthAddress>,
    asset_id: u32,
}

impl InnerProofBuilder {
    /// Starts a proof of the given kind with zeroed fields.
    #[must_use]
    pub fn new(proof_id: ProofId) -> Self {
        Self {
            proof_id,
            note_commitment_1: Commitment::ZERO,
            note_commitment_2: Commitment::ZERO,
            nullifier_1: Nullifier::ZERO,
            nullifier_2: Nullifier::ZERO,
            public_value: BigUint::ZERO,
            public_owner: None,
            asset_id: 0,
        }
    }

    /// Sets the first output note commitment.
    #[must_use]
    pub fn note_commitment_1(mut self, commitment: Commitment) -> Self {
        self.note_commitment_1 = commitment;
        self
    }

    /// Sets the second output note commitment.
    #[must_use]
    pub fn note_commitment_2(mut self, commitment: Commitment) -> Self {
        self.note_commitment_2 = commitment;
        self
    }

    /// Sets the first input nullifier.
    #[must_use]
    pub fn nullifier_1(mut self, nullifier: Nullifier) -> Self {
        self.nullifier_1 = nullifier;
        self
    }

    /// Sets the second input nullifier.
    #[must_use]
    pub fn nullifier_2(mut self, nullifier: Nullifier) -> Self {
        self.nullifier_2 = nullifier;
        self
    }

    /// Sets the public value.
    #[must_use]
    pub fn public_value(mut self, public_value: BigUint) -> Self {
        self.public_value = public_value;
        self
    }

    /// Sets the public owner address.
    #[must_use]
    pub fn public_owner(mut self, public_owner: EthAddress) -> Self {
        self.public_owner = Some(public_owner);
        self
    }

    /// Sets the asset id.
    #[must_use]
    pub fn asset_id(mut self, asset_id: u32) -> Self {
        self.asset_id = asset_id;
        self
    }

    /// Encodes the proof as it appears on the wire.
    #[must_use]
    pub fn encode(&self) -> [u8; INNER_PROOF_SIZE] {
        let mut bytes = [0u8; INNER_PROOF_SIZE];
        BigEndian::write_u32(&mut bytes[28..32], self.proof_id as u32);
        bytes[32..64].copy_from_slice(&self.note_commitment_1.0);
        bytes[64..96].copy_from_slice(&self.note_commitment_2.0);
        bytes[96..128].copy_from_slice(&self.nullifier_1.0);
        bytes[128..160].copy_from_slice(&self.nullifier_2.0);
        bytes[160..192].copy_from_slice(&value_field(&self.public_value));
        if let Some(public_owner) = self.public_owner {
            bytes[204..224].copy_from_slice(&public_owner.0);
        }
        BigEndian::write_u32(&mut bytes[252..256], self.asset_id);
        bytes
    }

    /// Decodes the built proof, yielding its tx id.
    #[must_use]
    pub fn build(&self) -> InnerProofData {
        InnerProofData::from_bytes(&self.encode()).expect("builder encodes valid proofs")
    }
}

/// Builder for provider blocks.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    rollup_id: u32,
    data_start_index: u32,
    created: u64,
    proofs: Vec<[u8; INNER_PROOF_SIZE]>,
    offchain_tx_data: Vec<Vec<u8>>,
    interaction_result: Vec<DefiInteractionResult>,
}

impl BlockBuilder {
    /// Starts an empty block for the given rollup id.
    #[must_use]
    pub fn new(rollup_id: u32) -> Self {
        Self {
            rollup_id,
            data_start_index: 0,
            created: u64::from(rollup_id) + 1_000_000,
            proofs: Vec::new(),
            offchain_tx_data: Vec::new(),
            interaction_result: Vec::new(),
        }
    }

    /// Sets the data-tree index of the block's first output note.
    #[must_use]
    pub fn data_start_index(mut self, data_start_index: u32) -> Self {
        self.data_start_index = data_start_index;
        self
    }

    /// Sets the block timestamp.
    #[must_use]
    pub fn created(mut self, created: u64) -> Self {
        self.created = created;
        self
    }

    /// Appends an inner proof and its off-chain payload.
    #[must_use]
    pub fn add_proof(mut self, proof: &InnerProofBuilder, offchain_tx_data: Vec<u8>) -> Self {
        self.proofs.push(proof.encode());
        self.offchain_tx_data.push(offchain_tx_data);
        self
    }

    /// Appends a DeFi interaction result.
    #[must_use]
    pub fn add_interaction_result(mut self, interaction: DefiInteractionResult) -> Self {
        self.interaction_result.push(interaction);
        self
    }

    /// Assembles the block, encoding the rollup proof buffer.
    #[must_use]
    pub fn build(self) -> Block {
        let mut rollup_proof_data = vec![0u8; 96];
        BigEndian::write_u32(&mut rollup_proof_data[28..32], self.rollup_id);
        BigEndian::write_u32(&mut rollup_proof_data[60..64], self.data_start_index);
        BigEndian::write_u32(
            &mut rollup_proof_data[92..96],
            u32::try_from(self.proofs.len()).expect("proof count fits a u32"),
        );
        for proof in &self.proofs {
            rollup_proof_data.extend_from_slice(proof);
        }

        Block {
            rollup_id: self.rollup_id,
            rollup_proof_data,
            offchain_tx_data: self.offchain_tx_data,
            interaction_result: self.interaction_result,
            created: self.created,
        }
    }
}

/// Hash-map backed database implementing the full storage trait family.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: HashMap<AccountId, UserData>,
    signing_keys: Vec<SigningKeyRecord>,
    notes: HashMap<Commitment, Note>,
    claims: HashMap<Nullifier, Claim>,
    join_split_txs: HashMap<(TxHash, AccountId), UserJoinSplitTx>,
    account_txs: HashMap<TxHash, UserAccountTx>,
    defi_txs: HashMap<TxHash, UserDefiTx>,
    util_txs: HashMap<Nullifier, UserUtilTx>,
}

impl MemoryDatabase {
    /// Seeds a user record.
    pub fn add_user(&mut self, user: UserData) {
        self.users.insert(user.id, user);
    }

    /// Signing keys registered so far.
    #[must_use]
    pub fn signing_keys(&self) -> &[SigningKeyRecord] {
        &self.signing_keys
    }

    /// All join-split records.
    #[must_use]
    pub fn join_split_txs(&self) -> Vec<&UserJoinSplitTx> {
        self.join_split_txs.values().collect()
    }

    /// All util records.
    #[must_use]
    pub fn util_txs(&self) -> Vec<&UserUtilTx> {
        self.util_txs.values().collect()
    }
}

impl SyncWallet for MemoryDatabase {
    type Error = Infallible;

    fn get_user(&self, account_id: &AccountId) -> Result<Option<UserData>, Self::Error> {
        Ok(self.users.get(account_id).cloned())
    }

    fn update_user(&mut self, user: &UserData) -> Result<(), Self::Error> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn add_signing_key(&mut self, signing_key: SigningKeyRecord) -> Result<(), Self::Error> {
        self.signing_keys.push(signing_key);
        Ok(())
    }
}

impl SyncNotes for MemoryDatabase {
    fn add_note(&mut self, note: Note) -> Result<(), Self::Error> {
        self.notes.insert(note.commitment, note);
        Ok(())
    }

    fn nullify_note(&mut self, nullifier: &Nullifier) -> Result<(), Self::Error> {
        if let Some(note) = self
            .notes
            .values_mut()
            .find(|note| note.nullifier == *nullifier)
        {
            note.nullified = true;
        }
        Ok(())
    }

    fn remove_note(&mut self, nullifier: &Nullifier) -> Result<(), Self::Error> {
        self.notes.retain(|_, note| note.nullifier != *nullifier);
        Ok(())
    }

    fn get_note_by_nullifier(&self, nullifier: &Nullifier) -> Result<Option<Note>, Self::Error> {
        Ok(self
            .notes
            .values()
            .find(|note| note.nullifier == *nullifier)
            .cloned())
    }

    fn get_user_notes(&self, account_id: &AccountId) -> Result<Vec<Note>, Self::Error> {
        Ok(self
            .notes
            .values()
            .filter(|note| note.owner == *account_id && !note.pending && !note.nullified)
            .cloned()
            .collect())
    }

    fn get_user_pending_notes(&self, account_id: &AccountId) -> Result<Vec<Note>, Self::Error> {
        Ok(self
            .notes
            .values()
            .filter(|note| note.owner == *account_id && note.pending)
            .cloned()
            .collect())
    }
}

impl SyncClaims for MemoryDatabase {
    fn add_claim(&mut self, claim: Claim) -> Result<(), Self::Error> {
        self.claims.insert(claim.nullifier, claim);
        Ok(())
    }

    fn get_claim(&self, nullifier: &Nullifier) -> Result<Option<Claim>, Self::Error> {
        Ok(self.claims.get(nullifier).cloned())
    }
}

impl SyncTransactions for MemoryDatabase {
    fn add_join_split_tx(&mut self, tx: UserJoinSplitTx) -> Result<(), Self::Error> {
        self.join_split_txs.insert((tx.tx_hash, tx.user_id), tx);
        Ok(())
    }

    fn get_join_split_tx(
        &self,
        tx_hash: &TxHash,
        account_id: &AccountId,
    ) -> Result<Option<UserJoinSplitTx>, Self::Error> {
        Ok(self.join_split_txs.get(&(*tx_hash, *account_id)).cloned())
    }

    fn settle_join_split_tx(
        &mut self,
        tx_hash: &TxHash,
        account_id: &AccountId,
        settled: u64,
    ) -> Result<(), Self::Error> {
        if let Some(tx) = self.join_split_txs.get_mut(&(*tx_hash, *account_id)) {
            tx.settled = Some(settled);
        }
        Ok(())
    }

    fn add_account_tx(&mut self, tx: UserAccountTx) -> Result<(), Self::Error> {
        self.account_txs.insert(tx.tx_hash, tx);
        Ok(())
    }

    fn get_account_tx(&self, tx_hash: &TxHash) -> Result<Option<UserAccountTx>, Self::Error> {
        Ok(self.account_txs.get(tx_hash).cloned())
    }

    fn settle_account_tx(&mut self, tx_hash: &TxHash, settled: u64) -> Result<(), Self::Error> {
        if let Some(tx) = self.account_txs.get_mut(tx_hash) {
            tx.settled = Some(settled);
        }
        Ok(())
    }

    fn add_defi_tx(&mut self, tx: UserDefiTx) -> Result<(), Self::Error> {
        self.defi_txs.insert(tx.tx_hash, tx);
        Ok(())
    }

    fn get_defi_tx(&self, tx_hash: &TxHash) -> Result<Option<UserDefiTx>, Self::Error> {
        Ok(self.defi_txs.get(tx_hash).cloned())
    }

    fn update_defi_tx(
        &mut self,
        tx_hash: &TxHash,
        output_value_a: BigUint,
        output_value_b: BigUint,
    ) -> Result<(), Self::Error> {
        if let Some(tx) = self.defi_txs.get_mut(tx_hash) {
            tx.output_value_a = output_value_a;
            tx.output_value_b = output_value_b;
        }
        Ok(())
    }

    fn settle_defi_tx(&mut self, tx_hash: &TxHash, settled: u64) -> Result<(), Self::Error> {
        if let Some(tx) = self.defi_txs.get_mut(tx_hash) {
            tx.settled = Some(settled);
        }
        Ok(())
    }

    fn add_util_tx(&mut self, tx: UserUtilTx) -> Result<(), Self::Error> {
        self.util_txs.insert(tx.forward_link, tx);
        Ok(())
    }

    fn get_util_tx_by_link(
        &self,
        forward_link: &Nullifier,
    ) -> Result<Option<UserUtilTx>, Self::Error> {
        Ok(self.util_txs.get(forward_link).cloned())
    }

    fn get_unsettled_user_txs(&self, account_id: &AccountId) -> Result<Vec<TxHash>, Self::Error> {
        let join_splits = self
            .join_split_txs
            .values()
            .filter(|tx| tx.user_id == *account_id && tx.settled.is_none())
            .map(|tx| tx.tx_hash);
        let accounts = self
            .account_txs
            .values()
            .filter(|tx| tx.user_id == *account_id && tx.settled.is_none())
            .map(|tx| tx.tx_hash);
        let defis = self
            .defi_txs
            .values()
            .filter(|tx| tx.user_id == *account_id && tx.settled.is_none())
            .map(|tx| tx.tx_hash);

        Ok(join_splits.chain(accounts).chain(defis).collect())
    }

    fn remove_user_tx(
        &mut self,
        tx_hash: &TxHash,
        account_id: &AccountId,
    ) -> Result<(), Self::Error> {
        self.join_split_txs.remove(&(*tx_hash, *account_id));
        self.account_txs
            .retain(|hash, tx| !(hash == tx_hash && tx.user_id == *account_id));
        self.defi_txs
            .retain(|hash, tx| !(hash == tx_hash && tx.user_id == *account_id));
        self.util_txs
            .retain(|_, tx| !(tx.tx_hash == *tx_hash && tx.user_id == *account_id));
        Ok(())
    }
}
