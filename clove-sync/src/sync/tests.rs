//! Scenario tests driving a full user state over the in-memory database, the
//! mock provider and deterministic note algorithms.

use std::sync::Arc;
use std::time::Duration;

use num_bigint::{BigInt, BigUint};
use tokio::sync::RwLock;

use crate::client::PendingTx;
use crate::config::SyncConfig;
use crate::decrypt::{NoteAlgorithms as _, TreeNote};
use crate::primitives::{AccountId, BridgeId, Commitment, EthAddress, Nullifier};
use crate::rollup::offchain::ViewingKey;
use crate::rollup::{Block, DefiInteractionResult, InnerProofData, ProofId};
use crate::testutils::{
    BlockBuilder, InnerProofBuilder, MemoryDatabase, MockNoteAlgorithms, MockRollupProvider,
    encode_account_offchain, encode_defi_deposit_offchain, encode_join_split_offchain,
    mock_alias_hash, mock_user,
};
use crate::wallet::traits::{SyncClaims as _, SyncNotes as _, SyncTransactions as _, SyncWallet as _};
use crate::wallet::{Note, ProofOutput, SyncState, UserData, UserJoinSplitTx, UserTx};

use super::{UserState, UserStateEvent, UserStateFactory};

struct TestContext {
    db: Arc<RwLock<MemoryDatabase>>,
    provider: MockRollupProvider,
    note_algorithms: MockNoteAlgorithms,
    factory: UserStateFactory<MemoryDatabase, MockNoteAlgorithms>,
    user: UserData,
}

impl TestContext {
    fn new() -> Self {
        let user = mock_user(1, 0);
        let mut db = MemoryDatabase::default();
        db.add_user(user.clone());
        let db = Arc::new(RwLock::new(db));
        let provider = MockRollupProvider::default();
        let note_algorithms = MockNoteAlgorithms;
        let factory = UserStateFactory::new(
            db.clone(),
            Arc::new(note_algorithms.clone()),
            provider.clone(),
            SyncConfig::default(),
        );

        Self {
            db,
            provider,
            note_algorithms,
            factory,
            user,
        }
    }

    async fn user_state(&self) -> UserState<MemoryDatabase, MockNoteAlgorithms> {
        self.factory
            .create_user_state(self.user.id)
            .await
            .expect("user is seeded")
    }

    /// A tree note owned by the test user, sealed for the wire.
    fn sealed_note(
        &self,
        value: u64,
        asset_id: u32,
        input_nullifier: Nullifier,
        secret_seed: u8,
    ) -> (TreeNote, ViewingKey, Commitment) {
        let tree_note = TreeNote {
            value: BigUint::from(value),
            asset_id,
            owner: self.user.id,
            secret: [secret_seed; 32],
            creator_pubkey: [0u8; 32],
            input_nullifier,
        };
        let (viewing_key, commitment) = self.note_algorithms.seal_tree_note(&tree_note);
        (tree_note, viewing_key, commitment)
    }

    /// Seeds a confirmed note directly into storage and returns it.
    async fn seed_note(&self, value: u64, asset_id: u32, commitment_seed: u8) -> Note {
        let commitment = Commitment([commitment_seed; 32]);
        let note = Note {
            asset_id,
            value: BigUint::from(value),
            commitment,
            secret: [0u8; 32],
            nullifier: self
                .note_algorithms
                .value_note_nullifier(&commitment, &self.user.private_key),
            nullified: false,
            owner: self.user.id,
            creator_pubkey: [0u8; 32],
            input_nullifier: Nullifier::ZERO,
            index: 7,
            allow_chain: false,
            pending: false,
        };
        self.db.write().await.add_note(note.clone()).unwrap();
        note
    }

    /// A deposit block minting `value` of asset 0 to the test user.
    fn deposit_block(&self, rollup_id: u32, value: u64) -> (Block, InnerProofData) {
        let (_, viewing_key_1, commitment_1) =
            self.sealed_note(value, 0, Nullifier([0xd1; 32]), 0x11);
        let (_, viewing_key_2, commitment_2) = self.sealed_note(0, 0, Nullifier([0xd2; 32]), 0x12);
        let proof = InnerProofBuilder::new(ProofId::Deposit)
            .note_commitment_1(commitment_1)
            .note_commitment_2(commitment_2)
            .nullifier_1(Nullifier([0xd1; 32]))
            .nullifier_2(Nullifier([0xd2; 32]))
            .public_value(BigUint::from(value))
            .public_owner(EthAddress([0xaa; 20]));
        let block = BlockBuilder::new(rollup_id)
            .add_proof(
                &proof,
                encode_join_split_offchain(&viewing_key_1, &viewing_key_2),
            )
            .build();

        (block, proof.build())
    }
}

fn expect_update(
    events: &mut tokio::sync::broadcast::Receiver<UserStateEvent>,
    expected_user: AccountId,
) -> Option<(u32, BigUint, BigInt)> {
    let UserStateEvent::UpdatedUserState { user_id, update } =
        events.try_recv().expect("event emitted");
    assert_eq!(user_id, expected_user);
    update.map(|update| (update.asset_id, update.balance, update.diff))
}

#[tokio::test]
async fn deposit_settlement() {
    let context = TestContext::new();
    let (block, proof) = context.deposit_block(0, 1000);
    let created = block.created;
    context.provider.add_block(block);

    let user_state = context.user_state().await;
    let mut events = user_state.subscribe();
    user_state.start_sync().await.unwrap();

    assert_eq!(user_state.sync_state().unwrap(), SyncState::Monitoring);
    assert_eq!(user_state.get_balance(0).await, BigUint::from(1000u32));

    let tx = context
        .db
        .read()
        .await
        .get_join_split_tx(&proof.tx_id, &context.user.id)
        .unwrap()
        .expect("join-split recovered");
    assert_eq!(tx.public_input, BigUint::from(1000u32));
    assert_eq!(tx.public_output, BigUint::ZERO);
    assert_eq!(tx.private_output_recipient, BigUint::from(1000u32));
    assert_eq!(tx.input_owner, Some(EthAddress([0xaa; 20])));
    assert_eq!(tx.settled, Some(created));
    assert!(tx.owned_by_me);

    let update = expect_update(&mut events, context.user.id).expect("balance update");
    assert_eq!(update, (0, BigUint::from(1000u32), BigInt::from(1000)));
    assert!(expect_update(&mut events, context.user.id).is_none());

    assert_eq!(
        context
            .db
            .read()
            .await
            .get_user(&context.user.id)
            .unwrap()
            .unwrap()
            .synced_to_rollup,
        0
    );

    user_state.stop_sync(false).await.unwrap();
    assert_eq!(user_state.sync_state().unwrap(), SyncState::Off);
}

#[tokio::test]
async fn send_to_self_is_util_tx() {
    let context = TestContext::new();
    let (_, viewing_key_1, commitment_1) = context.sealed_note(60, 0, Nullifier([0xe1; 32]), 0x21);
    let (_, viewing_key_2, commitment_2) = context.sealed_note(40, 0, Nullifier([0xe2; 32]), 0x22);
    let proof = InnerProofBuilder::new(ProofId::Send)
        .note_commitment_1(commitment_1)
        .note_commitment_2(commitment_2)
        .nullifier_1(Nullifier([0xe1; 32]))
        .nullifier_2(Nullifier([0xe2; 32]));
    let block = BlockBuilder::new(0)
        .add_proof(
            &proof,
            encode_join_split_offchain(&viewing_key_1, &viewing_key_2),
        )
        .build();

    let user_state = context.user_state().await;
    user_state.handle_blocks(&[block]).await.unwrap();

    let db = context.db.read().await;
    assert!(db.join_split_txs().is_empty());
    let util_txs = db.util_txs();
    assert_eq!(util_txs.len(), 1);
    assert_eq!(
        util_txs[0].forward_link,
        context
            .note_algorithms
            .value_note_nullifier(&commitment_1, &context.user.private_key)
    );
    assert_eq!(util_txs[0].tx_hash, proof.build().tx_id);
}

/// Runs a DeFi deposit of 100 against a seeded input note of 200 and returns
/// the claim-redemption block's context for the given interaction outcome.
async fn run_defi_deposit(
    context: &TestContext,
    user_state: &UserState<MemoryDatabase, MockNoteAlgorithms>,
    result: bool,
    total_output_value_a: u64,
) -> (crate::wallet::UserDefiTx, Nullifier, InnerProofData) {
    let bridge_id = BridgeId::new(1, 0, 2, 0);
    let input_note = context.seed_note(200, 0, 0x31).await;
    user_state.refresh_note_pickers().await.unwrap();

    let claim_note_commitment = Commitment([0x32; 32]);
    let (_, viewing_key, change_commitment) =
        context.sealed_note(90, 0, Nullifier([0x33; 32]), 0x34);
    let proof = InnerProofBuilder::new(ProofId::DefiDeposit)
        .note_commitment_1(claim_note_commitment)
        .note_commitment_2(change_commitment)
        .nullifier_1(input_note.nullifier)
        .nullifier_2(Nullifier([0x33; 32]));
    let block = BlockBuilder::new(0)
        .add_proof(
            &proof,
            encode_defi_deposit_offchain(
                &bridge_id,
                &BigUint::from(100u32),
                &crate::primitives::PublicKey([0x77; 64]),
                &viewing_key,
            ),
        )
        .add_interaction_result(DefiInteractionResult {
            bridge_id,
            total_input_value: BigUint::from(100u32),
            total_output_value_a: BigUint::from(total_output_value_a),
            total_output_value_b: BigUint::ZERO,
            result,
        })
        .build();

    user_state.handle_blocks(&[block]).await.unwrap();

    let claim_nullifier = context
        .note_algorithms
        .claim_note_nullifier(&claim_note_commitment);
    let proof = proof.build();
    let defi_tx = context
        .db
        .read()
        .await
        .get_defi_tx(&proof.tx_id)
        .unwrap()
        .expect("defi tx recovered");

    (defi_tx, claim_nullifier, proof)
}

#[tokio::test]
async fn defi_deposit_and_claim() {
    let context = TestContext::new();
    let user_state = context.user_state().await;

    let (defi_tx, claim_nullifier, _) = run_defi_deposit(&context, &user_state, true, 300).await;

    // input note destroyed, change note admitted
    assert_eq!(user_state.get_balance(0).await, BigUint::from(90u32));
    assert_eq!(defi_tx.deposit_value, BigUint::from(100u32));
    assert_eq!(defi_tx.output_value_a, BigUint::from(300u32));
    assert_eq!(defi_tx.output_value_b, BigUint::ZERO);
    // 200 destroyed - 90 change - 100 deposit
    assert_eq!(defi_tx.tx_fee, BigUint::from(10u32));
    assert_eq!(defi_tx.settled, None);
    assert!(
        context
            .db
            .read()
            .await
            .get_claim(&claim_nullifier)
            .unwrap()
            .is_some()
    );

    let claim_proof = InnerProofBuilder::new(ProofId::DefiClaim)
        .nullifier_1(claim_nullifier)
        .nullifier_2(Nullifier([0x35; 32]));
    let claim_block = BlockBuilder::new(1).add_proof(&claim_proof, Vec::new()).build();
    let claim_created = claim_block.created;
    user_state.handle_blocks(&[claim_block]).await.unwrap();

    // payout lands on the bridge's first output asset
    assert_eq!(user_state.get_balance(2).await, BigUint::from(300u32));
    let settled_tx = context
        .db
        .read()
        .await
        .get_defi_tx(&defi_tx.tx_hash)
        .unwrap()
        .unwrap();
    assert_eq!(settled_tx.settled, Some(claim_created));
}

#[tokio::test]
async fn failed_defi_refunds_deposit() {
    let context = TestContext::new();
    let user_state = context.user_state().await;

    let (defi_tx, claim_nullifier, _) = run_defi_deposit(&context, &user_state, false, 300).await;
    assert_eq!(defi_tx.output_value_a, BigUint::ZERO);
    assert_eq!(defi_tx.output_value_b, BigUint::ZERO);

    let claim_proof = InnerProofBuilder::new(ProofId::DefiClaim)
        .nullifier_1(claim_nullifier)
        .nullifier_2(Nullifier([0x36; 32]));
    let claim_block = BlockBuilder::new(1).add_proof(&claim_proof, Vec::new()).build();
    user_state.handle_blocks(&[claim_block]).await.unwrap();

    // refund note of the deposit value on the input asset
    assert_eq!(user_state.get_balance(0).await, BigUint::from(190u32));
    assert_eq!(user_state.get_balance(2).await, BigUint::ZERO);
}

#[tokio::test]
async fn local_pending_withdraw_settles_without_duplicates() {
    let context = TestContext::new();
    let input_note = context.seed_note(600, 0, 0x41).await;

    let (recipient_note, viewing_key_1, commitment_1) =
        context.sealed_note(0, 0, input_note.nullifier, 0x42);
    let (change_note, viewing_key_2, commitment_2) =
        context.sealed_note(50, 0, Nullifier([0x43; 32]), 0x44);
    let proof_builder = InnerProofBuilder::new(ProofId::Withdraw)
        .note_commitment_1(commitment_1)
        .note_commitment_2(commitment_2)
        .nullifier_1(input_note.nullifier)
        .nullifier_2(Nullifier([0x43; 32]))
        .public_value(BigUint::from(500u32))
        .public_owner(EthAddress([0xbb; 20]));
    let proof = proof_builder.build();

    context.provider.set_pending_txs(vec![PendingTx {
        tx_id: proof.tx_id,
        note_commitment_1: commitment_1,
        note_commitment_2: commitment_2,
    }]);
    let user_state = context.user_state().await;

    user_state
        .add_proof(&ProofOutput {
            tx: UserTx::JoinSplit(UserJoinSplitTx {
                tx_hash: proof.tx_id,
                user_id: context.user.id,
                asset_id: 0,
                public_input: BigUint::ZERO,
                public_output: BigUint::from(500u32),
                private_input: BigUint::from(600u32),
                private_output_recipient: BigUint::ZERO,
                private_output_sender: BigUint::from(50u32),
                input_owner: None,
                output_owner: Some(EthAddress([0xbb; 20])),
                owned_by_me: true,
                created: 42,
                settled: None,
            }),
            proof_data: proof.clone(),
            output_notes: [Some(recipient_note), Some(change_note)],
            parent_proof: None,
            backward_link: None,
            allow_chain: 0,
        })
        .await
        .unwrap();

    {
        let db = context.db.read().await;
        let pending = db.get_user_pending_notes(&context.user.id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].commitment, commitment_2);
        assert_eq!(
            db.get_join_split_tx(&proof.tx_id, &context.user.id)
                .unwrap()
                .unwrap()
                .settled,
            None
        );
    }

    let block = BlockBuilder::new(0)
        .add_proof(
            &proof_builder,
            encode_join_split_offchain(&viewing_key_1, &viewing_key_2),
        )
        .build();
    let created = block.created;
    user_state.handle_blocks(&[block]).await.unwrap();

    let db = context.db.read().await;
    let tx = db
        .get_join_split_tx(&proof.tx_id, &context.user.id)
        .unwrap()
        .unwrap();
    assert_eq!(tx.settled, Some(created));
    // pending record preserved, not rebuilt
    assert_eq!(tx.public_output, BigUint::from(500u32));

    // the pending change note upgraded in place, commitment keyed
    assert!(db.get_user_pending_notes(&context.user.id).unwrap().is_empty());
    let notes = db.get_user_notes(&context.user.id).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].commitment, commitment_2);
    assert!(!notes[0].pending);
    assert_eq!(notes[0].index, 1);
}

#[tokio::test]
async fn init_reconciles_pending_state_against_provider() {
    let context = TestContext::new();
    let kept_tx = crate::primitives::TxHash([0x51; 32]);
    let dropped_tx = crate::primitives::TxHash([0x52; 32]);
    let kept_commitment = Commitment([0x53; 32]);

    {
        let mut db = context.db.write().await;
        for (tx_hash, created) in [(kept_tx, 1), (dropped_tx, 2)] {
            db.add_join_split_tx(UserJoinSplitTx {
                tx_hash,
                user_id: context.user.id,
                asset_id: 0,
                public_input: BigUint::ZERO,
                public_output: BigUint::ZERO,
                private_input: BigUint::from(10u32),
                private_output_recipient: BigUint::from(10u32),
                private_output_sender: BigUint::ZERO,
                input_owner: None,
                output_owner: None,
                owned_by_me: true,
                created,
                settled: None,
            })
            .unwrap();
        }
        for (commitment_seed, commitment) in
            [(0x53u8, kept_commitment), (0x54, Commitment([0x54; 32]))]
        {
            db.add_note(Note {
                asset_id: 0,
                value: BigUint::from(10u32),
                commitment,
                secret: [0u8; 32],
                nullifier: Nullifier([commitment_seed; 32]),
                nullified: false,
                owner: context.user.id,
                creator_pubkey: [0u8; 32],
                input_nullifier: Nullifier::ZERO,
                index: 0,
                allow_chain: false,
                pending: true,
            })
            .unwrap();
        }
    }

    context.provider.set_pending_txs(vec![PendingTx {
        tx_id: kept_tx,
        note_commitment_1: kept_commitment,
        note_commitment_2: Commitment::ZERO,
    }]);

    let _user_state = context.user_state().await;

    let db = context.db.read().await;
    assert!(
        db.get_join_split_tx(&kept_tx, &context.user.id)
            .unwrap()
            .is_some()
    );
    assert!(
        db.get_join_split_tx(&dropped_tx, &context.user.id)
            .unwrap()
            .is_none()
    );
    let pending = db.get_user_pending_notes(&context.user.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].commitment, kept_commitment);
}

#[tokio::test]
async fn account_proof_registers_keys_and_alias() {
    let context = TestContext::new();
    let alias_hash = mock_alias_hash(9);
    let proof = InnerProofBuilder::new(ProofId::Account).nullifier_1(Nullifier([0x72; 32]));
    let block = BlockBuilder::new(0)
        .data_start_index(10)
        .add_proof(
            &proof,
            encode_account_offchain(
                &context.user.public_key,
                &alias_hash,
                0,
                [0x71; 32],
                [0u8; 32],
            ),
        )
        .build();
    let created = block.created;

    let user_state = context.user_state().await;
    user_state.handle_blocks(&[block]).await.unwrap();

    {
        let db = context.db.read().await;
        assert_eq!(db.signing_keys().len(), 1);
        assert_eq!(db.signing_keys()[0].key, [0x71; 32]);
        assert_eq!(db.signing_keys()[0].tree_index, 10);

        let tx = db.get_account_tx(&proof.build().tx_id).unwrap().unwrap();
        assert_eq!(tx.new_signing_key_1, Some([0x71; 32]));
        assert_eq!(tx.new_signing_key_2, None);
        assert!(tx.migrated);
        assert_eq!(tx.settled, Some(created));

        let user = db.get_user(&context.user.id).unwrap().unwrap();
        assert_eq!(user.alias_hash, Some(alias_hash));
    }

    // same key at a different account nonce is another user
    let foreign_proof = InnerProofBuilder::new(ProofId::Account);
    let foreign_block = BlockBuilder::new(1)
        .add_proof(
            &foreign_proof,
            encode_account_offchain(
                &context.user.public_key,
                &mock_alias_hash(10),
                5,
                [0x73; 32],
                [0u8; 32],
            ),
        )
        .build();
    user_state.handle_blocks(&[foreign_block]).await.unwrap();

    let db = context.db.read().await;
    assert_eq!(db.signing_keys().len(), 1);
    assert!(
        db.get_account_tx(&foreign_proof.build().tx_id)
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn stale_blocks_are_idempotent() {
    let context = TestContext::new();
    let (block, _) = context.deposit_block(0, 1000);

    let user_state = context.user_state().await;
    user_state.handle_blocks(&[block.clone()]).await.unwrap();
    assert_eq!(user_state.get_balance(0).await, BigUint::from(1000u32));

    // same block again, alone and duplicated within one batch
    user_state.handle_blocks(&[block.clone()]).await.unwrap();
    user_state
        .handle_blocks(&[block.clone(), block])
        .await
        .unwrap();

    assert_eq!(user_state.get_balance(0).await, BigUint::from(1000u32));
    assert_eq!(
        context
            .db
            .read()
            .await
            .get_user(&context.user.id)
            .unwrap()
            .unwrap()
            .synced_to_rollup,
        0
    );
}

#[tokio::test]
async fn monitoring_drains_queued_blocks() {
    let context = TestContext::new();
    let user_state = context.user_state().await;

    user_state.start_sync().await.unwrap();
    user_state.await_synchronised().await.unwrap();
    assert_eq!(user_state.sync_state().unwrap(), SyncState::Monitoring);

    let (first, _) = context.deposit_block(0, 1000);
    user_state.process_block(first).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while user_state.get_balance(0).await != BigUint::from(1000u32) {
        assert!(tokio::time::Instant::now() < deadline, "queue never drained");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // flush applies blocks still queued at shutdown
    let (second, _) = context.deposit_block(1, 500);
    user_state.process_block(second).await;
    user_state.stop_sync(true).await.unwrap();
    assert_eq!(user_state.sync_state().unwrap(), SyncState::Off);
    assert_eq!(user_state.get_balance(0).await, BigUint::from(1500u32));
}

#[tokio::test]
async fn restart_resumes_from_synced_rollup() {
    let context = TestContext::new();
    let (first, _) = context.deposit_block(0, 1000);
    context.provider.add_block(first);

    let user_state = context.user_state().await;
    user_state.start_sync().await.unwrap();
    user_state.stop_sync(false).await.unwrap();

    // a later session only sees the new block
    let (second, _) = context.deposit_block(1, 200);
    context.provider.add_block(second);
    let user_state = context.user_state().await;
    user_state.start_sync().await.unwrap();
    user_state.stop_sync(false).await.unwrap();

    assert_eq!(user_state.get_balance(0).await, BigUint::from(1200u32));
    assert_eq!(
        context
            .db
            .read()
            .await
            .get_user(&context.user.id)
            .unwrap()
            .unwrap()
            .synced_to_rollup,
        1
    );
}

#[tokio::test]
async fn pick_notes_excludes_provider_reserved_nullifiers() {
    let context = TestContext::new();
    let reserved = context.seed_note(100, 0, 0x61).await;
    let free = context.seed_note(60, 0, 0x62).await;
    context
        .provider
        .set_pending_nullifiers(vec![reserved.nullifier]);

    let user_state = context.user_state().await;

    let picked = user_state
        .pick_note(0, &BigUint::from(50u32))
        .await
        .unwrap()
        .expect("free note covers");
    assert_eq!(picked.commitment, free.commitment);
    assert!(
        user_state
            .pick_notes(0, &BigUint::from(100u32))
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        user_state.get_spendable_sum(0).await.unwrap(),
        BigUint::from(60u32)
    );
    assert_eq!(
        user_state.get_max_spendable_value(0).await.unwrap(),
        BigUint::from(60u32)
    );
    // local balance ignores reservations
    assert_eq!(user_state.get_balance(0).await, BigUint::from(160u32));
}
