//! Entrypoint for the per-user state synchronizer.
//!
//! A [`UserState`] owns one account's private view of the rollup: it ingests
//! blocks, trial-decrypts note ciphertexts, applies per-proof-kind side
//! effects to storage and keeps the per-asset note pickers current. Blocks
//! are applied strictly serially; the only concurrency is the background
//! queue drain task and the shared provider fetch task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool, AtomicU8};
use std::time::Duration;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::client::{self, FetchRequest, RollupProvider};
use crate::config::SyncConfig;
use crate::decrypt::{self, DecryptBatch, NoteAlgorithms, TreeNote};
use crate::error::{ProofError, SyncError};
use crate::note_picker::NotePicker;
use crate::primitives::{AccountId, Commitment, Nullifier};
use crate::rollup::offchain::{
    OffchainAccountData, OffchainDefiDepositData, OffchainJoinSplitData,
};
use crate::rollup::{Block, ProofId, RollupProofData};
use crate::wallet::traits::{SyncDatabase, SyncWallet};
use crate::wallet::{Note, SyncState, UserData};

pub(crate) mod account;
pub(crate) mod defi;
pub(crate) mod join_split;
pub(crate) mod pending;

#[cfg(test)]
mod tests;

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Balance change of one asset across a block batch.
#[derive(Debug, Clone)]
pub struct BalanceUpdate {
    /// Asset whose balance moved.
    pub asset_id: u32,
    /// Balance after the batch.
    pub balance: BigUint,
    /// Signed change across the batch.
    pub diff: BigInt,
}

/// Events published by a [`UserState`].
///
/// Each applied batch emits one event per asset whose balance changed,
/// followed by a trailing event with no update payload. Listeners must keep
/// up; the channel drops the oldest events past its configured capacity.
#[derive(Debug, Clone)]
pub enum UserStateEvent {
    /// The user's state changed.
    UpdatedUserState {
        /// Account the event belongs to.
        user_id: AccountId,
        /// Per-asset balance movement, absent on the trailing event and on
        /// pending-proof ingestion.
        update: Option<BalanceUpdate>,
    },
}

/// Constructs per-user [`UserState`] instances over shared dependencies.
///
/// Owns the fetch task that serializes all provider access. Must be created
/// within a tokio runtime.
pub struct UserStateFactory<D, A> {
    db: Arc<RwLock<D>>,
    note_algorithms: Arc<A>,
    fetch_request_sender: mpsc::UnboundedSender<FetchRequest>,
    config: SyncConfig,
    _fetcher_handle: JoinHandle<()>,
}

impl<D, A> UserStateFactory<D, A>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    /// Creates a factory, spawning the provider fetch task.
    pub fn new<P>(
        db: Arc<RwLock<D>>,
        note_algorithms: Arc<A>,
        provider: P,
        config: SyncConfig,
    ) -> Self
    where
        P: RollupProvider,
    {
        let (fetch_request_sender, fetch_request_receiver) = mpsc::unbounded_channel();
        let fetcher_handle =
            tokio::spawn(async move { client::fetch::fetch(fetch_request_receiver, provider).await });

        Self {
            db,
            note_algorithms,
            fetch_request_sender,
            config,
            _fetcher_handle: fetcher_handle,
        }
    }

    /// Creates the synchronizer for one account.
    ///
    /// Loads the stored user record, reconciles stale pending data against
    /// the provider's pending set and seeds the note pickers.
    pub async fn create_user_state(
        &self,
        account_id: AccountId,
    ) -> Result<UserState<D, A>, SyncError<D::Error>> {
        let user = self
            .db
            .read()
            .await
            .get_user(&account_id)
            .map_err(SyncError::DatabaseError)?
            .ok_or(SyncError::UnknownUser(account_id))?;

        let user_state = UserState::new(
            user,
            self.db.clone(),
            self.note_algorithms.clone(),
            self.fetch_request_sender.clone(),
            &self.config,
        );
        user_state.init().await?;

        Ok(user_state)
    }
}

struct DrainTask<E: std::fmt::Debug + std::fmt::Display> {
    discard: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), SyncError<E>>>,
}

/// Block-driven state machine maintaining one account's local view.
///
/// Cheap to clone; clones share all state. The background drain task holds
/// one.
pub struct UserState<D: SyncWallet, A> {
    user_id: AccountId,
    user: Arc<RwLock<UserData>>,
    db: Arc<RwLock<D>>,
    note_algorithms: Arc<A>,
    fetch_request_sender: mpsc::UnboundedSender<FetchRequest>,
    sync_state: Arc<AtomicU8>,
    event_sender: broadcast::Sender<UserStateEvent>,
    note_pickers: Arc<RwLock<HashMap<u32, NotePicker>>>,
    block_sender: Arc<Mutex<mpsc::UnboundedSender<Block>>>,
    block_receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<Block>>>>,
    drain_task: Arc<Mutex<Option<DrainTask<D::Error>>>>,
}

impl<D: SyncWallet, A> Clone for UserState<D, A> {
    fn clone(&self) -> Self {
        Self {
            user_id: self.user_id,
            user: self.user.clone(),
            db: self.db.clone(),
            note_algorithms: self.note_algorithms.clone(),
            fetch_request_sender: self.fetch_request_sender.clone(),
            sync_state: self.sync_state.clone(),
            event_sender: self.event_sender.clone(),
            note_pickers: self.note_pickers.clone(),
            block_sender: self.block_sender.clone(),
            block_receiver: self.block_receiver.clone(),
            drain_task: self.drain_task.clone(),
        }
    }
}

impl<D, A> UserState<D, A>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    fn new(
        user: UserData,
        db: Arc<RwLock<D>>,
        note_algorithms: Arc<A>,
        fetch_request_sender: mpsc::UnboundedSender<FetchRequest>,
        config: &SyncConfig,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(config.event_channel_capacity);
        let (block_sender, block_receiver) = mpsc::unbounded_channel();

        Self {
            user_id: user.id,
            user: Arc::new(RwLock::new(user)),
            db,
            note_algorithms,
            fetch_request_sender,
            sync_state: Arc::new(AtomicU8::new(SyncState::Off as u8)),
            event_sender,
            note_pickers: Arc::new(RwLock::new(HashMap::new())),
            block_sender: Arc::new(Mutex::new(block_sender)),
            block_receiver: Arc::new(Mutex::new(Some(block_receiver))),
            drain_task: Arc::new(Mutex::new(None)),
        }
    }

    async fn init(&self) -> Result<(), SyncError<D::Error>> {
        self.reset_data().await?;
        self.refresh_note_pickers()
            .await
            .map_err(SyncError::DatabaseError)?;

        Ok(())
    }

    /// The account this synchronizer serves.
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.user_id
    }

    /// Current lifecycle state.
    pub fn sync_state(&self) -> Result<SyncState, SyncError<D::Error>> {
        Ok(SyncState::from_atomic_u8(&self.sync_state)?)
    }

    /// Subscribes to [`UserStateEvent`]s.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UserStateEvent> {
        self.event_sender.subscribe()
    }

    /// Starts synchronization.
    ///
    /// No-op unless the state is `Off`. Fetches and applies all blocks from
    /// `synced_to_rollup + 1`, then transitions to `Monitoring` with a
    /// background task draining the block queue serially. Provider or storage
    /// failures during catch-up are returned and leave the state `Off`.
    pub async fn start_sync(&self) -> Result<(), SyncError<D::Error>> {
        if self.sync_state()? != SyncState::Off {
            return Ok(());
        }
        SyncState::Synching.store(&self.sync_state);
        tracing::info!("Starting sync for user {}...", self.user_id);

        let from_rollup_id = {
            let user = self.user.read().await;
            u32::try_from(user.synced_to_rollup + 1).expect("rollup ids fit a u32")
        };
        let catch_up = async {
            let blocks =
                client::get_blocks(self.fetch_request_sender.clone(), from_rollup_id).await?;
            self.handle_blocks(&blocks).await
        };
        if let Err(e) = catch_up.await {
            SyncState::Off.store(&self.sync_state);
            return Err(e);
        }

        let block_receiver = match self.block_receiver.lock().await.take() {
            Some(block_receiver) => block_receiver,
            None => {
                // a halted drain task consumed the previous pair
                let (block_sender, block_receiver) = mpsc::unbounded_channel();
                *self.block_sender.lock().await = block_sender;
                block_receiver
            }
        };
        let discard = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(drain_block_queue(
            self.clone(),
            block_receiver,
            discard.clone(),
        ));
        *self.drain_task.lock().await = Some(DrainTask { discard, handle });
        SyncState::Monitoring.store(&self.sync_state);
        tracing::info!("User {} synchronised, monitoring.", self.user_id);

        Ok(())
    }

    /// Enqueues a block.
    ///
    /// Blocks queue up from construction; the drain task consumes them once
    /// the state reaches `Monitoring`. Stale blocks are dropped at
    /// application time.
    pub async fn process_block(&self, block: Block) {
        let _ignore_closed = self.block_sender.lock().await.send(block);
    }

    /// Stops synchronization and transitions to `Off`.
    ///
    /// With `flush` the queue is closed for writes and drained before the
    /// task exits; without it the remaining items are discarded. An in-flight
    /// block always completes. Returns the drain task's failure, if it
    /// halted.
    pub async fn stop_sync(&self, flush: bool) -> Result<(), SyncError<D::Error>> {
        let Some(drain_task) = self.drain_task.lock().await.take() else {
            SyncState::Off.store(&self.sync_state);
            return Ok(());
        };

        if !flush {
            drain_task.discard.store(true, atomic::Ordering::Release);
        }
        // a fresh channel pair both closes the old queue for writes and
        // leaves the state restartable
        let (block_sender, block_receiver) = mpsc::unbounded_channel();
        *self.block_sender.lock().await = block_sender;
        let result = drain_task.handle.await.expect("drain task panicked");
        *self.block_receiver.lock().await = Some(block_receiver);
        SyncState::Off.store(&self.sync_state);
        tracing::info!("Sync stopped for user {}.", self.user_id);

        result
    }

    /// Blocks until the state leaves `Synching`.
    pub async fn await_synchronised(&self) -> Result<(), SyncError<D::Error>> {
        let mut interval = tokio::time::interval(SYNC_POLL_INTERVAL);
        loop {
            interval.tick().await;
            if self.sync_state()? != SyncState::Synching {
                return Ok(());
            }
        }
    }

    /// Applies a batch of blocks to local state.
    ///
    /// Blocks at or below `synced_to_rollup` are dropped; the rest are
    /// applied in order, inner proofs in index order. All viewing keys in the
    /// batch are trial-decrypted in a single batched call first. The user
    /// record is written back once, after the whole batch.
    pub async fn handle_blocks(&self, blocks: &[Block]) -> Result<(), SyncError<D::Error>> {
        let mut last_applied = self.user.read().await.synced_to_rollup;

        let mut rollups = Vec::new();
        for block in blocks {
            if i64::from(block.rollup_id) <= last_applied {
                tracing::debug!(
                    "dropping rollup {}: already synced to {}",
                    block.rollup_id,
                    last_applied
                );
                continue;
            }
            let rollup = RollupProofData::decode(&block.rollup_proof_data)?;
            let contexts = classify_rollup(&rollup, block)?;
            last_applied = i64::from(block.rollup_id);
            rollups.push((block, rollup, contexts));
        }
        if rollups.is_empty() {
            return Ok(());
        }

        // one batched trial decryption across the whole batch; the curve
        // setup cost dominates, per-note verification is cheap
        let mut batch = DecryptBatch::new();
        for (_, rollup, contexts) in &rollups {
            for (proof, context) in rollup.inner_proofs.iter().zip(contexts) {
                match context {
                    ProofContext::JoinSplit(offchain) => {
                        batch.push(
                            proof.note_commitment_1,
                            proof.nullifier_1,
                            &offchain.viewing_key_1,
                        );
                        batch.push(
                            proof.note_commitment_2,
                            proof.nullifier_2,
                            &offchain.viewing_key_2,
                        );
                    }
                    ProofContext::DefiDeposit(offchain) => {
                        batch.push(
                            proof.note_commitment_2,
                            proof.nullifier_2,
                            &offchain.viewing_key,
                        );
                    }
                    ProofContext::Account(_) | ProofContext::DefiClaim | ProofContext::Padding => {}
                }
            }
        }
        tracing::debug!(
            "handling {} rollups with {} viewing keys for user {}",
            rollups.len(),
            batch.len(),
            self.user_id
        );

        let note_algorithms = self.note_algorithms.clone();
        let (public_key, private_key) = {
            let user = self.user.read().await;
            (user.public_key, user.private_key.clone())
        };
        let tree_notes = tokio::task::spawn_blocking(move || {
            decrypt::recover_tree_notes(&*note_algorithms, &public_key, &private_key, &batch)
        })
        .await
        .expect("trial decryption panicked");

        let balances_before = self.balances().await;

        let mut tree_notes = tree_notes.into_iter();
        for (block, rollup, contexts) in &rollups {
            for (index, (proof, context)) in
                rollup.inner_proofs.iter().zip(contexts).enumerate()
            {
                let note_start_index = rollup.data_start_index + 2 * index as u64;
                match context {
                    ProofContext::Padding => {}
                    ProofContext::JoinSplit(_) => {
                        let candidate_1 = tree_notes.next().expect("aligned with batch");
                        let candidate_2 = tree_notes.next().expect("aligned with batch");
                        self.handle_join_split_tx(
                            proof,
                            candidate_1,
                            candidate_2,
                            note_start_index,
                            block,
                        )
                        .await?;
                    }
                    ProofContext::Account(offchain) => {
                        self.handle_account_tx(proof, offchain, note_start_index, block)
                            .await?;
                    }
                    ProofContext::DefiDeposit(offchain) => {
                        let candidate = tree_notes.next().expect("aligned with batch");
                        self.handle_defi_deposit_tx(
                            proof,
                            offchain,
                            candidate,
                            rollup.rollup_id,
                            note_start_index,
                            block,
                        )
                        .await?;
                    }
                    ProofContext::DefiClaim => {
                        self.handle_defi_claim_tx(proof, note_start_index, block)
                            .await?;
                    }
                }
            }
            self.user.write().await.synced_to_rollup = i64::from(rollup.rollup_id);
            tracing::debug!("rollup {} applied for user {}", rollup.rollup_id, self.user_id);
        }

        // snapshot first so the user lock is never held across a db await
        let user_snapshot = self.user.read().await.clone();
        self.db
            .write()
            .await
            .update_user(&user_snapshot)
            .map_err(SyncError::DatabaseError)?;

        let balances_after = self.balances().await;
        self.emit_balance_updates(&balances_before, &balances_after);

        Ok(())
    }

    /// Confirmed balance of one asset, pending reservations ignored.
    pub async fn get_balance(&self, asset_id: u32) -> BigUint {
        self.note_pickers
            .read()
            .await
            .get(&asset_id)
            .map(NotePicker::get_sum)
            .unwrap_or_default()
    }

    /// Picks up to two notes covering `value`, skipping notes reserved by
    /// the provider's pending set.
    pub async fn pick_notes(
        &self,
        asset_id: u32,
        value: &BigUint,
    ) -> Result<Vec<Note>, SyncError<D::Error>> {
        let excluded = self.pending_nullifiers().await?;
        Ok(self
            .note_pickers
            .read()
            .await
            .get(&asset_id)
            .map(|picker| picker.pick(value, &excluded))
            .unwrap_or_default())
    }

    /// The smallest single spendable note covering `value`.
    pub async fn pick_note(
        &self,
        asset_id: u32,
        value: &BigUint,
    ) -> Result<Option<Note>, SyncError<D::Error>> {
        let excluded = self.pending_nullifiers().await?;
        Ok(self
            .note_pickers
            .read()
            .await
            .get(&asset_id)
            .and_then(|picker| picker.pick_one(value, &excluded)))
    }

    /// All spendable notes of an asset and their combined value.
    pub async fn get_spendable_notes(
        &self,
        asset_id: u32,
    ) -> Result<(Vec<Note>, BigUint), SyncError<D::Error>> {
        let excluded = self.pending_nullifiers().await?;
        Ok(self
            .note_pickers
            .read()
            .await
            .get(&asset_id)
            .map(|picker| picker.get_spendable_notes(&excluded))
            .unwrap_or_default())
    }

    /// Combined spendable value of an asset.
    pub async fn get_spendable_sum(
        &self,
        asset_id: u32,
    ) -> Result<BigUint, SyncError<D::Error>> {
        let excluded = self.pending_nullifiers().await?;
        Ok(self
            .note_pickers
            .read()
            .await
            .get(&asset_id)
            .map(|picker| picker.get_spendable_sum(&excluded))
            .unwrap_or_default())
    }

    /// The largest value reachable with at most two notes of an asset.
    pub async fn get_max_spendable_value(
        &self,
        asset_id: u32,
    ) -> Result<BigUint, SyncError<D::Error>> {
        let excluded = self.pending_nullifiers().await?;
        Ok(self
            .note_pickers
            .read()
            .await
            .get(&asset_id)
            .map(|picker| picker.get_max_spendable_value(&excluded))
            .unwrap_or_default())
    }

    async fn pending_nullifiers(&self) -> Result<HashSet<Nullifier>, SyncError<D::Error>> {
        Ok(
            client::get_pending_note_nullifiers(self.fetch_request_sender.clone())
                .await?
                .into_iter()
                .collect(),
        )
    }

    async fn balances(&self) -> HashMap<u32, BigUint> {
        self.note_pickers
            .read()
            .await
            .iter()
            .map(|(asset_id, picker)| (*asset_id, picker.get_sum()))
            .collect()
    }

    fn emit_balance_updates(
        &self,
        before: &HashMap<u32, BigUint>,
        after: &HashMap<u32, BigUint>,
    ) {
        let mut asset_ids: Vec<u32> = before.keys().chain(after.keys()).copied().collect();
        asset_ids.sort_unstable();
        asset_ids.dedup();

        for asset_id in asset_ids {
            let old = before.get(&asset_id).cloned().unwrap_or_default();
            let new = after.get(&asset_id).cloned().unwrap_or_default();
            let diff = BigInt::from(new.clone()) - BigInt::from(old);
            if !diff.is_zero() {
                self.emit(UserStateEvent::UpdatedUserState {
                    user_id: self.user_id,
                    update: Some(BalanceUpdate {
                        asset_id,
                        balance: new,
                        diff,
                    }),
                });
            }
        }
        self.emit(UserStateEvent::UpdatedUserState {
            user_id: self.user_id,
            update: None,
        });
    }

    pub(crate) fn emit(&self, event: UserStateEvent) {
        // a send only fails with no subscribers; events are best-effort
        let _ignore_no_receivers = self.event_sender.send(event);
    }

    /// Admits one output note if it decrypted and belongs to this user.
    ///
    /// The note is persisted only when it carries value; the record is
    /// returned regardless so callers can recover fee amounts from
    /// zero-valued outputs.
    pub(crate) async fn process_new_note(
        &self,
        index: u64,
        commitment: Commitment,
        candidate: Option<TreeNote>,
        allow_chain: bool,
        pending: bool,
    ) -> Result<Option<Note>, SyncError<D::Error>> {
        let Some(tree_note) = candidate else {
            return Ok(None);
        };
        if tree_note.owner != self.user_id {
            return Ok(None);
        }

        let private_key = self.user.read().await.private_key.clone();
        let nullifier = self
            .note_algorithms
            .value_note_nullifier(&commitment, &private_key);
        let note = Note {
            asset_id: tree_note.asset_id,
            value: tree_note.value,
            commitment,
            secret: tree_note.secret,
            nullifier,
            nullified: false,
            owner: tree_note.owner,
            creator_pubkey: tree_note.creator_pubkey,
            input_nullifier: tree_note.input_nullifier,
            index,
            allow_chain,
            pending,
        };

        if !note.value.is_zero() {
            self.db
                .write()
                .await
                .add_note(note.clone())
                .map_err(SyncError::DatabaseError)?;
            tracing::debug!(
                "added {} note of value {} on asset {} for user {}",
                if pending { "pending" } else { "confirmed" },
                note.value,
                note.asset_id,
                self.user_id
            );
        }

        Ok(Some(note))
    }

    /// Marks the note behind `nullifier` spent, if it is known and ours.
    ///
    /// Returns the destroyed note so callers can recover input values.
    pub(crate) async fn nullify_note(
        &self,
        nullifier: &Nullifier,
    ) -> Result<Option<Note>, SyncError<D::Error>> {
        let mut db = self.db.write().await;
        let Some(note) = db
            .get_note_by_nullifier(nullifier)
            .map_err(SyncError::DatabaseError)?
        else {
            return Ok(None);
        };
        if note.owner != self.user_id {
            return Ok(None);
        }

        db.nullify_note(nullifier).map_err(SyncError::DatabaseError)?;
        tracing::debug!(
            "nullified note of value {} on asset {} for user {}",
            note.value,
            note.asset_id,
            self.user_id
        );

        Ok(Some(note))
    }

    /// Rebuilds the per-asset note pickers from storage.
    pub(crate) async fn refresh_note_pickers(&self) -> Result<(), D::Error> {
        let notes = self.db.read().await.get_user_notes(&self.user_id)?;

        let mut by_asset: HashMap<u32, Vec<Note>> = HashMap::new();
        for note in notes {
            by_asset.entry(note.asset_id).or_default().push(note);
        }

        let mut note_pickers = self.note_pickers.write().await;
        // an asset whose last note was spent keeps an empty picker so its
        // balance still diffs to zero
        for (asset_id, picker) in note_pickers.iter_mut() {
            if !by_asset.contains_key(asset_id) {
                *picker = NotePicker::default();
            }
        }
        for (asset_id, notes) in by_asset {
            note_pickers.insert(asset_id, NotePicker::new(notes));
        }

        Ok(())
    }
}

/// Consumes the block queue one block at a time.
///
/// A processing failure halts the task and flips the state to `Off`; the
/// error is surfaced at `stop_sync`. The `discard` flag is checked between
/// blocks only, so an in-flight block always completes.
async fn drain_block_queue<D, A>(
    user_state: UserState<D, A>,
    mut block_receiver: mpsc::UnboundedReceiver<Block>,
    discard: Arc<AtomicBool>,
) -> Result<(), SyncError<D::Error>>
where
    D: SyncDatabase,
    A: NoteAlgorithms,
{
    while let Some(block) = block_receiver.recv().await {
        if discard.load(atomic::Ordering::Acquire) {
            break;
        }
        if let Err(e) = user_state
            .handle_blocks(std::slice::from_ref(&block))
            .await
        {
            tracing::error!(
                "block processing halted for user {}. {e}",
                user_state.user_id
            );
            SyncState::Off.store(&user_state.sync_state);
            return Err(e);
        }
    }

    Ok(())
}

/// Kind-specific data extracted from an inner proof's off-chain payload.
enum ProofContext {
    Padding,
    JoinSplit(OffchainJoinSplitData),
    Account(OffchainAccountData),
    DefiDeposit(OffchainDefiDepositData),
    DefiClaim,
}

/// Decodes each inner proof's off-chain payload by kind.
fn classify_rollup(
    rollup: &RollupProofData,
    block: &Block,
) -> Result<Vec<ProofContext>, ProofError> {
    rollup
        .inner_proofs
        .iter()
        .enumerate()
        .map(|(proof_index, proof)| {
            let offchain_data = || {
                block
                    .offchain_tx_data
                    .get(proof_index)
                    .map(Vec::as_slice)
                    .ok_or(ProofError::MissingOffchainData {
                        rollup_id: rollup.rollup_id,
                        proof_index,
                    })
            };

            Ok(match proof.proof_id {
                ProofId::Padding => ProofContext::Padding,
                ProofId::Deposit | ProofId::Withdraw | ProofId::Send => {
                    ProofContext::JoinSplit(OffchainJoinSplitData::from_bytes(offchain_data()?)?)
                }
                ProofId::Account => {
                    ProofContext::Account(OffchainAccountData::from_bytes(offchain_data()?)?)
                }
                ProofId::DefiDeposit => ProofContext::DefiDeposit(
                    OffchainDefiDepositData::from_bytes(offchain_data()?)?,
                ),
                ProofId::DefiClaim => ProofContext::DefiClaim,
            })
        })
        .collect()
}

/// Clamps a signed fee computation at zero. Fee recovery over partially
/// known inputs can go negative.
pub(crate) fn non_negative(value: BigInt) -> BigUint {
    value.to_biguint().unwrap_or_default()
}

/// Sums the values of recovered input notes, unknown inputs counting zero.
pub(crate) fn destroyed_value(notes: &[Option<Note>]) -> BigUint {
    notes
        .iter()
        .flatten()
        .map(|note| &note.value)
        .sum()
}
