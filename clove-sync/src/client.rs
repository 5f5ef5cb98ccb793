//! Module for handling all connections to the rollup provider.

use std::future::Future;

use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::error::ProviderError;
use crate::primitives::{Commitment, Nullifier, TxHash};
use crate::rollup::Block;

pub(crate) mod fetch;

/// A transaction sitting in the provider's pending pool.
#[derive(Debug, Clone)]
pub struct PendingTx {
    /// Transaction id.
    pub tx_id: TxHash,
    /// Commitment of the first output note.
    pub note_commitment_1: Commitment,
    /// Commitment of the second output note.
    pub note_commitment_2: Commitment,
}

/// Read-only view of the rollup served by a remote provider.
///
/// Implementations own the transport. The sync engine reaches the provider
/// exclusively through the [`crate::client::fetch::fetch`] task.
pub trait RollupProvider: Send + Sync + 'static {
    /// Returns all blocks from `from_rollup_id` to the chain tip, in order.
    fn get_blocks(
        &self,
        from_rollup_id: u32,
    ) -> impl Future<Output = Result<Vec<Block>, ProviderError>> + Send;

    /// Returns the provider's current pending transaction set.
    fn get_pending_txs(&self)
    -> impl Future<Output = Result<Vec<PendingTx>, ProviderError>> + Send;

    /// Returns the nullifiers reserved by pending transactions.
    fn get_pending_note_nullifiers(
        &self,
    ) -> impl Future<Output = Result<Vec<Nullifier>, ProviderError>> + Send;
}

/// Fetch requests are created and sent to the [`crate::client::fetch::fetch`]
/// task when a connection to the provider is required.
///
/// Each variant includes a [`tokio::sync::oneshot::Sender`] for returning the
/// fetched data to the requester.
#[derive(Debug)]
pub enum FetchRequest {
    /// Gets all blocks from the given rollup id to the chain tip.
    Blocks(oneshot::Sender<Result<Vec<Block>, ProviderError>>, u32),
    /// Gets the provider's pending transaction set.
    PendingTxs(oneshot::Sender<Result<Vec<PendingTx>, ProviderError>>),
    /// Gets the nullifiers reserved by pending transactions.
    PendingNoteNullifiers(oneshot::Sender<Result<Vec<Nullifier>, ProviderError>>),
}

/// Gets all blocks from `from_rollup_id` to the chain tip.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently,
/// connected via the `fetch_request` channel.
pub(crate) async fn get_blocks(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    from_rollup_id: u32,
) -> Result<Vec<Block>, ProviderError> {
    let (reply_sender, reply_receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::Blocks(reply_sender, from_rollup_id))
        .map_err(|_| ProviderError::FetcherDropped)?;

    reply_receiver
        .await
        .map_err(|_| ProviderError::FetcherDropped)?
}

/// Gets the provider's pending transaction set.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently,
/// connected via the `fetch_request` channel.
pub(crate) async fn get_pending_txs(
    fetch_request_sender: UnboundedSender<FetchRequest>,
) -> Result<Vec<PendingTx>, ProviderError> {
    let (reply_sender, reply_receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::PendingTxs(reply_sender))
        .map_err(|_| ProviderError::FetcherDropped)?;

    reply_receiver
        .await
        .map_err(|_| ProviderError::FetcherDropped)?
}

/// Gets the nullifiers reserved by pending transactions.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently,
/// connected via the `fetch_request` channel.
pub(crate) async fn get_pending_note_nullifiers(
    fetch_request_sender: UnboundedSender<FetchRequest>,
) -> Result<Vec<Nullifier>, ProviderError> {
    let (reply_sender, reply_receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::PendingNoteNullifiers(reply_sender))
        .map_err(|_| ProviderError::FetcherDropped)?;

    reply_receiver
        .await
        .map_err(|_| ProviderError::FetcherDropped)?
}
