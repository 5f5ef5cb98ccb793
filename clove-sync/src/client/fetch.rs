//! Queue fetch requests and serve them from the rollup provider.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::{FetchRequest, RollupProvider};

/// Receives [`FetchRequest`]s via an [`tokio::sync::mpsc::UnboundedReceiver`]
/// for queueing and fetching from the provider.
/// Returns the data specified in the [`FetchRequest`] variant via the provided
/// [`tokio::sync::oneshot::Sender`].
///
/// Allows all requests to the provider to be handled from a single task so
/// every user state shares one transport.
pub(crate) async fn fetch<P>(mut fetch_request_receiver: UnboundedReceiver<FetchRequest>, provider: P)
where
    P: RollupProvider,
{
    // `fetch` returns here when every requester has hung up; sync is over.
    while let Some(fetch_request) = fetch_request_receiver.recv().await {
        fetch_from_provider(&provider, fetch_request).await;
    }
}

async fn fetch_from_provider<P>(provider: &P, fetch_request: FetchRequest)
where
    P: RollupProvider,
{
    match fetch_request {
        FetchRequest::Blocks(sender, from_rollup_id) => {
            tracing::debug!("Fetching blocks from rollup {}.", from_rollup_id);
            let blocks = provider.get_blocks(from_rollup_id).await;
            let _ignore_error = sender.send(blocks);
        }
        FetchRequest::PendingTxs(sender) => {
            tracing::debug!("Fetching pending txs.");
            let pending_txs = provider.get_pending_txs().await;
            let _ignore_error = sender.send(pending_txs);
        }
        FetchRequest::PendingNoteNullifiers(sender) => {
            tracing::debug!("Fetching pending note nullifiers.");
            let nullifiers = provider.get_pending_note_nullifiers().await;
            let _ignore_error = sender.send(nullifiers);
        }
    }
}
