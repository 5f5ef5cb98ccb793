#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = r#"
# Clove Sync

## Overview
Clove-sync is a rust-based per-user state sync engine for clients of
zero-knowledge rollups with encrypted UTXO-style notes. Because the ledger is
opaque, each user scans every rollup block, trial-decrypts the off-chain
viewing-key payloads with their private key, recovers owned notes, tracks
their nullification and reconstructs a coherent transaction history and
spendable balance. It provides the following features:
- Batched trial decryption, one curve-arithmetic batch per block batch with
  cheap per-note commitment verification.
- Per-proof-kind recovery, settling locally known transactions and rebuilding
  records for transactions first seen on-chain, including DeFi claim
  materialization and util-tx forward-link chaining.
- Serial block application, a lock-free queue consumed by a single background
  task keeps every invariant single-writer per user.
- Pending-state reconciliation, local pending transactions and notes are
  validated against the provider's pending set on startup.
- Spendable-note selection, per-asset pickers with provider-reserved
  nullifiers excluded at each call.

## Terminology
- Note - UTXO-like value record committed on-chain as an opaque commitment.
- Nullifier - one-way function of a note and the owner's private key, revealed
  when spending.
- Viewing key - ciphertext enabling the recipient to recover a note's
  plaintext off-chain.
- Claim - intermediate record representing a pending DeFi interaction outcome,
  redeemed by a claim proof.
- Rollup - batch of user transactions proven and published together,
  identified by a monotonically increasing rollup id.
- Inner proof - one user transaction within a rollup.
- Util tx - join-split created solely to stage value for a DeFi deposit,
  linked forward to its consumer by its first output's nullifier.

## Synchronization
1. `start_sync` fetches all blocks above the user's synced height and applies
   them as one batch.
2. Each batch decodes every rollup, classifies inner proofs by kind and
   gathers all viewing keys into one batched trial decryption.
3. Recovered candidates are verified against their on-chain commitments;
   survivors flow into the per-kind handlers in strict proof order.
4. Handlers admit output notes, destroy spent inputs, register and redeem
   claims and settle or rebuild transaction records.
5. The user's synced height is written back once per batch, balances are
   diffed and events emitted.
6. After catch-up the engine monitors, draining a block queue serially until
   `stop_sync`.
"#]

pub mod client;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod note_picker;
pub mod primitives;
pub mod rollup;
pub mod sync;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutils;

pub use client::RollupProvider;
pub use config::SyncConfig;
pub use decrypt::NoteAlgorithms;
pub use error::SyncError;
pub use sync::{UserState, UserStateEvent, UserStateFactory};
