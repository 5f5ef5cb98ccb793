//! Rollup block and inner-proof wire formats.
//!
//! A rollup block carries an opaque `rollup_proof_data` buffer published
//! on-chain plus one off-chain payload per inner proof. This module decodes
//! the on-chain side; [`self::offchain`] decodes the payloads.

use byteorder::{BigEndian, ByteOrder};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::error::ProofError;
use crate::primitives::{BridgeId, Commitment, EthAddress, Nullifier, TxHash};

pub mod offchain;

/// Byte length of one 32-byte proof field.
const FIELD_SIZE: usize = 32;
/// Number of 32-byte fields in the rollup header.
const ROLLUP_HEADER_FIELDS: usize = 3;
/// Byte length of one encoded inner proof.
pub const INNER_PROOF_SIZE: usize = 8 * FIELD_SIZE;

/// Kind discriminant of an inner proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofId {
    /// Filler proof padding a rollup to its fixed size. Skipped.
    Padding,
    /// Join-split moving public funds into a new note.
    Deposit,
    /// Join-split moving note value out to a public owner.
    Withdraw,
    /// Join-split transferring value between note owners.
    Send,
    /// Account registration, key addition or migration.
    Account,
    /// Entry half of a DeFi interaction; mints a claim note.
    DefiDeposit,
    /// Exit half of a DeFi interaction; redeems a claim note.
    DefiClaim,
}

impl ProofId {
    fn from_u32(value: u32) -> Result<Self, ProofError> {
        Ok(match value {
            0 => Self::Padding,
            1 => Self::Deposit,
            2 => Self::Withdraw,
            3 => Self::Send,
            4 => Self::Account,
            5 => Self::DefiDeposit,
            6 => Self::DefiClaim,
            unknown => return Err(ProofError::UnknownProofId(unknown)),
        })
    }

    /// Returns true for the join-split family of proofs.
    #[must_use]
    pub fn is_join_split(&self) -> bool {
        matches!(self, Self::Deposit | Self::Withdraw | Self::Send)
    }
}

impl std::fmt::Display for ProofId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Padding => write!(f, "padding"),
            Self::Deposit => write!(f, "deposit"),
            Self::Withdraw => write!(f, "withdraw"),
            Self::Send => write!(f, "send"),
            Self::Account => write!(f, "account"),
            Self::DefiDeposit => write!(f, "defi deposit"),
            Self::DefiClaim => write!(f, "defi claim"),
        }
    }
}

/// One user transaction within a rollup, as published on-chain.
///
/// Eight 32-byte fields: proof id, note commitments 1/2, nullifiers 1/2,
/// public value, public owner, asset id.
#[derive(Debug, Clone)]
pub struct InnerProofData {
    /// Kind discriminant.
    pub proof_id: ProofId,
    /// Commitment of the first output note.
    pub note_commitment_1: Commitment,
    /// Commitment of the second output note.
    pub note_commitment_2: Commitment,
    /// Nullifier of the first input note.
    pub nullifier_1: Nullifier,
    /// Nullifier of the second input note.
    pub nullifier_2: Nullifier,
    /// Raw public value field.
    pub public_value: [u8; 32],
    /// Raw public owner field.
    pub public_owner: [u8; 32],
    /// Raw asset id field; the asset id is the big-endian u32 at offset 28.
    pub asset_id: [u8; 32],
    /// Transaction id, the SHA-256 of the encoded proof.
    pub tx_id: TxHash,
}

impl InnerProofData {
    /// Decodes one inner proof from exactly [`INNER_PROOF_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() < INNER_PROOF_SIZE {
            return Err(ProofError::TruncatedInnerProof {
                expected: INNER_PROOF_SIZE,
                found: bytes.len(),
            });
        }
        let bytes = &bytes[..INNER_PROOF_SIZE];

        let field = |index: usize| -> [u8; 32] {
            bytes[index * FIELD_SIZE..(index + 1) * FIELD_SIZE]
                .try_into()
                .expect("sliced to field size")
        };

        let proof_id = ProofId::from_u32(BigEndian::read_u32(&field(0)[28..]))?;
        let tx_id = TxHash(Sha256::digest(bytes).into());

        Ok(Self {
            proof_id,
            note_commitment_1: Commitment(field(1)),
            note_commitment_2: Commitment(field(2)),
            nullifier_1: Nullifier(field(3)),
            nullifier_2: Nullifier(field(4)),
            public_value: field(5),
            public_owner: field(6),
            asset_id: field(7),
            tx_id,
        })
    }

    /// The asset id lane of the asset id field.
    #[must_use]
    pub fn asset_id(&self) -> u32 {
        BigEndian::read_u32(&self.asset_id[28..])
    }

    /// The public value as an unsigned big integer.
    #[must_use]
    pub fn public_value(&self) -> BigUint {
        BigUint::from_bytes_be(&self.public_value)
    }

    /// The public owner address, if the field is populated.
    #[must_use]
    pub fn public_owner(&self) -> Option<EthAddress> {
        EthAddress::from_field(&self.public_owner)
    }
}

/// Decoded form of a block's `rollup_proof_data` buffer.
///
/// Three 32-byte header fields (rollup id, data start index, tx count, each a
/// big-endian u32 in its last four bytes) followed by the inner proofs.
#[derive(Debug, Clone)]
pub struct RollupProofData {
    /// Monotonically increasing rollup index.
    pub rollup_id: u32,
    /// Data-tree index of the first output note in this rollup.
    pub data_start_index: u64,
    /// Inner proofs in rollup order, padding included.
    pub inner_proofs: Vec<InnerProofData>,
}

impl RollupProofData {
    /// Decodes a rollup proof buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        let header_size = ROLLUP_HEADER_FIELDS * FIELD_SIZE;
        if bytes.len() < header_size {
            return Err(ProofError::TruncatedRollup {
                expected: header_size,
                found: bytes.len(),
            });
        }

        let rollup_id = BigEndian::read_u32(&bytes[28..32]);
        let data_start_index = u64::from(BigEndian::read_u32(&bytes[60..64]));
        let num_txs = BigEndian::read_u32(&bytes[92..96]) as usize;

        let expected = header_size + num_txs * INNER_PROOF_SIZE;
        if bytes.len() < expected {
            return Err(ProofError::TruncatedRollup {
                expected,
                found: bytes.len(),
            });
        }

        let inner_proofs = bytes[header_size..expected]
            .chunks_exact(INNER_PROOF_SIZE)
            .map(InnerProofData::from_bytes)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rollup_id,
            data_start_index,
            inner_proofs,
        })
    }
}

/// Settlement result of one DeFi bridge interaction within a block.
#[derive(Debug, Clone)]
pub struct DefiInteractionResult {
    /// Bridge the interaction ran through.
    pub bridge_id: BridgeId,
    /// Total input across every deposit batched into the interaction.
    pub total_input_value: BigUint,
    /// Total first-asset output returned by the bridge.
    pub total_output_value_a: BigUint,
    /// Total second-asset output returned by the bridge.
    pub total_output_value_b: BigUint,
    /// Whether the interaction succeeded on L1.
    pub result: bool,
}

/// A rollup block as served by the provider.
#[derive(Debug, Clone)]
pub struct Block {
    /// Rollup index, also encoded in `rollup_proof_data`.
    pub rollup_id: u32,
    /// Published rollup proof buffer; see [`RollupProofData::decode`].
    pub rollup_proof_data: Vec<u8>,
    /// One off-chain payload per inner proof, in rollup order.
    pub offchain_tx_data: Vec<Vec<u8>>,
    /// DeFi interaction results settled in this block.
    pub interaction_result: Vec<DefiInteractionResult>,
    /// Opaque provider timestamp. Passed through; never interpreted.
    pub created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_proof(proof_id: u32) -> [u8; INNER_PROOF_SIZE] {
        let mut bytes = [0u8; INNER_PROOF_SIZE];
        BigEndian::write_u32(&mut bytes[28..32], proof_id);
        bytes[32] = 0x11; // note commitment 1
        bytes[64] = 0x22; // note commitment 2
        bytes[96] = 0x33; // nullifier 1
        bytes[128] = 0x44; // nullifier 2
        BigEndian::write_u32(&mut bytes[188..192], 1000); // public value
        bytes[204] = 0xaa; // public owner
        BigEndian::write_u32(&mut bytes[252..256], 3); // asset id
        bytes
    }

    #[test]
    fn inner_proof_field_extraction() {
        let proof = InnerProofData::from_bytes(&encoded_proof(1)).unwrap();
        assert_eq!(proof.proof_id, ProofId::Deposit);
        assert_eq!(proof.note_commitment_1.0[0], 0x11);
        assert_eq!(proof.note_commitment_2.0[0], 0x22);
        assert_eq!(proof.nullifier_1.0[0], 0x33);
        assert_eq!(proof.nullifier_2.0[0], 0x44);
        assert_eq!(proof.public_value(), BigUint::from(1000u32));
        assert_eq!(proof.asset_id(), 3);
        assert!(proof.public_owner().is_some());
    }

    #[test]
    fn tx_id_depends_on_content() {
        let a = InnerProofData::from_bytes(&encoded_proof(1)).unwrap();
        let b = InnerProofData::from_bytes(&encoded_proof(2)).unwrap();
        assert_ne!(a.tx_id, b.tx_id);
    }

    #[test]
    fn unknown_proof_id_is_rejected() {
        assert!(matches!(
            InnerProofData::from_bytes(&encoded_proof(9)),
            Err(ProofError::UnknownProofId(9))
        ));
    }

    #[test]
    fn rollup_decode_round_trip() {
        let mut bytes = Vec::new();
        let mut header = [0u8; 96];
        BigEndian::write_u32(&mut header[28..32], 5); // rollup id
        BigEndian::write_u32(&mut header[60..64], 64); // data start index
        BigEndian::write_u32(&mut header[92..96], 2); // num txs
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&encoded_proof(1));
        bytes.extend_from_slice(&encoded_proof(0));

        let rollup = RollupProofData::decode(&bytes).unwrap();
        assert_eq!(rollup.rollup_id, 5);
        assert_eq!(rollup.data_start_index, 64);
        assert_eq!(rollup.inner_proofs.len(), 2);
        assert_eq!(rollup.inner_proofs[0].proof_id, ProofId::Deposit);
        assert_eq!(rollup.inner_proofs[1].proof_id, ProofId::Padding);
    }

    #[test]
    fn truncated_rollup_is_rejected() {
        let mut header = [0u8; 96];
        BigEndian::write_u32(&mut header[92..96], 1);
        assert!(matches!(
            RollupProofData::decode(&header),
            Err(ProofError::TruncatedRollup { .. })
        ));
    }
}
