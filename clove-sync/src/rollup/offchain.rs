//! Off-chain transaction payloads.
//!
//! Each inner proof is published alongside a fixed-size off-chain payload the
//! rollup does not verify: viewing-key ciphertexts for join-splits, key
//! material for account proofs and bridge parameters for DeFi deposits.

use num_bigint::BigUint;

use crate::error::ProofError;
use crate::primitives::{AliasHash, BridgeId, PublicKey, ALIAS_HASH_SIZE, PUBLIC_KEY_SIZE};

/// Byte length of one viewing-key ciphertext.
pub const VIEWING_KEY_SIZE: usize = 144;

/// Opaque viewing-key ciphertext of one output note.
#[derive(Clone, PartialEq, Eq)]
pub struct ViewingKey(pub [u8; VIEWING_KEY_SIZE]);

impl ViewingKey {
    fn from_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self(
            bytes
                .get(..VIEWING_KEY_SIZE)?
                .try_into()
                .expect("sliced to viewing key size"),
        ))
    }
}

impl std::fmt::Debug for ViewingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ViewingKey(..)")
    }
}

/// Off-chain payload of a deposit, withdraw or send proof: one viewing key
/// per output note.
#[derive(Debug, Clone)]
pub struct OffchainJoinSplitData {
    /// Ciphertext of the first output note.
    pub viewing_key_1: ViewingKey,
    /// Ciphertext of the second output note.
    pub viewing_key_2: ViewingKey,
}

impl OffchainJoinSplitData {
    /// Encoded payload length.
    pub const SIZE: usize = 2 * VIEWING_KEY_SIZE;

    /// Decodes a join-split payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() != Self::SIZE {
            return Err(ProofError::InvalidOffchainData {
                kind: "join-split",
                expected: Self::SIZE,
                found: bytes.len(),
            });
        }

        Ok(Self {
            viewing_key_1: ViewingKey::from_slice(bytes).expect("length checked"),
            viewing_key_2: ViewingKey::from_slice(&bytes[VIEWING_KEY_SIZE..])
                .expect("length checked"),
        })
    }
}

/// Off-chain payload of an account proof.
#[derive(Debug, Clone)]
pub struct OffchainAccountData {
    /// Public key of the account the proof operates on.
    pub account_public_key: PublicKey,
    /// Alias hash registered by the proof.
    pub alias_hash: AliasHash,
    /// Account nonce the alias is registered under.
    pub account_nonce: u32,
    /// First spending key added, all-zero when absent.
    pub spending_key_1: [u8; 32],
    /// Second spending key added, all-zero when absent.
    pub spending_key_2: [u8; 32],
}

impl OffchainAccountData {
    /// Encoded payload length.
    pub const SIZE: usize = PUBLIC_KEY_SIZE + ALIAS_HASH_SIZE + 4 + 32 + 32;

    /// Decodes an account payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() != Self::SIZE {
            return Err(ProofError::InvalidOffchainData {
                kind: "account",
                expected: Self::SIZE,
                found: bytes.len(),
            });
        }

        let mut offset = 0;
        let account_public_key = PublicKey::from_slice(&bytes[offset..]).expect("length checked");
        offset += PUBLIC_KEY_SIZE;
        let alias_hash = AliasHash::from_slice(&bytes[offset..]).expect("length checked");
        offset += ALIAS_HASH_SIZE;
        let account_nonce =
            u32::from_be_bytes(bytes[offset..offset + 4].try_into().expect("length checked"));
        offset += 4;
        let spending_key_1 = bytes[offset..offset + 32].try_into().expect("length checked");
        offset += 32;
        let spending_key_2 = bytes[offset..offset + 32].try_into().expect("length checked");

        Ok(Self {
            account_public_key,
            alias_hash,
            account_nonce,
            spending_key_1,
            spending_key_2,
        })
    }
}

/// Off-chain payload of a DeFi deposit proof.
///
/// Carries one viewing key: the first output is a claim note owned by the
/// protocol, only the change note is encrypted to the user.
#[derive(Debug, Clone)]
pub struct OffchainDefiDepositData {
    /// Bridge the deposit feeds.
    pub bridge_id: BridgeId,
    /// Value handed to the bridge.
    pub deposit_value: BigUint,
    /// Ephemeral key the partial-state secret is derived from.
    pub partial_state_secret_eph_pub_key: PublicKey,
    /// Ciphertext of the change note.
    pub viewing_key: ViewingKey,
}

impl OffchainDefiDepositData {
    /// Encoded payload length.
    pub const SIZE: usize = 32 + 32 + PUBLIC_KEY_SIZE + VIEWING_KEY_SIZE;

    /// Decodes a DeFi deposit payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() != Self::SIZE {
            return Err(ProofError::InvalidOffchainData {
                kind: "defi deposit",
                expected: Self::SIZE,
                found: bytes.len(),
            });
        }

        let mut offset = 0;
        let bridge_id = BridgeId::from_slice(bytes).expect("length checked");
        offset += 32;
        let deposit_value = BigUint::from_bytes_be(&bytes[offset..offset + 32]);
        offset += 32;
        let partial_state_secret_eph_pub_key =
            PublicKey::from_slice(&bytes[offset..]).expect("length checked");
        offset += PUBLIC_KEY_SIZE;
        let viewing_key = ViewingKey::from_slice(&bytes[offset..]).expect("length checked");

        Ok(Self {
            bridge_id,
            deposit_value,
            partial_state_secret_eph_pub_key,
            viewing_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_split_payload_round_trip() {
        let mut bytes = vec![0u8; OffchainJoinSplitData::SIZE];
        bytes[0] = 1;
        bytes[VIEWING_KEY_SIZE] = 2;

        let data = OffchainJoinSplitData::from_bytes(&bytes).unwrap();
        assert_eq!(data.viewing_key_1.0[0], 1);
        assert_eq!(data.viewing_key_2.0[0], 2);

        assert!(OffchainJoinSplitData::from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn account_payload_round_trip() {
        let mut bytes = vec![0u8; OffchainAccountData::SIZE];
        bytes[0] = 0xaa; // public key
        bytes[PUBLIC_KEY_SIZE] = 0xbb; // alias hash
        bytes[PUBLIC_KEY_SIZE + ALIAS_HASH_SIZE + 3] = 2; // nonce
        bytes[PUBLIC_KEY_SIZE + ALIAS_HASH_SIZE + 4] = 0xcc; // spending key 1

        let data = OffchainAccountData::from_bytes(&bytes).unwrap();
        assert_eq!(data.account_public_key.0[0], 0xaa);
        assert_eq!(data.alias_hash.0[0], 0xbb);
        assert_eq!(data.account_nonce, 2);
        assert_eq!(data.spending_key_1[0], 0xcc);
        assert_eq!(data.spending_key_2, [0u8; 32]);
    }

    #[test]
    fn defi_deposit_payload_round_trip() {
        let mut bytes = vec![0u8; OffchainDefiDepositData::SIZE];
        bytes[..32].copy_from_slice(&BridgeId::new(1, 0, 2, 0).0);
        bytes[63] = 100; // deposit value
        bytes[64] = 0xee; // eph pub key

        let data = OffchainDefiDepositData::from_bytes(&bytes).unwrap();
        assert_eq!(data.bridge_id.bridge_address_id(), 1);
        assert_eq!(data.deposit_value, BigUint::from(100u32));
        assert_eq!(data.partial_state_secret_eph_pub_key.0[0], 0xee);
    }
}
