//! Byte-level primitive types shared across the sync engine.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

/// Length in bytes of a serialized curve point.
pub const PUBLIC_KEY_SIZE: usize = 64;
/// Length in bytes of an alias hash.
pub const ALIAS_HASH_SIZE: usize = 28;

macro_rules! bytes32_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; 32]);

            /// Returns true if every byte is zero.
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|byte| *byte == 0)
            }

            /// Reads a value from the start of `bytes`.
            ///
            /// Returns `None` if fewer than 32 bytes are available.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                Some(Self(bytes.get(..32)?.try_into().expect("sliced to 32 bytes")))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

bytes32_newtype!(
    /// On-chain hash representing a note.
    Commitment
);
bytes32_newtype!(
    /// One-way function of a note and its owner's private key, revealed on spend.
    Nullifier
);
bytes32_newtype!(
    /// Identifier of one inner proof (user transaction) within a rollup.
    TxHash
);

/// A serialized curve point identifying an account key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// The identity placeholder.
    pub const ZERO: Self = Self([0u8; PUBLIC_KEY_SIZE]);

    /// The x-coordinate half of the point.
    #[must_use]
    pub fn x(&self) -> [u8; 32] {
        self.0[..32].try_into().expect("fixed split")
    }

    /// Reads a key from the start of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self(
            bytes
                .get(..PUBLIC_KEY_SIZE)?
                .try_into()
                .expect("sliced to key size"),
        ))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // keys are long; the x-coordinate is enough to identify one in logs
        write!(f, "{}", hex::encode(self.x()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

/// A private decryption/nullification key. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(pub [u8; 32]);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// Hash of a human-readable account alias.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasHash(pub [u8; ALIAS_HASH_SIZE]);

impl AliasHash {
    /// Reads an alias hash from the start of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self(
            bytes
                .get(..ALIAS_HASH_SIZE)?
                .try_into()
                .expect("sliced to alias hash size"),
        ))
    }
}

impl fmt::Display for AliasHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AliasHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AliasHash({})", self)
    }
}

/// An L1 address, decoded from the last 20 bytes of a 32-byte wire field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthAddress(pub [u8; 20]);

impl EthAddress {
    /// Decodes the address carried in a 32-byte proof field.
    ///
    /// Returns `None` when the field is all zero (no owner on the wire).
    pub fn from_field(field: &[u8; 32]) -> Option<Self> {
        if field.iter().all(|byte| *byte == 0) {
            None
        } else {
            Some(Self(field[12..].try_into().expect("fixed split")))
        }
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self)
    }
}

/// Packed 32-byte descriptor of a DeFi bridge: which adapter it is and which
/// asset ids flow in and out of the interaction.
///
/// Big-endian u32 lanes, from the low end of the buffer:
/// bridge address id at 28..32, input asset id at 24..28, output asset A at
/// 20..24, output asset B at 16..20.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BridgeId(pub [u8; 32]);

impl BridgeId {
    /// Packs a bridge descriptor from its lanes.
    #[must_use]
    pub fn new(
        bridge_address_id: u32,
        input_asset_id: u32,
        output_asset_id_a: u32,
        output_asset_id_b: u32,
    ) -> Self {
        let mut bytes = [0u8; 32];
        BigEndian::write_u32(&mut bytes[28..32], bridge_address_id);
        BigEndian::write_u32(&mut bytes[24..28], input_asset_id);
        BigEndian::write_u32(&mut bytes[20..24], output_asset_id_a);
        BigEndian::write_u32(&mut bytes[16..20], output_asset_id_b);
        Self(bytes)
    }

    /// Reads a bridge id from the start of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.get(..32)?.try_into().expect("sliced to 32 bytes")))
    }

    /// Identifier of the bridge adapter contract.
    #[must_use]
    pub fn bridge_address_id(&self) -> u32 {
        BigEndian::read_u32(&self.0[28..32])
    }

    /// Asset consumed by the interaction.
    #[must_use]
    pub fn input_asset_id(&self) -> u32 {
        BigEndian::read_u32(&self.0[24..28])
    }

    /// First output asset.
    #[must_use]
    pub fn output_asset_id_a(&self) -> u32 {
        BigEndian::read_u32(&self.0[20..24])
    }

    /// Second output asset, meaningful only when the interaction yields two.
    #[must_use]
    pub fn output_asset_id_b(&self) -> u32 {
        BigEndian::read_u32(&self.0[16..20])
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bridge {} ({} -> {}/{})",
            self.bridge_address_id(),
            self.input_asset_id(),
            self.output_asset_id_a(),
            self.output_asset_id_b(),
        )
    }
}

impl fmt::Debug for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BridgeId({})", self)
    }
}

/// Identity of one account view: a public key plus the account nonce it was
/// registered under. The same key at a different nonce is a different user.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId {
    /// Account public key.
    pub public_key: PublicKey,
    /// Account nonce, bumped on account migration.
    pub account_nonce: u32,
}

impl AccountId {
    /// Constructs an account id from its parts.
    #[must_use]
    pub fn new(public_key: PublicKey, account_nonce: u32) -> Self {
        Self {
            public_key,
            account_nonce,
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.public_key, self.account_nonce)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}
