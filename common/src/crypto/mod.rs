use std::fmt;
use std::str::FromStr;

use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

pub const KEY_SIZE: usize = 32;
// Solana-style keypair encoding: 32 byte seed followed by the 32 byte public key
pub const KEYPAIR_SIZE: usize = 64;

// Domain tags for deterministic derivations
const PROGRAM_ADDRESS_TAG: &[u8] = b"custos:multisig:v1";
const CREATE_KEY_TAG: &[u8] = b"custos:create-key:v1";
const PUBLIC_DERIVE_TAG: &[u8] = b"custos:public:v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid base58 encoding")]
    InvalidBase58,
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// A 32 byte account address, displayed in base58.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; KEY_SIZE]);

impl Address {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            expected: KEY_SIZE,
            got: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| CryptoError::InvalidBase58)?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A signing key held in process memory.
///
/// The public half is carried alongside the seed so that a keypair decoded
/// from its 64 byte form round-trips without a signature scheme dependency.
#[derive(Clone)]
pub struct Keypair {
    seed: [u8; KEY_SIZE],
    public: Address,
}

impl Keypair {
    /// Decode a base58 keypair. Accepts the 64 byte seed+public form or a
    /// bare 32 byte seed, in which case the public half is derived.
    pub fn from_base58(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| CryptoError::InvalidBase58)?;
        match bytes.len() {
            KEYPAIR_SIZE => {
                let mut seed = [0u8; KEY_SIZE];
                seed.copy_from_slice(&bytes[..KEY_SIZE]);
                let public = Address::from_bytes(&bytes[KEY_SIZE..])?;
                Ok(Self { seed, public })
            }
            KEY_SIZE => {
                let mut seed = [0u8; KEY_SIZE];
                seed.copy_from_slice(&bytes);
                let public = derive_public(&seed);
                Ok(Self { seed, public })
            }
            got => Err(CryptoError::InvalidLength {
                expected: KEYPAIR_SIZE,
                got,
            }),
        }
    }

    pub fn generate() -> Self {
        use rand::RngCore;

        let mut seed = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut seed);
        let public = derive_public(&seed);
        Self { seed, public }
    }

    pub fn address(&self) -> Address {
        self.public
    }

    pub fn to_base58(&self) -> String {
        let mut bytes = [0u8; KEYPAIR_SIZE];
        bytes[..KEY_SIZE].copy_from_slice(&self.seed);
        bytes[KEY_SIZE..].copy_from_slice(self.public.as_bytes());
        bs58::encode(bytes).into_string()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose the seed
        write!(f, "Keypair({})", self.public)
    }
}

fn derive_public(seed: &[u8; KEY_SIZE]) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(PUBLIC_DERIVE_TAG);
    hasher.update(seed);
    Address::new(hasher.finalize().into())
}

/// Deterministic create key for a multisig assembled from a member set.
/// Two provisioning calls over the same members always agree on it.
pub fn derive_create_key(members: &[Address]) -> Address {
    let mut sorted: Vec<&Address> = members.iter().collect();
    sorted.sort();

    let mut hasher = Sha3_256::new();
    hasher.update(CREATE_KEY_TAG);
    for member in sorted {
        hasher.update(member.as_bytes());
    }
    Address::new(hasher.finalize().into())
}

/// Program-derived address of a multisig, unique per create key.
pub fn derive_program_address(create_key: &Address) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(PROGRAM_ADDRESS_TAG);
    hasher.update(create_key.as_bytes());
    Address::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_base58_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let address = Address::new([7u8; KEY_SIZE]);
        let encoded = address.to_string();
        let decoded: Address = encoded.parse()?;
        assert_eq!(address, decoded);
        Ok(())
    }

    #[test]
    fn address_rejects_wrong_length() {
        // 16 bytes of data is not a valid address
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(short.parse::<Address>().is_err());
        assert!("not-base58-0OIl".parse::<Address>().is_err());
    }

    #[test]
    fn keypair_roundtrip_keeps_public_half() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = Keypair::generate();
        let decoded = Keypair::from_base58(&keypair.to_base58())?;
        assert_eq!(keypair.address(), decoded.address());
        Ok(())
    }

    #[test]
    fn seed_only_keypair_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let encoded = bs58::encode([9u8; KEY_SIZE]).into_string();
        let a = Keypair::from_base58(&encoded)?;
        let b = Keypair::from_base58(&encoded)?;
        assert_eq!(a.address(), b.address());
        Ok(())
    }

    #[test]
    fn program_address_is_deterministic_per_member_set() {
        let m1 = Address::new([1u8; KEY_SIZE]);
        let m2 = Address::new([2u8; KEY_SIZE]);

        let forward = derive_create_key(&[m1, m2]);
        let reversed = derive_create_key(&[m2, m1]);
        // Member ordering must not change the derivation
        assert_eq!(forward, reversed);

        let pda = derive_program_address(&forward);
        assert_eq!(pda, derive_program_address(&forward));
        assert_ne!(pda, forward);

        let other = derive_create_key(&[m1]);
        assert_ne!(forward, other);
    }
}
