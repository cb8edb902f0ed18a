//! Deposit Commitments
//!
//! Implements the Poseidon-based commitment hash used by the pool.
//!
//! ```text
//! commitment     = Poseidon(DOMAIN_COMMITMENT, n[0..31], s[0..31])
//! nullifier_hash = Poseidon(DOMAIN_NULLIFIER, n[0..31])
//! node           = Poseidon(DOMAIN_NODE, left, right)
//! ```
//!
//! Nullifier and secret are 31-byte little-endian integers, so each fits in a
//! single BN254 scalar without modular reduction. The nullifier hash never
//! absorbs the secret: publishing it at withdrawal time reveals nothing about
//! the commitment it belongs to.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInteger, PrimeField};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Width of the nullifier and the secret
pub const SCALAR_BYTES: usize = 31;

/// Width of `nullifier ‖ secret`
pub const PREIMAGE_BYTES: usize = 2 * SCALAR_BYTES;

const DOMAIN_COMMITMENT: u64 = 0x434f_4d4d; // "COMM"
const DOMAIN_NULLIFIER: u64 = 0x4e55_4c4c; // "NULL"
const DOMAIN_NODE: u64 = 0x4e4f_4445; // "NODE"

/// Poseidon parameters, derived once per process.
static POSEIDON: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(poseidon_config);

/// Encode a field element as 32 big-endian bytes
pub(crate) fn field_to_bytes(f: Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut arr = [0u8; 32];
    arr[32 - bytes.len()..].copy_from_slice(&bytes);
    arr
}

fn parse_hex32(s: &str) -> Result<[u8; 32], hex::FromHexError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let mut arr = [0u8; 32];
    hex::decode_to_slice(digits, &mut arr)?;
    Ok(arr)
}

/// A deposit commitment (32 bytes, big-endian field element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Create commitment from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(f))
    }

    /// Convert to field element
    pub fn to_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed, 64 hex characters
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Public hash of a deposit's nullifier, marked spent on-chain at withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(pub [u8; 32]);

impl NullifierHash {
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(f))
    }

    pub fn to_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for NullifierHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

/// Commitment hash over the BN254 scalar field
#[derive(Clone, Copy)]
pub struct CommitmentScheme {
    config: &'static PoseidonConfig<Fr>,
}

impl CommitmentScheme {
    pub fn new() -> Self {
        Self { config: &POSEIDON }
    }

    /// C = Poseidon(COMM, nullifier, secret)
    pub fn commit(&self, nullifier: &[u8; SCALAR_BYTES], secret: &[u8; SCALAR_BYTES]) -> Commitment {
        let mut preimage = [0u8; PREIMAGE_BYTES];
        preimage[..SCALAR_BYTES].copy_from_slice(nullifier);
        preimage[SCALAR_BYTES..].copy_from_slice(secret);
        Commitment::from_field(self.hash(DOMAIN_COMMITMENT, &preimage))
    }

    /// Nh = Poseidon(NULL, nullifier)
    pub fn nullifier_hash(&self, nullifier: &[u8; SCALAR_BYTES]) -> NullifierHash {
        NullifierHash::from_field(self.hash(DOMAIN_NULLIFIER, nullifier))
    }

    /// Two-ary mode used for tree nodes
    pub fn hash_pair(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut sponge = PoseidonSponge::new(self.config);
        sponge.absorb(&Fr::from(DOMAIN_NODE));
        sponge.absorb(&Fr::from_be_bytes_mod_order(left));
        sponge.absorb(&Fr::from_be_bytes_mod_order(right));
        let result: Fr = sponge.squeeze_field_elements(1)[0];
        field_to_bytes(result)
    }

    /// Absorb `bytes` as 31-byte little-endian limbs behind a domain tag
    fn hash(&self, domain: u64, bytes: &[u8]) -> Fr {
        let mut sponge = PoseidonSponge::new(self.config);
        sponge.absorb(&Fr::from(domain));
        for limb in bytes.chunks(SCALAR_BYTES) {
            sponge.absorb(&Fr::from_le_bytes_mod_order(limb));
        }
        sponge.squeeze_field_elements(1)[0]
    }
}

impl Default for CommitmentScheme {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniformly random 248-bit scalar, little-endian
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; SCALAR_BYTES] {
    let mut bytes = [0u8; SCALAR_BYTES];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// Secret deposit material together with its public commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub nullifier: [u8; SCALAR_BYTES],
    pub secret: [u8; SCALAR_BYTES],
    pub commitment: Commitment,
    pub nullifier_hash: NullifierHash,
}

impl Deposit {
    /// Fresh deposit drawn from `rng`
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let nullifier = random_scalar(rng);
        let secret = random_scalar(rng);
        Self::from_parts(nullifier, secret)
    }

    /// Fresh deposit drawn from the operating system RNG
    pub fn random() -> Self {
        Self::new(&mut OsRng)
    }

    /// Rebuild a deposit, re-deriving commitment and nullifier hash
    pub fn from_parts(nullifier: [u8; SCALAR_BYTES], secret: [u8; SCALAR_BYTES]) -> Self {
        let scheme = CommitmentScheme::new();
        Self {
            commitment: scheme.commit(&nullifier, &secret),
            nullifier_hash: scheme.nullifier_hash(&nullifier),
            nullifier,
            secret,
        }
    }

    /// Split a 62-byte preimage at byte 31
    pub fn from_preimage(preimage: &[u8; PREIMAGE_BYTES]) -> Self {
        let mut nullifier = [0u8; SCALAR_BYTES];
        let mut secret = [0u8; SCALAR_BYTES];
        nullifier.copy_from_slice(&preimage[..SCALAR_BYTES]);
        secret.copy_from_slice(&preimage[SCALAR_BYTES..]);
        Self::from_parts(nullifier, secret)
    }

    /// `nullifier ‖ secret`
    pub fn preimage(&self) -> [u8; PREIMAGE_BYTES] {
        let mut preimage = [0u8; PREIMAGE_BYTES];
        preimage[..SCALAR_BYTES].copy_from_slice(&self.nullifier);
        preimage[SCALAR_BYTES..].copy_from_slice(&self.secret);
        preimage
    }
}

/// Poseidon configuration for Shaker
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2, Capacity: 1
fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = 254;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}
