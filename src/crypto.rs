//! Thin wrappers around `blst` min-pk BLS signatures (48-byte public keys,
//! 96-byte signatures).

use crate::error::Error;
use crate::types::{from_hex, to_hex, SignatureBytes};
use blst::min_pk;
use blst::BLST_ERROR;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Domain separation tag for seal signatures (proof-of-possession scheme).
pub const SEAL_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";
pub const PUBLIC_KEY_LEN: usize = 48;
pub const SIGNATURE_LEN: usize = 96;
/// Prefix of the signature copied into the header's mix digest.
pub const COMPRESSED_SEAL_LEN: usize = 32;

#[derive(Clone)]
pub struct SecretKey(min_pk::SecretKey);

impl SecretKey {
    /// Generate a key from 32 bytes of OS randomness.
    pub fn random() -> Result<Self, Error> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        Self::from_ikm(&ikm)
    }

    /// Derive a key from input keying material (at least 32 bytes).
    pub fn from_ikm(ikm: &[u8]) -> Result<Self, Error> {
        min_pk::SecretKey::key_gen(ikm, &[])
            .map(Self)
            .map_err(|err| Error::InvalidState(format!("bls key generation failed: {err:?}")))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message, SEAL_DST, &[]))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Clone)]
pub struct PublicKey(min_pk::PublicKey);

impl PublicKey {
    /// Parse and subgroup-check a compressed public key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        min_pk::PublicKey::key_validate(bytes)
            .map(Self)
            .map_err(|err| Error::InvalidState(format!("invalid bls public key: {err:?}")))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.compress()
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.to_bytes())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = from_hex(&encoded).map_err(serde::de::Error::custom)?;
        PublicKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone)]
pub struct Signature(min_pk::Signature);

impl Signature {
    /// Parse a compressed signature, rejecting points outside the subgroup.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        min_pk::Signature::sig_validate(bytes, true)
            .map(Self)
            .map_err(|err| Error::MalformedSeal(format!("invalid bls signature: {err:?}")))
    }

    pub fn to_bytes(&self) -> SignatureBytes {
        self.0.compress()
    }

    pub fn verify(&self, signer: &PublicKey, message: &[u8]) -> bool {
        self.0.verify(false, message, SEAL_DST, &[], &signer.0, false) == BLST_ERROR::BLST_SUCCESS
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", to_hex(&self.to_bytes()))
    }
}

/// The 32-byte commitment stored in a header's mix digest for a signature.
pub fn compressed_seal(signature: &SignatureBytes) -> [u8; COMPRESSED_SEAL_LEN] {
    let mut out = [0u8; COMPRESSED_SEAL_LEN];
    out.copy_from_slice(&signature[..COMPRESSED_SEAL_LEN]);
    out
}
