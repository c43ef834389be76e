//! Legacy proof-of-work seal checking.
//!
//! The hash function itself is an opaque collaborator behind [`PowFunction`];
//! this module owns the dataset cache and the hash-below-target rule.

use crate::cache::BoundedLru;
use crate::error::Error;
use crate::types::{Hash, Header};
use std::sync::Arc;

/// Blocks per dataset epoch.
pub const DATASET_EPOCH_LENGTH: u64 = 30_000;

/// Opaque proof-of-work function backed by per-epoch dataset material.
pub trait PowFunction: Send + Sync {
    /// Build the verification material for one dataset epoch.
    fn generate(&self, epoch: u64, seed: &Hash) -> Vec<u8>;

    /// Return `(mix_digest, result)` for `seal_hash` and `nonce`.
    fn compute(&self, material: &[u8], seal_hash: &Hash, nonce: u64) -> (Hash, Hash);
}

/// Default BLAKE3-based memory-walk function.
#[derive(Debug, Clone, Copy)]
pub struct Blake3Pow {
    material_len: usize,
    accesses: usize,
}

impl Blake3Pow {
    pub fn new(material_len: usize, accesses: usize) -> Self {
        Self {
            material_len: material_len.max(32),
            accesses: accesses.max(1),
        }
    }
}

impl Default for Blake3Pow {
    fn default() -> Self {
        Self::new(64 * 1024, 64)
    }
}

impl PowFunction for Blake3Pow {
    fn generate(&self, epoch: u64, seed: &Hash) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"slotseal:dataset:v1|");
        hasher.update(seed);
        hasher.update(&epoch.to_le_bytes());
        let mut material = vec![0u8; self.material_len - self.material_len % 32];
        hasher.finalize_xof().fill(&mut material);
        material
    }

    fn compute(&self, material: &[u8], seal_hash: &Hash, nonce: u64) -> (Hash, Hash) {
        let pages = (material.len() / 32).max(1);
        let mut hasher = blake3::Hasher::new();
        hasher.update(seal_hash);
        hasher.update(&nonce.to_le_bytes());
        let mut mix: Hash = hasher.finalize().into();

        for _ in 0..self.accesses {
            let mut index = [0u8; 8];
            index.copy_from_slice(&mix[..8]);
            let page = (u64::from_le_bytes(index) % pages as u64) as usize * 32;
            let chunk = material.get(page..page + 32).unwrap_or_default();
            let mut hasher = blake3::Hasher::new();
            hasher.update(&mix);
            hasher.update(chunk);
            mix = hasher.finalize().into();
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(seal_hash);
        hasher.update(&nonce.to_le_bytes());
        hasher.update(&mix);
        (mix, hasher.finalize().into())
    }
}

/// Seed hash for a dataset epoch: BLAKE3 applied `epoch` times to zero.
pub fn seed_hash(epoch: u64) -> Hash {
    let mut seed = [0u8; 32];
    for _ in 0..epoch {
        seed = blake3::hash(&seed).into();
    }
    seed
}

pub fn dataset_epoch(number: u64, epoch_length: u64) -> u64 {
    number / epoch_length.max(1)
}

/// Big-endian `floor((2^256 - 1) / difficulty)`.
pub fn target_from_difficulty(difficulty: u64) -> Result<Hash, Error> {
    if difficulty == 0 {
        return Err(Error::InvalidDifficulty);
    }
    let divisor = difficulty as u128;
    let mut target = [0u8; 32];
    let mut remainder = 0u128;
    for byte in target.iter_mut() {
        let acc = (remainder << 8) | 0xff;
        *byte = (acc / divisor) as u8;
        remainder = acc % divisor;
    }
    Ok(target)
}

/// Whether `result` interpreted big-endian is at most `target`.
pub fn meets_target(result: &Hash, target: &Hash) -> bool {
    result <= target
}

/// Verifies hash-below-target seals, caching dataset material by epoch.
pub struct PowVerifier {
    pow: Arc<dyn PowFunction>,
    datasets: BoundedLru<u64, Arc<Vec<u8>>>,
    epoch_length: u64,
}

impl PowVerifier {
    pub fn new(
        pow: Arc<dyn PowFunction>,
        cache_capacity: usize,
        epoch_length: u64,
    ) -> Result<Self, Error> {
        if epoch_length == 0 {
            return Err(Error::InvalidConfig(
                "dataset_epoch_length must be >= 1".into(),
            ));
        }
        Ok(Self {
            pow,
            datasets: BoundedLru::new("dataset", cache_capacity)?,
            epoch_length,
        })
    }

    /// Dataset material for the epoch containing block `number`.
    pub fn dataset(&self, number: u64) -> Arc<Vec<u8>> {
        let epoch = dataset_epoch(number, self.epoch_length);
        self.datasets.get_or_insert_with(epoch, |&epoch| {
            tracing::debug!(epoch, "generating dataset material");
            Arc::new(self.pow.generate(epoch, &seed_hash(epoch)))
        })
    }

    pub fn seed_hash_for(&self, number: u64) -> Hash {
        seed_hash(dataset_epoch(number, self.epoch_length))
    }

    /// Compute `(mix_digest, result)` for a header and nonce.
    pub fn compute(&self, header: &Header, nonce: u64) -> (Hash, Hash) {
        let material = self.dataset(header.number);
        self.pow.compute(&material, &header.seal_hash(), nonce)
    }

    pub fn verify(&self, header: &Header) -> Result<(), Error> {
        let target = target_from_difficulty(header.difficulty)?;
        let (mix, result) = self.compute(header, u64::from_be_bytes(header.nonce));
        if mix != header.mix_digest {
            return Err(Error::InvalidMixDigest);
        }
        if !meets_target(&result, &target) {
            return Err(Error::InvalidPow);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn small_pow() -> Arc<dyn PowFunction> {
        Arc::new(Blake3Pow::new(1024, 8))
    }

    /// Search nonces until the header meets its difficulty.
    pub(crate) fn mine(verifier: &PowVerifier, header: &Header) -> (u64, Hash) {
        let target = target_from_difficulty(header.difficulty).expect("target");
        (0u64..)
            .find_map(|nonce| {
                let (mix, result) = verifier.compute(header, nonce);
                meets_target(&result, &target).then_some((nonce, mix))
            })
            .expect("nonce space exhausted")
    }

    #[test]
    fn target_divides_max_value() {
        assert_eq!(target_from_difficulty(1).expect("target"), [0xff; 32]);
        let half = target_from_difficulty(2).expect("target");
        assert_eq!(half[0], 0x7f);
        assert!(half[1..].iter().all(|b| *b == 0xff));
        let t = target_from_difficulty(256).expect("target");
        assert_eq!(t[0], 0x00);
        assert_eq!(t[1], 0xff);
        assert!(matches!(target_from_difficulty(0), Err(Error::InvalidDifficulty)));
    }

    #[test]
    fn seed_hash_chains() {
        assert_eq!(seed_hash(0), [0u8; 32]);
        let one: Hash = blake3::hash(&[0u8; 32]).into();
        assert_eq!(seed_hash(1), one);
        assert_eq!(seed_hash(2), <Hash>::from(blake3::hash(&one)));
    }

    #[test]
    fn dataset_is_cached_per_epoch() {
        let verifier = PowVerifier::new(small_pow(), 2, 10).expect("verifier");
        let a = verifier.dataset(3);
        let b = verifier.dataset(9);
        assert!(Arc::ptr_eq(&a, &b));
        let c = verifier.dataset(10);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn mined_header_verifies_and_tampering_fails() {
        let verifier = PowVerifier::new(small_pow(), 2, DATASET_EPOCH_LENGTH).expect("verifier");
        let mut header = Header {
            number: 5,
            difficulty: 64,
            time: 10,
            ..Default::default()
        };
        let (nonce, mix) = mine(&verifier, &header);
        header.nonce = nonce.to_be_bytes();
        header.mix_digest = mix;
        verifier.verify(&header).expect("mined header verifies");

        let mut bad_mix = header.clone();
        bad_mix.mix_digest[0] ^= 1;
        assert!(matches!(verifier.verify(&bad_mix), Err(Error::InvalidMixDigest)));

        let mut zero = header.clone();
        zero.difficulty = 0;
        assert!(matches!(verifier.verify(&zero), Err(Error::InvalidDifficulty)));
    }
}
