//! Hex-string surface exposed to external miners and validators.

use crate::engine::SealEngine;
use crate::error::Error;
use crate::types::{from_hex, BlockNonce, Hash, SealSubmission, SignatureBytes};

/// Request handlers over a [`SealEngine`].
///
/// Work is returned as `[seal_hash, secondary, payload, number]`, all
/// `0x`-prefixed hex. Submissions report only accepted or rejected.
#[derive(Clone, Copy)]
pub struct Api<'a> {
    engine: &'a SealEngine,
}

impl<'a> Api<'a> {
    pub fn new(engine: &'a SealEngine) -> Self {
        Self { engine }
    }

    pub fn get_work(&self) -> Result<[String; 4], Error> {
        let work = self.engine.remote()?.fetch_work()?;
        Ok(work.to_hex_array())
    }

    /// Like [`Api::get_work`], but only if the candidate extends
    /// `parent_hash` at `number`.
    pub fn get_sharding_work(&self, parent_hash: Hash, number: u64) -> Result<[String; 4], Error> {
        let work = self
            .engine
            .remote()?
            .fetch_work_with_lineage(&parent_hash, number)?;
        Ok(work.to_hex_array())
    }

    pub fn submit_work(&self, nonce: BlockNonce, hash: Hash, digest: Hash) -> bool {
        let Ok(remote) = self.engine.remote() else {
            return false;
        };
        remote.submit_seal(SealSubmission {
            nonce,
            mix_digest: digest,
            seal_hash: hash,
            signature: None,
        })
    }

    /// Submit a slot seal. `signature` is the hex encoded 96-byte BLS
    /// signature.
    pub fn submit_work_bls(&self, nonce: BlockNonce, hash: Hash, signature: &str) -> bool {
        let Ok(remote) = self.engine.remote() else {
            return false;
        };
        let signature: SignatureBytes = match from_hex(signature)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
        {
            Some(signature) => signature,
            None => {
                tracing::warn!(hash = %crate::types::to_hex(&hash), "malformed seal signature");
                return false;
            }
        };
        remote.submit_seal(SealSubmission {
            nonce,
            mix_digest: crate::crypto::compressed_seal(&signature),
            seal_hash: hash,
            signature: Some(signature),
        })
    }

    pub fn submit_hashrate(&self, rate: u64, id: Hash) -> bool {
        match self.engine.remote() {
            Ok(remote) => remote.submit_hashrate(id, rate).is_ok(),
            Err(_) => false,
        }
    }

    pub fn get_hashrate(&self) -> u64 {
        self.engine.hashrate()
    }
}
