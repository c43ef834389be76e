//! Consensus metadata carried in a header's `extra` field in slot mode.
//!
//! Layout is an RLP list `[slot, epoch, turn]`, optionally followed by a
//! 96-byte compressed BLS signature as a fourth item.

use crate::crypto::{compressed_seal, SIGNATURE_LEN};
use crate::error::Error;
use crate::types::{fixed_at, Hash, Header, SignatureBytes};
use rlp::{Rlp, RlpStream};

const UNSEALED_ITEMS: usize = 3;
const SEALED_ITEMS: usize = 4;

/// Decoded slot metadata of a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSeal {
    pub slot: u64,
    pub epoch: u64,
    pub turn: u64,
    pub signature: Option<SignatureBytes>,
}

impl SlotSeal {
    pub fn new(slot: u64, epoch: u64, turn: u64) -> Self {
        Self {
            slot,
            epoch,
            turn,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: SignatureBytes) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Same metadata with the signature removed.
    pub fn unsealed(&self) -> Self {
        Self::new(self.slot, self.epoch, self.turn)
    }

    pub fn is_sealed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self.slot, self.epoch, self.turn, self.signature.as_ref())
    }
}

pub fn encode(slot: u64, epoch: u64, turn: u64, signature: Option<&SignatureBytes>) -> Vec<u8> {
    let mut s = match signature {
        Some(_) => RlpStream::new_list(SEALED_ITEMS),
        None => RlpStream::new_list(UNSEALED_ITEMS),
    };
    s.append(&slot).append(&epoch).append(&turn);
    if let Some(signature) = signature {
        s.append(&signature.as_slice());
    }
    s.out().to_vec()
}

pub fn decode(extra: &[u8]) -> Result<SlotSeal, Error> {
    let rlp = Rlp::new(extra);
    if !rlp.is_list() {
        return Err(Error::MalformedSeal("extra data is not a list".into()));
    }
    let info = rlp.payload_info()?;
    if info.total() != extra.len() {
        return Err(Error::MalformedSeal("trailing bytes after seal".into()));
    }
    let items = rlp.item_count()?;
    let signature = match items {
        UNSEALED_ITEMS => None,
        SEALED_ITEMS => {
            let bytes: [u8; SIGNATURE_LEN] = fixed_at(&rlp, 3).map_err(|_| {
                Error::MalformedSeal(format!("signature must be {SIGNATURE_LEN} bytes"))
            })?;
            Some(bytes)
        }
        other => {
            return Err(Error::MalformedSeal(format!(
                "expected {UNSEALED_ITEMS} or {SEALED_ITEMS} items, found {other}"
            )))
        }
    };
    Ok(SlotSeal {
        slot: rlp.val_at(0)?,
        epoch: rlp.val_at(1)?,
        turn: rlp.val_at(2)?,
        signature,
    })
}

/// Seal hash of a slot-mode header: the header hashed with its `extra`
/// re-encoded without the signature.
pub fn pre_seal_hash(header: &Header, seal: &SlotSeal) -> Hash {
    if !seal.is_sealed() {
        return header.seal_hash();
    }
    let mut unsealed = header.clone();
    unsealed.extra = seal.unsealed().encode();
    unsealed.seal_hash()
}

/// Write `signature` into both the `extra` field and the mix digest.
pub fn apply_signature(header: &mut Header, seal: &SlotSeal, signature: SignatureBytes) {
    header.extra = seal.unsealed().with_signature(signature).encode();
    header.mix_digest = compressed_seal(&signature);
}
