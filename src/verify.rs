use crate::config::{EngineConfig, SealMode};
use crate::crypto::{compressed_seal, Signature};
use crate::epoch::EpochConsensusStore;
use crate::error::Error;
use crate::pow::{target_from_difficulty, PowFunction, PowVerifier};
use crate::seal::{self, SlotSeal};
use crate::types::{to_hex, Hash, Header, SealSubmission, WorkPackage};
use std::sync::Arc;

/// Checks BLS seals against the validator expected for the header's slot.
///
/// Verification never mutates shared state; any number of callers may run
/// it concurrently against the same store.
pub struct SlotSealVerifier {
    store: Arc<EpochConsensusStore>,
    tolerance: u64,
}

impl SlotSealVerifier {
    pub fn new(store: Arc<EpochConsensusStore>, tolerance: u64) -> Self {
        Self { store, tolerance }
    }

    pub fn store(&self) -> &Arc<EpochConsensusStore> {
        &self.store
    }

    /// Range and consistency checks that need no epoch data.
    fn check_turn(&self, seal: &SlotSeal) -> Result<(), Error> {
        let validators = self.store.validator_set_size();
        let size = validators as u64;
        if seal.turn >= size {
            return Err(Error::TurnOutOfRange {
                turn: seal.turn,
                validators,
            });
        }
        let position = match seal.slot.checked_sub(seal.epoch.saturating_mul(size)) {
            Some(position) if position < size => position,
            Some(position) => {
                return Err(Error::TurnOutOfRange {
                    turn: position,
                    validators,
                })
            }
            None => {
                return Err(Error::TurnOutOfRange {
                    turn: seal.slot,
                    validators,
                })
            }
        };
        if position != seal.turn {
            return Err(Error::MalformedSeal(format!(
                "turn {} does not match slot {} of epoch {}",
                seal.turn, seal.slot, seal.epoch
            )));
        }
        Ok(())
    }

    pub fn verify(&self, header: &Header) -> Result<(), Error> {
        let seal = seal::decode(&header.extra)?;
        let signature_bytes = seal
            .signature
            .ok_or_else(|| Error::MalformedSeal("header is not sealed".into()))?;
        self.check_turn(&seal)?;

        // The declared epoch owns the slot window, so tolerance also applies
        // across epoch boundaries.
        let info = match self.store.peek(seal.epoch) {
            Some(info) => info,
            None => self.store.resolve(header.time)?,
        };
        let window = info.slot_window(seal.turn);
        let too_early = header.time.saturating_add(self.tolerance) < window.start;
        let too_late = header.time >= window.end.saturating_add(self.tolerance);
        if seal.epoch != info.epoch || too_early || too_late {
            return Err(Error::StaleOrFutureSlot {
                slot: seal.slot,
                time: header.time,
                window_start: window.start,
                window_end: window.end,
            });
        }

        let signer = info.validator(seal.turn).ok_or(Error::TurnOutOfRange {
            turn: seal.turn,
            validators: info.validators.len(),
        })?;
        if header.mix_digest != compressed_seal(&signature_bytes) {
            return Err(Error::MalformedSeal(
                "mix digest does not commit to the signature".into(),
            ));
        }

        let seal_hash = seal::pre_seal_hash(header, &seal);
        let signature = Signature::from_bytes(&signature_bytes)?;
        if !signature.verify(signer, &seal_hash) {
            return Err(Error::InvalidSignature {
                signer: signer.to_hex(),
                seal_hash: to_hex(&seal_hash),
                header_hash: to_hex(&header.hash()),
            });
        }
        Ok(())
    }

    /// Write the unsealed slot metadata for `header.time` into `header.extra`.
    pub fn prepare(&self, header: &mut Header) -> Result<SlotSeal, Error> {
        let info = self.store.resolve(header.time)?;
        let turn = info
            .turn_at(header.time)
            .ok_or(Error::EpochNotFound { time: header.time })?;
        let size = self.store.validator_set_size() as u64;
        let slot = info.epoch.saturating_mul(size).saturating_add(turn);
        let seal = SlotSeal::new(slot, info.epoch, turn);
        header.extra = seal.encode();
        Ok(seal)
    }
}

/// The single seal verification entry point, selected by configuration.
pub enum SealVerifier {
    Pow(PowVerifier),
    Slot(SlotSealVerifier),
    Fake { fail: Option<u64> },
    FullFake,
}

impl SealVerifier {
    pub fn from_config(config: &EngineConfig, pow: Arc<dyn PowFunction>) -> Result<Self, Error> {
        Ok(match config.mode {
            SealMode::Pow => SealVerifier::Pow(PowVerifier::new(
                pow,
                config.dataset_cache_capacity,
                config.dataset_epoch_length,
            )?),
            SealMode::Slot => {
                let store = EpochConsensusStore::new(
                    config.validator_set_size,
                    config.slot_duration,
                    config.epoch_cache_capacity,
                )?;
                SealVerifier::Slot(SlotSealVerifier::new(Arc::new(store), config.slot_tolerance))
            }
            SealMode::Fake => SealVerifier::Fake {
                fail: config.fake_fail,
            },
            SealMode::FullFake => SealVerifier::FullFake,
        })
    }

    pub fn verify(&self, header: &Header) -> Result<(), Error> {
        match self {
            SealVerifier::Pow(pow) => pow.verify(header),
            SealVerifier::Slot(slot) => slot.verify(header),
            SealVerifier::Fake { fail } if *fail == Some(header.number) => Err(Error::InvalidPow),
            SealVerifier::Fake { .. } | SealVerifier::FullFake => Ok(()),
        }
    }

    /// The hash a sealer commits to.
    pub fn seal_hash(&self, header: &Header) -> Hash {
        if let SealVerifier::Slot(_) = self {
            if let Ok(seal) = seal::decode(&header.extra) {
                return seal::pre_seal_hash(header, &seal);
            }
        }
        header.seal_hash()
    }

    pub fn store(&self) -> Option<&Arc<EpochConsensusStore>> {
        match self {
            SealVerifier::Slot(slot) => Some(slot.store()),
            _ => None,
        }
    }

    /// Build the package handed to external workers for `header`.
    pub fn work_package(&self, header: &Header) -> Result<WorkPackage, Error> {
        let seal_hash = self.seal_hash(header);
        let (secondary, payload) = match self {
            SealVerifier::Slot(_) => (header.receipt_hash, header.encode()),
            SealVerifier::Pow(pow) => (
                pow.seed_hash_for(header.number),
                target_from_difficulty(header.difficulty)?.to_vec(),
            ),
            SealVerifier::Fake { .. } | SealVerifier::FullFake => (
                crate::pow::seed_hash(0),
                target_from_difficulty(header.difficulty.max(1))?.to_vec(),
            ),
        };
        Ok(WorkPackage {
            seal_hash,
            secondary,
            payload,
            number: header.number,
        })
    }

    /// Apply a worker's submission to `header`, producing the sealed header.
    pub fn apply_submission(
        &self,
        header: &Header,
        submission: &SealSubmission,
    ) -> Result<Header, Error> {
        let mut sealed = header.clone();
        sealed.nonce = submission.nonce;
        match self {
            SealVerifier::Slot(_) => {
                let signature = submission
                    .signature
                    .ok_or_else(|| Error::MalformedSeal("signature required in slot mode".into()))?;
                let seal = seal::decode(&header.extra)?;
                seal::apply_signature(&mut sealed, &seal, signature);
            }
            _ => sealed.mix_digest = submission.mix_digest,
        }
        Ok(sealed)
    }
}
