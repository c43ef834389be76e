use crate::cache::BoundedLru;
use crate::crypto::PublicKey;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// Validator rotation for one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub epoch: u64,
    pub validators: Vec<PublicKey>,
    /// Unix seconds.
    pub epoch_start: u64,
    /// Seconds.
    pub slot_duration: u64,
}

impl EpochInfo {
    pub fn new(epoch: u64, slot_duration: u64) -> Self {
        Self {
            epoch,
            validators: Vec::new(),
            epoch_start: 0,
            slot_duration,
        }
    }

    /// Set the start as `genesis + epoch * validator_count * slot_duration`.
    pub fn assign_epoch_start_from_genesis(&mut self, genesis: u64, validator_count: usize) {
        let width = self.slot_duration.saturating_mul(validator_count as u64);
        self.epoch_start = genesis.saturating_add(self.epoch.saturating_mul(width));
    }

    pub fn assign_validators(&mut self, validators: Vec<PublicKey>) {
        self.validators = validators;
    }

    /// Length of the epoch in seconds.
    pub fn width(&self) -> u64 {
        self.slot_duration
            .saturating_mul(self.validators.len() as u64)
    }

    /// Half-open time window covered by this epoch.
    pub fn window(&self) -> Range<u64> {
        self.epoch_start..self.epoch_start.saturating_add(self.width())
    }

    pub fn covers(&self, time: u64) -> bool {
        self.window().contains(&time)
    }

    /// Half-open time window of the slot at position `turn` in this epoch.
    pub fn slot_window(&self, turn: u64) -> Range<u64> {
        let start = self
            .epoch_start
            .saturating_add(turn.saturating_mul(self.slot_duration));
        start..start.saturating_add(self.slot_duration)
    }

    /// Position of the slot containing `time`, if this epoch covers it.
    pub fn turn_at(&self, time: u64) -> Option<u64> {
        self.covers(time)
            .then(|| (time - self.epoch_start) / self.slot_duration.max(1))
    }

    pub fn validator(&self, turn: u64) -> Option<&PublicKey> {
        usize::try_from(turn)
            .ok()
            .and_then(|turn| self.validators.get(turn))
    }
}

/// Per-epoch validator rotation data with LRU eviction.
///
/// Entries are immutable once inserted; readers get shared snapshots.
pub struct EpochConsensusStore {
    validator_set_size: usize,
    slot_duration: u64,
    epochs: BoundedLru<u64, Arc<EpochInfo>>,
}

impl EpochConsensusStore {
    pub fn new(
        validator_set_size: usize,
        slot_duration: u64,
        capacity: usize,
    ) -> Result<Self, Error> {
        if validator_set_size == 0 {
            return Err(Error::InvalidConfig(
                "validator_set_size must be >= 1".into(),
            ));
        }
        if slot_duration == 0 {
            return Err(Error::InvalidConfig("slot_duration must be >= 1".into()));
        }
        Ok(Self {
            validator_set_size,
            slot_duration,
            epochs: BoundedLru::new("epochSet", capacity)?,
        })
    }

    pub fn validator_set_size(&self) -> usize {
        self.validator_set_size
    }

    pub fn slot_duration(&self) -> u64 {
        self.slot_duration
    }

    /// Width of every epoch in seconds.
    pub fn epoch_width(&self) -> u64 {
        self.slot_duration
            .saturating_mul(self.validator_set_size as u64)
    }

    /// Store `info` under `epoch`, evicting the least recently used entry
    /// when full.
    pub fn insert(&self, epoch: u64, info: EpochInfo) -> Result<(), Error> {
        if info.epoch != epoch {
            return Err(Error::InvalidState(format!(
                "epoch info for {} inserted under {epoch}",
                info.epoch
            )));
        }
        if info.validators.len() != self.validator_set_size {
            return Err(Error::InvalidState(format!(
                "epoch {epoch} has {} validators, expected {}",
                info.validators.len(),
                self.validator_set_size
            )));
        }
        if info.slot_duration != self.slot_duration {
            return Err(Error::InvalidState(format!(
                "epoch {epoch} slot duration {} differs from configured {}",
                info.slot_duration, self.slot_duration
            )));
        }
        let width = self.epoch_width();
        let info = Arc::new(info);
        let inserted = self.epochs.add_if(epoch, info.clone(), |entries| {
            for (&other, stored) in entries {
                if other == epoch {
                    if **stored == *info {
                        return Ok(false);
                    }
                } else if overlaps(width, &info, other, stored) {
                    return Err(Error::InvalidState(format!(
                        "epoch {epoch} start {} overlaps stored epoch {other}",
                        info.epoch_start
                    )));
                }
            }
            Ok(true)
        })?;
        if inserted {
            tracing::debug!(epoch, start = info.epoch_start, "inserted epoch consensus info");
        }
        Ok(())
    }

    /// Whether a stored epoch covers `time`.
    pub fn has_coverage(&self, time: u64) -> bool {
        self.epochs.find(|_, info| info.covers(time)).is_some()
    }

    /// Epoch covering `time`. Never blocks; callers poll while data propagates.
    pub fn resolve(&self, time: u64) -> Result<Arc<EpochInfo>, Error> {
        let (epoch, _) = self
            .epochs
            .find(|_, info| info.covers(time))
            .ok_or(Error::EpochNotFound { time })?;
        self.epochs.get(&epoch).ok_or(Error::EpochNotFound { time })
    }

    /// Like [`EpochConsensusStore::get`] without marking the entry as used.
    pub fn peek(&self, epoch: u64) -> Option<Arc<EpochInfo>> {
        self.epochs.peek(&epoch)
    }

    pub fn get(&self, epoch: u64) -> Option<Arc<EpochInfo>> {
        self.epochs.get(&epoch)
    }

    pub fn contains(&self, epoch: u64) -> bool {
        self.epochs.contains(&epoch)
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

/// Whether `info` and the stored epoch `other` break start monotonicity.
fn overlaps(width: u64, info: &EpochInfo, other: u64, stored: &EpochInfo) -> bool {
    if other < info.epoch {
        let gap = (info.epoch - other).saturating_mul(width);
        info.epoch_start < stored.epoch_start.saturating_add(gap)
    } else {
        let gap = (other - info.epoch).saturating_mul(width);
        stored.epoch_start < info.epoch_start.saturating_add(gap)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::SecretKey;

    pub(crate) const SLOT: u64 = 6;
    pub(crate) const N: usize = 4;
    pub(crate) const GENESIS: u64 = 1_600_000_000;

    pub(crate) fn keys(n: usize) -> Vec<SecretKey> {
        (0..n)
            .map(|i| SecretKey::from_ikm(&[i as u8 + 1; 32]).expect("keygen"))
            .collect()
    }

    pub(crate) fn epoch_info(epoch: u64, secret: &[SecretKey]) -> EpochInfo {
        let mut info = EpochInfo::new(epoch, SLOT);
        info.assign_epoch_start_from_genesis(GENESIS, secret.len());
        info.assign_validators(secret.iter().map(SecretKey::public_key).collect());
        info
    }

    fn store(capacity: usize) -> EpochConsensusStore {
        EpochConsensusStore::new(N, SLOT, capacity).expect("store")
    }

    #[test]
    fn epoch_start_follows_genesis() {
        for epoch in 0..8u64 {
            let mut info = EpochInfo::new(epoch, SLOT);
            info.assign_epoch_start_from_genesis(GENESIS, 32);
            assert_eq!(info.epoch_start, GENESIS + epoch * SLOT * 32);
        }
    }

    #[test]
    fn coverage_of_genesis_epoch() {
        let store = store(12);
        store
            .insert(0, epoch_info(0, &keys(N)))
            .expect("insert genesis");
        let width = store.epoch_width();

        assert!(store.has_coverage(GENESIS));
        assert!(store.has_coverage(GENESIS + width / 2));
        assert!(!store.has_coverage(GENESIS - 1));
        assert!(!store.has_coverage(GENESIS + width));
        assert!(!store.has_coverage(GENESIS + 10 * width));
    }

    #[test]
    fn turn_follows_slot_boundaries() {
        let info = epoch_info(1, &keys(N));
        let start = info.epoch_start;
        assert_eq!(info.turn_at(start), Some(0));
        assert_eq!(info.turn_at(start + SLOT - 1), Some(0));
        assert_eq!(info.turn_at(start + SLOT), Some(1));
        assert_eq!(info.turn_at(start + info.width() - 1), Some(N as u64 - 1));
        assert_eq!(info.turn_at(start + info.width()), None);
        assert_eq!(info.turn_at(start - 1), None);
        assert_eq!(info.slot_window(2), start + 2 * SLOT..start + 3 * SLOT);
    }

    #[test]
    fn resolves_each_inserted_epoch() {
        let store = store(12);
        let secret = keys(N);
        for epoch in 0..8u64 {
            let info = epoch_info(epoch, &secret);
            store.insert(epoch, info.clone()).expect("insert");
            let resolved = store.resolve(info.epoch_start + 5).expect("resolve");
            assert_eq!(resolved.epoch, epoch);
            assert_eq!(*resolved, info);
        }
        let err = store
            .resolve(GENESIS + 8 * store.epoch_width())
            .expect_err("beyond last epoch");
        assert!(matches!(err, Error::EpochNotFound { .. }));
    }

    #[test]
    fn insert_is_idempotent_and_evicts_lru() {
        let store = store(2);
        let secret = keys(N);
        store.insert(0, epoch_info(0, &secret)).expect("insert 0");
        store.insert(0, epoch_info(0, &secret)).expect("insert 0 again");
        assert_eq!(store.len(), 1);

        store.insert(1, epoch_info(1, &secret)).expect("insert 1");
        store.get(0).expect("touch 0");
        store.insert(2, epoch_info(2, &secret)).expect("insert 2");
        assert!(store.contains(0));
        assert!(!store.contains(1));
        assert!(store.contains(2));
    }

    #[test]
    fn rejects_inconsistent_epochs() {
        let store = store(12);
        let secret = keys(N);

        let err = store
            .insert(1, epoch_info(0, &secret))
            .expect_err("index mismatch");
        assert!(matches!(err, Error::InvalidState(_)));

        let err = store
            .insert(0, epoch_info(0, &keys(N - 1)))
            .expect_err("short validator list");
        assert!(matches!(err, Error::InvalidState(_)));

        store.insert(0, epoch_info(0, &secret)).expect("insert 0");
        let mut early = epoch_info(1, &secret);
        early.epoch_start = GENESIS + 1;
        let err = store.insert(1, early).expect_err("overlapping start");
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn starts_are_monotonic_across_epochs() {
        let store = store(12);
        let secret = keys(N);
        for epoch in [3u64, 0, 5, 1] {
            store.insert(epoch, epoch_info(epoch, &secret)).expect("insert");
        }
        let stored: Vec<_> = [0u64, 1, 3, 5]
            .iter()
            .map(|e| store.get(*e).expect("stored"))
            .collect();
        for pair in stored.windows(2) {
            assert!(pair[1].epoch_start >= pair[0].epoch_start + pair[0].width());
        }
    }

    #[test]
    fn concurrent_conflicting_inserts_keep_one() {
        use std::sync::Barrier;
        use std::thread;

        let secret = Arc::new(keys(N));
        for _ in 0..200 {
            let store = Arc::new(store(12));
            let barrier = Arc::new(Barrier::new(2));
            let width = store.epoch_width();
            let writers: Vec<_> = [1u64, 2]
                .into_iter()
                .map(|epoch| {
                    let (store, barrier, secret) = (store.clone(), barrier.clone(), secret.clone());
                    thread::spawn(move || {
                        let mut info = epoch_info(epoch, &secret);
                        info.epoch_start = GENESIS + width;
                        barrier.wait();
                        store.insert(epoch, info).is_ok()
                    })
                })
                .collect();
            let accepted = writers
                .into_iter()
                .map(|writer| writer.join().expect("join"))
                .filter(|ok| *ok)
                .count();
            assert_eq!(accepted, 1);
            assert_eq!(store.len(), 1);
        }
    }

    #[test]
    fn epoch_info_parses_from_json() {
        let info = epoch_info(2, &keys(N));
        let json = serde_json::to_string(&info).expect("serialize");
        assert!(json.contains("\"epochStart\""));
        let back: EpochInfo = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, info);
    }
}
