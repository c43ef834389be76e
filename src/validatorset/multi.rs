use super::{ChangeSignal, ValidatorSet};
use crate::chain::{ChainHeaderReader, KeyValueStore, Receipt, StateDb};
use crate::error::Error;
use crate::types::{Address, Header};
use std::sync::Arc;

/// A validator set and the first block it governs.
#[derive(Clone)]
pub struct ValidatorSetBinding {
    pub activation: u64,
    pub set: Arc<dyn ValidatorSet>,
}

impl ValidatorSetBinding {
    pub fn new(activation: u64, set: Arc<dyn ValidatorSet>) -> Self {
        Self { activation, set }
    }
}

/// Routes every call to the validator set active at the block's height.
///
/// Bindings are kept sorted by activation height; one must start at block 0
/// and no two may share a height.
pub struct Multi {
    bindings: Vec<ValidatorSetBinding>,
}

impl Multi {
    pub fn new(bindings: impl IntoIterator<Item = ValidatorSetBinding>) -> Result<Self, Error> {
        let mut bindings: Vec<_> = bindings.into_iter().collect();
        bindings.sort_by_key(|binding| binding.activation);
        if bindings.first().map(|binding| binding.activation) != Some(0) {
            return Err(Error::InvalidState(
                "a validator set must be active from block 0".into(),
            ));
        }
        if let Some(pair) = bindings
            .windows(2)
            .find(|pair| pair[0].activation == pair[1].activation)
        {
            return Err(Error::InvalidState(format!(
                "two validator sets activate at block {}",
                pair[0].activation
            )));
        }
        Ok(Self { bindings })
    }

    pub fn activations(&self) -> impl Iterator<Item = u64> + '_ {
        self.bindings.iter().map(|binding| binding.activation)
    }

    /// The set with the greatest activation height `<= number`.
    pub fn resolve_for_height(&self, number: u64) -> (&Arc<dyn ValidatorSet>, u64) {
        let index = self
            .bindings
            .partition_point(|binding| binding.activation <= number);
        let binding = &self.bindings[index.saturating_sub(1)];
        tracing::debug!(number, activation = binding.activation, "validator set resolved");
        (&binding.set, binding.activation)
    }
}

impl ValidatorSet for Multi {
    /// `first` is recomputed from the activation table.
    fn signal_to_change(
        &self,
        _first: bool,
        receipts: &[Receipt],
        header: &Header,
        chain: &dyn ChainHeaderReader,
        db: &dyn KeyValueStore,
    ) -> ChangeSignal {
        let (set, activation) = self.resolve_for_height(header.number);
        let first = activation == header.number;
        set.signal_to_change(first, receipts, header, chain, db)
    }

    fn finalize_change(&self, header: &Header, state: &mut dyn StateDb) -> Result<(), Error> {
        let (set, _) = self.resolve_for_height(header.number);
        set.finalize_change(header, state)
    }

    fn validators_by_caller(&self, number: u64) -> Vec<Address> {
        let (set, _) = self.resolve_for_height(number);
        set.validators_by_caller(number)
    }

    fn count_validators(&self) -> Result<usize, Error> {
        Err(Error::NotSupported(
            "count_validators is not defined across validator sets",
        ))
    }

    fn prepare_backend(
        &self,
        header: &Header,
        chain: &dyn ChainHeaderReader,
        db: &dyn KeyValueStore,
    ) -> Result<(), Error> {
        let (set, _) = self.resolve_for_height(header.number);
        set.prepare_backend(header, chain, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::{MemoryChain, MemoryState, MemoryStore};
    use crate::validatorset::SimpleList;
    use parking_lot::Mutex;

    /// Records the `first` flag and heights it is called with.
    struct Recording {
        tag: u8,
        calls: Mutex<Vec<(bool, u64)>>,
    }

    impl Recording {
        fn new(tag: u8) -> Arc<Self> {
            Arc::new(Self {
                tag,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ValidatorSet for Recording {
        fn signal_to_change(
            &self,
            first: bool,
            _receipts: &[Receipt],
            header: &Header,
            _chain: &dyn ChainHeaderReader,
            _db: &dyn KeyValueStore,
        ) -> ChangeSignal {
            self.calls.lock().push((first, header.number));
            ChangeSignal {
                validators: vec![[self.tag; 20]],
                changed: first,
                finalized: false,
            }
        }

        fn finalize_change(&self, header: &Header, state: &mut dyn StateDb) -> Result<(), Error> {
            state.set_state(&[self.tag; 20], [0u8; 32], [header.number as u8; 32]);
            Ok(())
        }

        fn validators_by_caller(&self, _number: u64) -> Vec<Address> {
            vec![[self.tag; 20]]
        }

        fn count_validators(&self) -> Result<usize, Error> {
            Ok(1)
        }

        fn prepare_backend(
            &self,
            header: &Header,
            _chain: &dyn ChainHeaderReader,
            db: &dyn KeyValueStore,
        ) -> Result<(), Error> {
            db.put(&[self.tag], &header.number.to_be_bytes())
        }
    }

    fn three_sets() -> (Multi, [Arc<Recording>; 3]) {
        let sets = [Recording::new(1), Recording::new(2), Recording::new(3)];
        let multi = Multi::new([
            ValidatorSetBinding::new(500, sets[2].clone()),
            ValidatorSetBinding::new(0, sets[0].clone()),
            ValidatorSetBinding::new(100, sets[1].clone()),
        ])
        .expect("multi");
        (multi, sets)
    }

    #[test]
    fn resolves_greatest_activation_at_or_below_height() {
        let (multi, _) = three_sets();
        assert_eq!(multi.activations().collect::<Vec<_>>(), vec![0, 100, 500]);
        let expected = [
            (0, 0),
            (99, 0),
            (100, 100),
            (499, 100),
            (500, 500),
            (10_000, 500),
        ];
        for (number, activation) in expected {
            assert_eq!(multi.resolve_for_height(number).1, activation, "height {number}");
        }
        assert_eq!(multi.validators_by_caller(250), vec![[2u8; 20]]);
        assert_eq!(multi.validators_by_caller(u64::MAX), vec![[3u8; 20]]);
    }

    #[test]
    fn first_block_flag_is_recomputed() {
        let (multi, sets) = three_sets();
        let chain = MemoryChain::default();
        let db = MemoryStore::default();
        for number in [0u64, 1, 100, 101, 500] {
            let header = Header {
                number,
                ..Default::default()
            };
            multi.signal_to_change(number == 1, &[], &header, &chain, &db);
        }
        assert_eq!(*sets[0].calls.lock(), vec![(true, 0), (false, 1)]);
        assert_eq!(*sets[1].calls.lock(), vec![(true, 100), (false, 101)]);
        assert_eq!(*sets[2].calls.lock(), vec![(true, 500)]);
    }

    #[test]
    fn finalize_and_prepare_forward_by_height() {
        let (multi, _) = three_sets();
        let mut state = MemoryState::default();
        let header = Header {
            number: 120,
            ..Default::default()
        };
        multi
            .finalize_change(&header, &mut state)
            .expect("finalize");
        assert_eq!(state.get_state(&[2u8; 20], &[0u8; 32]), [120u8; 32]);
        assert_eq!(state.get_state(&[1u8; 20], &[0u8; 32]), [0u8; 32]);

        let db = MemoryStore::default();
        multi
            .prepare_backend(&header, &MemoryChain::default(), &db)
            .expect("prepare backend");
        assert_eq!(db.get(&[2u8]), Some(120u64.to_be_bytes().to_vec()));
        assert!(db.get(&[1u8]).is_none());
    }

    #[test]
    fn count_is_not_supported() {
        let (multi, _) = three_sets();
        assert!(matches!(multi.count_validators(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn construction_requires_genesis_binding_and_unique_heights() {
        let list: Arc<dyn ValidatorSet> = Arc::new(SimpleList::new(vec![[9u8; 20]]));
        let err = Multi::new([ValidatorSetBinding::new(10, list.clone())])
            .err()
            .expect("no genesis binding");
        assert!(matches!(err, Error::InvalidState(_)));

        let err = Multi::new(Vec::new()).err().expect("empty bindings");
        assert!(matches!(err, Error::InvalidState(_)));

        let err = Multi::new([
            ValidatorSetBinding::new(0, list.clone()),
            ValidatorSetBinding::new(50, list.clone()),
            ValidatorSetBinding::new(50, list.clone()),
        ])
        .err()
        .expect("duplicate height");
        assert!(matches!(err, Error::InvalidState(_)));

        let multi = Multi::new([ValidatorSetBinding::new(0, list)]).expect("single set");
        assert_eq!(multi.validators_by_caller(7), vec![[9u8; 20]]);
    }
}
