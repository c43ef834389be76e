use super::{ChangeSignal, ValidatorSet};
use crate::chain::{ChainHeaderReader, KeyValueStore, Receipt, StateDb};
use crate::error::Error;
use crate::types::{Address, Header};

const BACKEND_KEY: &[u8] = b"validatorset/simple_list";

/// A fixed list of validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleList {
    validators: Vec<Address>,
}

impl SimpleList {
    pub fn new(validators: Vec<Address>) -> Self {
        Self { validators }
    }
}

impl ValidatorSet for SimpleList {
    /// Only the first block of the set announces it; the change is final
    /// immediately.
    fn signal_to_change(
        &self,
        first: bool,
        _receipts: &[Receipt],
        _header: &Header,
        _chain: &dyn ChainHeaderReader,
        _db: &dyn KeyValueStore,
    ) -> ChangeSignal {
        ChangeSignal {
            validators: self.validators.clone(),
            changed: first,
            finalized: first,
        }
    }

    fn finalize_change(&self, _header: &Header, _state: &mut dyn StateDb) -> Result<(), Error> {
        Ok(())
    }

    fn validators_by_caller(&self, _number: u64) -> Vec<Address> {
        self.validators.clone()
    }

    fn count_validators(&self) -> Result<usize, Error> {
        Ok(self.validators.len())
    }

    fn prepare_backend(
        &self,
        _header: &Header,
        _chain: &dyn ChainHeaderReader,
        db: &dyn KeyValueStore,
    ) -> Result<(), Error> {
        db.put(BACKEND_KEY, &self.validators.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::{MemoryChain, MemoryStore};

    #[test]
    fn signals_only_on_first_block() {
        let list = SimpleList::new(vec![[1u8; 20], [2u8; 20]]);
        let chain = MemoryChain::default();
        let db = MemoryStore::default();
        let header = Header::default();

        let first = list.signal_to_change(true, &[], &header, &chain, &db);
        assert!(first.changed && first.finalized);
        assert_eq!(first.validators.len(), 2);

        let later = list.signal_to_change(false, &[], &header, &chain, &db);
        assert!(!later.changed);
        assert_eq!(list.count_validators().expect("count"), 2);
    }

    #[test]
    fn prepare_backend_persists_list() {
        let list = SimpleList::new(vec![[1u8; 20], [2u8; 20]]);
        let db = MemoryStore::default();
        list.prepare_backend(&Header::default(), &MemoryChain::default(), &db)
            .expect("prepare backend");
        let stored = db.get(BACKEND_KEY).expect("stored list");
        assert_eq!(stored.len(), 40);
        assert_eq!(&stored[20..], &[2u8; 20]);
    }
}
