//! Interfaces of the chain, state and storage collaborators.

use crate::error::Error;
use crate::types::{Address, Hash, Header};
use serde::{Deserialize, Serialize};

/// Read access to the canonical header chain.
pub trait ChainHeaderReader: Send + Sync {
    fn current_header(&self) -> Option<Header>;
    fn header_by_number(&self, number: u64) -> Option<Header>;
    fn header(&self, hash: &Hash, number: u64) -> Option<Header>;
}

/// Opaque persistence handle passed through to validator sets.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;
}

/// Account storage touched when a validator change is finalized.
pub trait StateDb {
    fn get_state(&self, address: &Address, key: &Hash) -> Hash;
    fn set_state(&mut self, address: &Address, key: Hash, value: Hash);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub status: u64,
    pub logs: Vec<Log>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Headers indexed by hash and number.
    #[derive(Default)]
    pub(crate) struct MemoryChain {
        headers: Mutex<Vec<Header>>,
    }

    impl MemoryChain {
        pub(crate) fn push(&self, header: Header) {
            self.headers.lock().push(header);
        }
    }

    impl ChainHeaderReader for MemoryChain {
        fn current_header(&self) -> Option<Header> {
            self.headers.lock().last().cloned()
        }

        fn header_by_number(&self, number: u64) -> Option<Header> {
            self.headers
                .lock()
                .iter()
                .find(|header| header.number == number)
                .cloned()
        }

        fn header(&self, hash: &Hash, number: u64) -> Option<Header> {
            self.headers
                .lock()
                .iter()
                .find(|header| header.number == number && header.hash() == *hash)
                .cloned()
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryStore(Mutex<HashMap<Vec<u8>, Vec<u8>>>);

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
            self.0.lock().get(key).cloned()
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
            self.0.lock().insert(key.to_vec(), value.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryState(HashMap<(Address, Hash), Hash>);

    impl StateDb for MemoryState {
        fn get_state(&self, address: &Address, key: &Hash) -> Hash {
            self.0.get(&(*address, *key)).copied().unwrap_or_default()
        }

        fn set_state(&mut self, address: &Address, key: Hash, value: Hash) {
            self.0.insert((*address, key), value);
        }
    }

    #[test]
    fn memory_chain_lookups() {
        let chain = MemoryChain::default();
        assert!(chain.current_header().is_none());
        let genesis = Header::default();
        let child = Header {
            parent_hash: genesis.hash(),
            number: 1,
            ..Default::default()
        };
        chain.push(genesis.clone());
        chain.push(child.clone());

        assert_eq!(chain.current_header(), Some(child.clone()));
        assert_eq!(chain.header_by_number(0), Some(genesis.clone()));
        assert_eq!(chain.header(&genesis.hash(), 0), Some(genesis));
        assert!(chain.header(&child.hash(), 0).is_none());
    }
}
