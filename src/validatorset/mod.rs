//! Validator set implementations and the height-based multiplexer.

use crate::chain::{ChainHeaderReader, KeyValueStore, Receipt, StateDb};
use crate::error::Error;
use crate::types::{Address, Header};

mod multi;
mod simple_list;

pub use multi::{Multi, ValidatorSetBinding};
pub use simple_list::SimpleList;

/// Outcome of asking a validator set whether it changes at a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSignal {
    pub validators: Vec<Address>,
    pub changed: bool,
    pub finalized: bool,
}

/// A source of eligible signers.
pub trait ValidatorSet: Send + Sync {
    fn signal_to_change(
        &self,
        first: bool,
        receipts: &[Receipt],
        header: &Header,
        chain: &dyn ChainHeaderReader,
        db: &dyn KeyValueStore,
    ) -> ChangeSignal;

    fn finalize_change(&self, header: &Header, state: &mut dyn StateDb) -> Result<(), Error>;

    fn validators_by_caller(&self, number: u64) -> Vec<Address>;

    fn count_validators(&self) -> Result<usize, Error>;

    fn prepare_backend(
        &self,
        header: &Header,
        chain: &dyn ChainHeaderReader,
        db: &dyn KeyValueStore,
    ) -> Result<(), Error>;
}
