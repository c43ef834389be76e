//! Seal production and verification for a hybrid proof-of-work /
//! proof-of-stake block engine.
//!
//! A [`SealEngine`] verifies seals in one of four modes (see [`SealMode`]) and
//! hands candidate blocks to external workers through a
//! [`RemoteWorkCoordinator`]. In slot mode the signer for every slot comes
//! from the [`EpochConsensusStore`]; validator sets changing by block height
//! are routed through [`validatorset::Multi`].

pub mod api;
pub mod cache;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod hashrate;
pub mod pow;
pub mod remote;
pub mod seal;
pub mod time;
pub mod types;
pub mod validatorset;
pub mod verify;

pub use api::Api;
pub use cache::BoundedLru;
pub use chain::{ChainHeaderReader, KeyValueStore, Log, Receipt, StateDb};
pub use config::{EngineConfig, EngineConfigBuilder, SealMode};
pub use crypto::{PublicKey, SecretKey, Signature};
pub use engine::SealEngine;
pub use epoch::{EpochConsensusStore, EpochInfo};
pub use error::Error;
pub use hashrate::HashrateTracker;
pub use pow::{Blake3Pow, PowFunction, PowVerifier};
pub use remote::{ChannelNotifier, RemoteWorkCoordinator, WorkNotifier};
pub use seal::SlotSeal;
pub use time::{SystemTimeProvider, TimeProvider};
pub use types::{
    Address, Block, BlockNonce, Hash, HashRateSample, Header, SealSubmission, WorkPackage,
};
pub use verify::{SealVerifier, SlotSealVerifier};
