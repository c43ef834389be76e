use crate::api::Api;
use crate::chain::ChainHeaderReader;
use crate::config::{EngineConfig, SealMode};
use crate::epoch::{EpochConsensusStore, EpochInfo};
use crate::error::Error;
use crate::hashrate::HashrateTracker;
use crate::pow::PowFunction;
use crate::remote::{RemoteWorkCoordinator, WorkNotifier};
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::types::{Block, Hash, Header, WorkPackage};
use crate::verify::SealVerifier;
use flume::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Sealing engine: seal verification plus remote work distribution.
pub struct SealEngine {
    config: EngineConfig,
    verifier: Arc<SealVerifier>,
    hashrate: Arc<HashrateTracker>,
    clock: Arc<dyn TimeProvider>,
    remote: Option<RemoteWorkCoordinator>,
}

impl SealEngine {
    pub fn new(
        config: EngineConfig,
        pow: Arc<dyn PowFunction>,
        notifier: Option<Arc<dyn WorkNotifier>>,
    ) -> Result<Self, Error> {
        Self::with_clock(config, pow, notifier, Arc::new(SystemTimeProvider))
    }

    pub fn with_clock(
        config: EngineConfig,
        pow: Arc<dyn PowFunction>,
        notifier: Option<Arc<dyn WorkNotifier>>,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let verifier = Arc::new(SealVerifier::from_config(&config, pow)?);
        let hashrate = Arc::new(HashrateTracker::new(
            config.max_remote_workers,
            config.hashrate_window,
        ));
        let remote = if config.remote_enabled {
            Some(RemoteWorkCoordinator::start(
                verifier.clone(),
                hashrate.clone(),
                clock.clone(),
                notifier,
                config.request_queue_capacity,
                config.stale_threshold,
            )?)
        } else {
            None
        };
        tracing::info!(mode = ?config.mode, remote = config.remote_enabled, "seal engine started");
        Ok(Self {
            config,
            verifier,
            hashrate,
            clock,
            remote,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> SealMode {
        self.config.mode
    }

    pub fn verifier(&self) -> &SealVerifier {
        &self.verifier
    }

    pub fn remote(&self) -> Result<&RemoteWorkCoordinator, Error> {
        self.remote
            .as_ref()
            .ok_or(Error::NotSupported("remote sealing is disabled"))
    }

    fn store(&self) -> Result<&Arc<EpochConsensusStore>, Error> {
        self.verifier.store().ok_or_else(|| {
            Error::InvalidState(format!("{:?} mode has no epoch data", self.config.mode))
        })
    }

    /// Check the parent is known and, in slot mode, write the unsealed slot
    /// metadata for `header.time`.
    pub fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut Header) -> Result<(), Error> {
        let parent_number = header.number.checked_sub(1).ok_or(Error::UnknownAncestor)?;
        if chain.header(&header.parent_hash, parent_number).is_none() {
            return Err(Error::UnknownAncestor);
        }
        if let SealVerifier::Slot(slot) = self.verifier.as_ref() {
            slot.prepare(header)?;
        }
        Ok(())
    }

    /// Hand `block` to remote workers. Sealed blocks arrive on `results`.
    pub fn seal(&self, block: Block, results: Sender<Block>) -> Result<WorkPackage, Error> {
        self.remote()?.push_work(block, results)
    }

    pub fn verify_seal(&self, header: &Header) -> Result<(), Error> {
        self.verifier.verify(header)
    }

    pub fn seal_hash(&self, header: &Header) -> Hash {
        self.verifier.seal_hash(header)
    }

    pub fn insert_epoch_info(&self, epoch: u64, info: EpochInfo) -> Result<(), Error> {
        self.store()?.insert(epoch, info)
    }

    pub fn is_epoch_info_present_for_time(&self, time: u64) -> bool {
        self.store()
            .map(|store| store.has_coverage(time))
            .unwrap_or(false)
    }

    pub fn epoch_info_for(&self, header: &Header) -> Result<Arc<EpochInfo>, Error> {
        self.store()?.resolve(header.time)
    }

    /// Poll for epoch data covering `time`, sleeping `backoff` between at
    /// most `attempts` lookups.
    pub fn wait_for_epoch_info(
        &self,
        time: u64,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Arc<EpochInfo>, Error> {
        let store = self.store()?;
        let mut last = Error::EpochNotFound { time };
        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                thread::sleep(backoff);
            }
            match store.resolve(time) {
                Ok(info) => return Ok(info),
                Err(err) => {
                    tracing::debug!(time, attempt, "epoch info not yet available");
                    last = err;
                }
            }
        }
        Err(last)
    }

    pub fn set_local_hashrate(&self, rate: u64) {
        self.hashrate.set_local(rate);
    }

    pub fn hashrate(&self) -> u64 {
        self.hashrate.total(self.clock.now_seconds())
    }

    pub fn api(&self) -> Api<'_> {
        Api::new(self)
    }

    pub fn close(&self) {
        if let Some(remote) = &self.remote {
            remote.close();
        }
    }
}
