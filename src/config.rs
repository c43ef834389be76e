use crate::error::Error;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// How seals are produced and checked. Fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealMode {
    /// Hash-below-target proof-of-work.
    #[default]
    Pow,
    /// Epoch/slot BLS signatures.
    Slot,
    /// Accept every seal except at `fake_fail`.
    Fake,
    /// Accept every seal.
    FullFake,
}

/// Engine configuration.
///
/// Durations are whole seconds.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned", default)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: SealMode,
    /// Block number rejected in `Fake` mode.
    pub fake_fail: Option<u64>,

    pub remote_enabled: bool,
    pub request_queue_capacity: usize,
    /// Issued works this many blocks behind the candidate are forgotten.
    pub stale_threshold: u64,
    pub hashrate_window: u64,
    pub max_remote_workers: u64,

    pub validator_set_size: usize,
    pub slot_duration: u64,
    /// Allowed clock skew around a slot's window.
    pub slot_tolerance: u64,
    pub epoch_cache_capacity: usize,

    pub dataset_cache_capacity: usize,
    pub dataset_epoch_length: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: SealMode::Pow,
            fake_fail: None,
            remote_enabled: true,
            request_queue_capacity: 16,
            stale_threshold: 7,
            hashrate_window: 10,
            max_remote_workers: 1024,
            validator_set_size: 32,
            slot_duration: 6,
            slot_tolerance: 2,
            epoch_cache_capacity: 12,
            dataset_cache_capacity: 3,
            dataset_epoch_length: crate::pow::DATASET_EPOCH_LENGTH,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.request_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "request_queue_capacity must be >= 1".into(),
            ));
        }
        if self.hashrate_window == 0 {
            return Err(Error::InvalidConfig("hashrate_window must be >= 1".into()));
        }
        if self.validator_set_size == 0 {
            return Err(Error::InvalidConfig(
                "validator_set_size must be >= 1".into(),
            ));
        }
        if self.slot_duration == 0 {
            return Err(Error::InvalidConfig("slot_duration must be >= 1".into()));
        }
        if self.epoch_cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "epoch_cache_capacity must be >= 1".into(),
            ));
        }
        if self.dataset_cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "dataset_cache_capacity must be >= 1".into(),
            ));
        }
        if self.dataset_epoch_length == 0 {
            return Err(Error::InvalidConfig(
                "dataset_epoch_length must be >= 1".into(),
            ));
        }
        if self.mode != SealMode::Fake && self.fake_fail.is_some() {
            return Err(Error::InvalidConfig(
                "fake_fail is only meaningful in fake mode".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document; missing fields take defaults.
    pub fn from_json(document: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(document).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl EngineConfigBuilder {
    pub fn build_validated(self) -> Result<EngineConfig, Error> {
        let config = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
