use slotseal::{
    Blake3Pow, Block, ChainHeaderReader, EngineConfigBuilder, EpochInfo, Hash, Header, SealEngine,
    SealMode, SecretKey, TimeProvider, SystemTimeProvider,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const VALIDATORS: usize = 4;
const SLOT_SECONDS: u64 = 6;

/// A chain holding only its genesis header.
struct GenesisOnly(Header);

impl ChainHeaderReader for GenesisOnly {
    fn current_header(&self) -> Option<Header> {
        Some(self.0.clone())
    }

    fn header_by_number(&self, number: u64) -> Option<Header> {
        (number == 0).then(|| self.0.clone())
    }

    fn header(&self, hash: &Hash, number: u64) -> Option<Header> {
        (number == 0 && *hash == self.0.hash()).then(|| self.0.clone())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotseal=debug".into()),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), slotseal::Error> {
    let config = EngineConfigBuilder::default()
        .mode(SealMode::Slot)
        .validator_set_size(VALIDATORS)
        .slot_duration(SLOT_SECONDS)
        .build_validated()?;
    let engine = Arc::new(SealEngine::new(config, Arc::new(Blake3Pow::default()), None)?);

    let keys = (0..VALIDATORS)
        .map(|_| SecretKey::random())
        .collect::<Result<Vec<_>, _>>()?;
    let genesis_time = SystemTimeProvider.now_seconds();
    let mut info = EpochInfo::new(0, SLOT_SECONDS);
    info.assign_epoch_start_from_genesis(genesis_time, VALIDATORS);
    info.assign_validators(keys.iter().map(SecretKey::public_key).collect());
    engine.insert_epoch_info(0, info)?;

    let genesis = GenesisOnly(Header {
        time: genesis_time,
        ..Default::default()
    });
    let mut header = Header {
        parent_hash: genesis.0.hash(),
        number: 1,
        difficulty: 1,
        time: SystemTimeProvider.now_seconds(),
        ..Default::default()
    };
    engine.prepare(&genesis, &mut header)?;
    let turn = engine
        .epoch_info_for(&header)?
        .turn_at(header.time)
        .ok_or(slotseal::Error::EpochNotFound { time: header.time })?;

    let (results_tx, results) = flume::bounded(1);
    engine.seal(Block::new(header), results_tx)?;

    let worker_engine = engine.clone();
    let worker = thread::spawn(move || {
        let api = worker_engine.api();
        let work = api.get_sharding_work([0u8; 32], 1)?;
        println!("work: {work:?}");
        let seal_hash: Hash = slotseal::types::from_hex(&work[0])
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| slotseal::Error::InvalidState("bad seal hash in work".into()))?;
        let signature = keys[turn as usize].sign(&seal_hash).to_bytes();
        let signature = slotseal::types::to_hex(&signature);
        let accepted = api.submit_work_bls([0u8; 8], seal_hash, &signature);
        println!("submission accepted: {accepted}");
        Ok::<_, slotseal::Error>(())
    });
    worker
        .join()
        .map_err(|_| slotseal::Error::InvalidState("worker panicked".into()))??;

    match results.recv_timeout(Duration::from_secs(5)) {
        Ok(block) => {
            engine.verify_seal(&block.header)?;
            println!(
                "sealed block {} hash {}",
                block.number(),
                slotseal::types::to_hex(&block.header.hash())
            );
        }
        Err(_) => println!("no sealed block received"),
    }
    engine.close();
    Ok(())
}
