//! Remote work distribution.
//!
//! All state about the current candidate block lives inside one loop thread.
//! Callers talk to it over a bounded queue and wait for a reply; both waits
//! race against the exit signal so that a closed coordinator fails fast with
//! [`Error::Stopped`] instead of hanging.

use crate::error::Error;
use crate::hashrate::HashrateTracker;
use crate::time::TimeProvider;
use crate::types::{to_hex, Block, Hash, HashRateSample, SealSubmission, WorkPackage};
use crate::verify::SealVerifier;
use flume::{Receiver, Selector, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Receives every freshly issued work package.
pub trait WorkNotifier: Send + Sync {
    fn notify(&self, work: &WorkPackage);
}

/// Forwards work packages over a channel without blocking the sealer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier(Sender<WorkPackage>);

impl ChannelNotifier {
    pub fn new(sender: Sender<WorkPackage>) -> Self {
        Self(sender)
    }
}

impl WorkNotifier for ChannelNotifier {
    fn notify(&self, work: &WorkPackage) {
        if self.0.try_send(work.clone()).is_err() {
            tracing::warn!(seal_hash = %to_hex(&work.seal_hash), "work notification dropped");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Lineage {
    parent_hash: Hash,
    number: u64,
}

type Reply<T> = Sender<Result<T, Error>>;

enum Request {
    NewWork {
        block: Block,
        results: Sender<Block>,
        reply: Reply<WorkPackage>,
    },
    FetchWork {
        reply: Reply<(WorkPackage, Lineage)>,
    },
    SubmitWork {
        submission: SealSubmission,
        reply: Reply<()>,
    },
    SubmitRate {
        id: Hash,
        rate: u64,
        reply: Sender<()>,
    },
}

/// State owned by the loop thread.
struct Sealer {
    verifier: Arc<SealVerifier>,
    hashrate: Arc<HashrateTracker>,
    clock: Arc<dyn TimeProvider>,
    notifier: Option<Arc<dyn WorkNotifier>>,
    stale_threshold: u64,
    current: Option<(Block, WorkPackage)>,
    works: HashMap<Hash, Block>,
    results: Option<Sender<Block>>,
}

impl Sealer {
    fn run(mut self, requests: Receiver<Request>, exit: Receiver<()>) {
        loop {
            let next = Selector::new()
                .recv(&requests, |request| request.ok())
                .recv(&exit, |_| None)
                .wait();
            let Some(request) = next else {
                break;
            };
            self.handle(request);
        }
        tracing::debug!("remote sealer stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::NewWork {
                block,
                results,
                reply,
            } => {
                let _ = reply.send(self.new_work(block, results));
            }
            Request::FetchWork { reply } => {
                let work = self
                    .current
                    .as_ref()
                    .map(|(block, work)| {
                        let lineage = Lineage {
                            parent_hash: block.header.parent_hash,
                            number: block.number(),
                        };
                        (work.clone(), lineage)
                    })
                    .ok_or(Error::NoWork);
                let _ = reply.send(work);
            }
            Request::SubmitWork { submission, reply } => {
                let outcome = self.submit(&submission);
                if let Err(err) = &outcome {
                    tracing::warn!(
                        seal_hash = %to_hex(&submission.seal_hash),
                        error = %err,
                        "rejected submitted seal"
                    );
                }
                let _ = reply.send(outcome);
            }
            Request::SubmitRate { id, rate, reply } => {
                let now = self.clock.now_seconds();
                self.hashrate.purge(now);
                self.hashrate.record(HashRateSample { id, rate, ping: now });
                let _ = reply.send(());
            }
        }
    }

    fn new_work(&mut self, block: Block, results: Sender<Block>) -> Result<WorkPackage, Error> {
        let work = self.verifier.work_package(&block.header)?;
        let number = block.number();
        let threshold = self.stale_threshold;
        self.works
            .retain(|_, issued| issued.number().saturating_add(threshold) > number);
        self.works.insert(work.seal_hash, block.clone());
        self.current = Some((block, work.clone()));
        self.results = Some(results);

        tracing::debug!(number, seal_hash = %to_hex(&work.seal_hash), "new sealing work");
        if let Some(notifier) = &self.notifier {
            notifier.notify(&work);
        }
        Ok(work)
    }

    fn submit(&mut self, submission: &SealSubmission) -> Result<(), Error> {
        let (block, work) = self.current.as_ref().ok_or(Error::NoWork)?;
        if submission.seal_hash != work.seal_hash {
            return Err(if self.works.contains_key(&submission.seal_hash) {
                Error::StaleWork
            } else {
                Error::UnknownWork
            });
        }
        let header = self.verifier.apply_submission(&block.header, submission)?;
        self.verifier.verify(&header)?;

        let sealed = block.with_seal(header);
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no result sink for sealed block".into()))?;
        if results.try_send(sealed).is_err() {
            return Err(Error::InvalidState(
                "sealing result is not read by miner".into(),
            ));
        }
        tracing::debug!(number = block.number(), "accepted submitted seal");
        Ok(())
    }
}

/// Serializes all access to the current sealing work.
pub struct RemoteWorkCoordinator {
    requests: Sender<Request>,
    exit: Receiver<()>,
    exit_signal: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    hashrate: Arc<HashrateTracker>,
    clock: Arc<dyn TimeProvider>,
}

impl RemoteWorkCoordinator {
    pub fn start(
        verifier: Arc<SealVerifier>,
        hashrate: Arc<HashrateTracker>,
        clock: Arc<dyn TimeProvider>,
        notifier: Option<Arc<dyn WorkNotifier>>,
        queue_capacity: usize,
        stale_threshold: u64,
    ) -> Result<Self, Error> {
        let (requests, queue) = flume::bounded(queue_capacity.max(1));
        let (exit_signal, exit) = flume::bounded::<()>(1);
        let sealer = Sealer {
            verifier,
            hashrate: hashrate.clone(),
            clock: clock.clone(),
            notifier,
            stale_threshold,
            current: None,
            works: HashMap::new(),
            results: None,
        };
        let loop_exit = exit.clone();
        let handle = thread::Builder::new()
            .name("remote-sealer".into())
            .spawn(move || {
                let run = AssertUnwindSafe(|| sealer.run(queue, loop_exit));
                if panic::catch_unwind(run).is_err() {
                    tracing::error!("remote sealer loop panicked; coordinator is closed");
                }
            })
            .map_err(|e| Error::InvalidState(format!("failed to start remote sealer: {e}")))?;

        Ok(Self {
            requests,
            exit,
            exit_signal: Mutex::new(Some(exit_signal)),
            handle: Mutex::new(Some(handle)),
            hashrate,
            clock,
        })
    }

    /// Queue `request` and wait for the reply, racing both waits against
    /// shutdown.
    fn dispatch<T>(&self, request: Request, reply: Receiver<T>) -> Result<T, Error> {
        let queued = Selector::new()
            .send(&self.requests, request, |sent| sent.is_ok())
            .recv(&self.exit, |_| false)
            .wait();
        if !queued {
            return Err(Error::Stopped);
        }
        Selector::new()
            .recv(&reply, |value| value.map_err(|_| Error::Stopped))
            .recv(&self.exit, |_| Err(Error::Stopped))
            .wait()
    }

    /// Install `block` as the current candidate. Accepted seals are delivered
    /// to `results`.
    pub fn push_work(&self, block: Block, results: Sender<Block>) -> Result<WorkPackage, Error> {
        let (reply, rx) = flume::bounded(1);
        self.dispatch(
            Request::NewWork {
                block,
                results,
                reply,
            },
            rx,
        )?
    }

    fn fetch(&self) -> Result<(WorkPackage, Lineage), Error> {
        let (reply, rx) = flume::bounded(1);
        self.dispatch(Request::FetchWork { reply }, rx)?
    }

    pub fn fetch_work(&self) -> Result<WorkPackage, Error> {
        self.fetch().map(|(work, _)| work)
    }

    /// Fetch work, checking it extends `parent_hash` at height `number`.
    ///
    /// Block 1 skips the check: a fresh validator does not know block 0's hash.
    pub fn fetch_work_with_lineage(
        &self,
        parent_hash: &Hash,
        number: u64,
    ) -> Result<WorkPackage, Error> {
        let (work, lineage) = self.fetch()?;
        if number == 1 {
            return Ok(work);
        }
        if lineage.parent_hash != *parent_hash {
            tracing::error!(
                number = lineage.number,
                remote_parent = %to_hex(&lineage.parent_hash),
                received_parent = %to_hex(parent_hash),
                "mismatch in parent hash"
            );
            return Err(Error::ParentMismatch {
                expected: to_hex(&lineage.parent_hash),
                received: to_hex(parent_hash),
            });
        }
        if lineage.number != number {
            tracing::error!(
                remote_number = lineage.number,
                received_number = number,
                "mismatch in block number"
            );
            return Err(Error::NumberMismatch {
                expected: lineage.number,
                received: number,
            });
        }
        Ok(work)
    }

    fn try_submit(&self, submission: SealSubmission) -> Result<(), Error> {
        let (reply, rx) = flume::bounded(1);
        self.dispatch(Request::SubmitWork { submission, reply }, rx)?
    }

    /// Whether the seal was accepted. Rejection reasons are only logged.
    pub fn submit_seal(&self, submission: SealSubmission) -> bool {
        match self.try_submit(submission) {
            Ok(()) => true,
            Err(Error::Stopped) => {
                tracing::debug!("seal submitted to stopped sealer");
                false
            }
            Err(_) => false,
        }
    }

    /// Record a worker's self-reported rate; returns once it is merged.
    pub fn submit_hashrate(&self, id: Hash, rate: u64) -> Result<(), Error> {
        let (reply, rx) = flume::bounded(1);
        self.dispatch(Request::SubmitRate { id, rate, reply }, rx)
    }

    /// Local plus live remote hash rate. Does not touch the sealer loop.
    pub fn hashrate(&self) -> u64 {
        self.hashrate.total(self.clock.now_seconds())
    }

    /// True after `close` or once the loop thread has died.
    pub fn is_closed(&self) -> bool {
        if self.exit_signal.lock().is_none() {
            return true;
        }
        self.handle
            .lock()
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Stop the sealer loop. Idempotent.
    pub fn close(&self) {
        let Some(signal) = self.exit_signal.lock().take() else {
            return;
        };
        drop(signal);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("remote sealer thread panicked");
            }
        }
    }
}

impl Drop for RemoteWorkCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}
