//! Worker pool management.
//!
//! The pool owns every worker endpoint and decides which one services each
//! request. The default size of one gives a single long-lived worker.

use super::script::SynthesisScript;
use super::worker::{WorkerEndpoint, WorkerState};
use crate::config::{BridgeConfig, DispatchStrategy};
use crate::context::{WorkerRequest, WorkerResponse};
use crate::error::{BridgeError, Result};
use crate::tool::ToolLoader;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Pool of synthesis workers
pub struct WorkerPool {
    /// Workers by index
    workers: Vec<WorkerEndpoint>,
    /// Selection strategy
    strategy: DispatchStrategy,
    /// Round-robin cursor
    next: AtomicUsize,
    /// Shutdown flag
    shutdown: RwLock<bool>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers, each with its own clone of `loader`
    pub fn new<L: ToolLoader>(
        config: &BridgeConfig,
        loader: L,
        responses: mpsc::UnboundedSender<WorkerResponse>,
    ) -> Result<Self> {
        info!(
            workers = config.workers,
            dispatch = ?config.dispatch,
            "Creating worker pool"
        );

        let script = SynthesisScript::from_config(config);
        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            workers.push(WorkerEndpoint::spawn(
                index,
                script.clone(),
                loader.clone(),
                responses.clone(),
                config.debug,
            )?);
        }

        Ok(Self {
            workers,
            strategy: config.dispatch,
            next: AtomicUsize::new(0),
            shutdown: RwLock::new(false),
        })
    }

    /// Post a request to a worker, returning the chosen worker's index
    ///
    /// A worker that refuses the request is skipped and the next live one is
    /// tried.
    pub fn dispatch(&self, mut request: WorkerRequest) -> Result<usize> {
        let mut refused = vec![false; self.workers.len()];

        loop {
            if self.is_shutdown() {
                return Err(BridgeError::Shutdown);
            }

            let index = self.select(&refused).ok_or_else(|| {
                BridgeError::WorkerUnavailable("no worker is accepting requests".into())
            })?;

            let worker = &self.workers[index];
            match worker.post(request) {
                Ok(()) => {
                    debug!(worker = index, load = worker.load(), "Dispatched request");
                    return Ok(index);
                }
                Err(returned) => {
                    debug!(worker = index, state = ?worker.state(), "Worker refused request");
                    refused[index] = true;
                    request = returned;
                }
            }
        }
    }

    /// Pick a live worker according to the strategy, skipping refused ones
    fn select(&self, refused: &[bool]) -> Option<usize> {
        let live = |worker: &&WorkerEndpoint| {
            !refused[worker.index()] && worker.state().accepts_requests()
        };

        match self.strategy {
            DispatchStrategy::RoundRobin => {
                let start = self.next.fetch_add(1, Ordering::Relaxed);
                let count = self.workers.len();
                (0..count)
                    .map(|offset| &self.workers[(start + offset) % count])
                    .find(live)
                    .map(WorkerEndpoint::index)
            }
            DispatchStrategy::LeastBusy => self
                .workers
                .iter()
                .filter(live)
                .min_by_key(|worker| worker.load())
                .map(WorkerEndpoint::index),
        }
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has no workers
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// State of each worker
    pub fn states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(WorkerEndpoint::state).collect()
    }

    /// In-flight load of each worker
    pub fn loads(&self) -> Vec<usize> {
        self.workers.iter().map(WorkerEndpoint::load).collect()
    }

    /// Whether the pool has been shut down
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.read()
    }

    /// Stop accepting requests and close every worker channel
    ///
    /// Workers finish what is already queued, then exit.
    pub fn close(&self) {
        {
            let mut shutdown = self.shutdown.write();
            if *shutdown {
                return;
            }
            *shutdown = true;
        }

        info!("Shutting down worker pool");
        for worker in &self.workers {
            worker.close();
        }
    }

    /// Take the worker thread handles for joining
    pub fn take_threads(&self) -> Vec<thread::JoinHandle<()>> {
        self.workers
            .iter()
            .filter_map(WorkerEndpoint::take_thread)
            .collect()
    }
}
