//! Worker endpoint management.
//!
//! Each worker is a dedicated OS thread hosting exactly one initialized
//! synthesis tool. Requests arrive over a channel and are serviced one at a
//! time, strictly after initialization has completed; requests posted while
//! the tool is still loading wait in the channel in send order.

use super::script::SynthesisScript;
use crate::context::{WorkerRequest, WorkerResponse};
use crate::error::{BridgeError, Result};
use crate::tool::{SynthesisTool, ToolLoader};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerState {
    /// Thread started, tool not yet loading
    Uninitialized,
    /// Tool is loading
    Initializing,
    /// Servicing requests
    Ready,
    /// Tool failed to load; requests are rejected
    Failed,
    /// Request channel closed; thread has exited or is exiting
    Stopped,
}

impl WorkerState {
    /// Whether the worker will eventually service a posted request
    pub fn accepts_requests(self) -> bool {
        matches!(
            self,
            WorkerState::Uninitialized | WorkerState::Initializing | WorkerState::Ready
        )
    }
}

/// Handle to a worker thread
pub struct WorkerEndpoint {
    /// Position in the pool
    index: usize,
    /// Request channel; `None` once closed
    request_tx: Mutex<Option<mpsc::UnboundedSender<WorkerRequest>>>,
    /// Lifecycle state shared with the thread
    state: Arc<RwLock<WorkerState>>,
    /// Requests posted but not yet answered
    load: Arc<AtomicUsize>,
    /// Thread handle, taken on join
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WorkerEndpoint {
    /// Start a worker thread
    ///
    /// Returns as soon as the thread is running; initialization continues in
    /// the background and replies are posted to `responses`.
    pub fn spawn<L: ToolLoader>(
        index: usize,
        script: SynthesisScript,
        loader: L,
        responses: mpsc::UnboundedSender<WorkerResponse>,
        debug: bool,
    ) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(WorkerState::Uninitialized));
        let load = Arc::new(AtomicUsize::new(0));

        let worker = WorkerThread {
            index,
            script,
            responses,
            state: Arc::clone(&state),
            load: Arc::clone(&load),
            debug,
        };

        let thread = thread::Builder::new()
            .name(format!("churchroad-worker-{}", index))
            .spawn(move || worker.run(loader, request_rx))
            .map_err(BridgeError::Io)?;

        debug!(worker = index, "Spawned worker thread");

        Ok(Self {
            index,
            request_tx: Mutex::new(Some(request_tx)),
            state,
            load,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Get the worker index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the worker state
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Requests posted but not yet answered
    pub fn load(&self) -> usize {
        self.load.load(Ordering::Relaxed)
    }

    /// Post a request; hands it back if the worker no longer accepts work
    pub fn post(&self, request: WorkerRequest) -> std::result::Result<(), WorkerRequest> {
        let guard = self.request_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(request);
        };

        self.load.fetch_add(1, Ordering::Relaxed);
        tx.send(request).map_err(|mpsc::error::SendError(request)| {
            self.load.fetch_sub(1, Ordering::Relaxed);
            request
        })
    }

    /// Close the request channel; queued requests are still serviced
    pub fn close(&self) {
        if self.request_tx.lock().take().is_some() {
            debug!(worker = self.index, "Closed worker request channel");
        }
    }

    /// Take the thread handle for joining
    pub fn take_thread(&self) -> Option<thread::JoinHandle<()>> {
        self.thread.lock().take()
    }
}

/// State owned by the worker thread
struct WorkerThread {
    index: usize,
    script: SynthesisScript,
    responses: mpsc::UnboundedSender<WorkerResponse>,
    state: Arc<RwLock<WorkerState>>,
    load: Arc<AtomicUsize>,
    debug: bool,
}

impl WorkerThread {
    fn run<L: ToolLoader>(self, loader: L, mut requests: mpsc::UnboundedReceiver<WorkerRequest>) {
        self.set_state(WorkerState::Initializing);

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.fail(&mut requests, format!("failed to build init runtime: {}", e));
                return;
            }
        };

        let started = Instant::now();
        let mut tool = match runtime.block_on(loader.load()) {
            Ok(tool) => tool,
            Err(e) => {
                error!(worker = self.index, error = %e, "Synthesis tool failed to initialize");
                self.fail(&mut requests, e.to_string());
                return;
            }
        };
        drop(runtime);

        self.set_state(WorkerState::Ready);
        info!(
            worker = self.index,
            init_ms = started.elapsed().as_millis() as u64,
            "Worker ready"
        );

        while let Some(request) = requests.blocking_recv() {
            let response = self.handle(&mut tool, request);
            self.load.fetch_sub(1, Ordering::Relaxed);

            if self.responses.send(response).is_err() {
                warn!(worker = self.index, "Response listener gone, stopping worker");
                break;
            }
        }

        self.set_state(WorkerState::Stopped);
        info!(worker = self.index, "Worker stopped");
    }

    /// Run one synthesis to completion
    fn handle<T: SynthesisTool>(&self, tool: &mut T, request: WorkerRequest) -> WorkerResponse {
        let WorkerRequest { id, source } = request;
        if self.debug {
            debug!(worker = self.index, request_id = %id, source = %source, "Synthesizing");
        }

        let inputs = self.script.inputs(&source);
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            tool.run(self.script.args(), &inputs)
        }));

        let content = match result {
            Ok(Ok(outputs)) => {
                let content = self.script.extract_output(outputs);
                if content.is_none() {
                    warn!(
                        worker = self.index,
                        request_id = %id,
                        output_file = self.script.output_file(),
                        "Synthesis produced no output file"
                    );
                }
                content
            }
            Ok(Err(e)) => {
                warn!(worker = self.index, request_id = %id, error = %e, "Synthesis failed");
                None
            }
            Err(_) => {
                error!(worker = self.index, request_id = %id, "Synthesis tool panicked");
                None
            }
        };

        debug!(
            worker = self.index,
            request_id = %id,
            duration_us = started.elapsed().as_micros() as u64,
            has_output = content.is_some(),
            "Synthesis finished"
        );

        WorkerResponse::output(id, content)
    }

    /// Reject everything queued and refuse further requests
    fn fail(&self, requests: &mut mpsc::UnboundedReceiver<WorkerRequest>, reason: String) {
        self.set_state(WorkerState::Failed);
        requests.close();

        while let Some(request) = requests.blocking_recv() {
            self.load.fetch_sub(1, Ordering::Relaxed);
            let _ = self
                .responses
                .send(WorkerResponse::unavailable(request.id, reason.clone()));
        }
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write() = state;
    }
}
