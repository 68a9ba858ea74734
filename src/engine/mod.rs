//! Synthesis bridge.
//!
//! This module provides the caller-facing [`SynthesisBridge`]: it posts
//! request envelopes to the worker pool and resolves each pending call when
//! the response carrying its correlation ID comes back.

pub mod pool;
pub mod script;
pub mod worker;

use crate::config::BridgeConfig;
use crate::context::{Reply, RequestId, WorkerRequest, WorkerResponse};
use crate::error::{BridgeError, Result};
use crate::metrics::{BridgeMetrics, BridgeStats, RoundTripTimer};
use crate::tool::{ToolLoader, YosysLoader};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use pool::WorkerPool;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Calls waiting for a reply, keyed by correlation ID
type PendingTable = DashMap<RequestId, oneshot::Sender<Reply>>;

/// The caller-side bridge to the synthesis workers
pub struct SynthesisBridge {
    /// Bridge configuration
    config: BridgeConfig,
    /// Worker pool
    pool: WorkerPool,
    /// Pending calls
    pending: Arc<PendingTable>,
    /// Metrics collector
    metrics: Arc<BridgeMetrics>,
    /// Response listener thread, taken on shutdown
    listener: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SynthesisBridge {
    /// Create a bridge backed by the Yosys executable in `config`
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let loader = YosysLoader::from_config(&config);
        Self::with_loader(config, loader)
    }

    /// Create a bridge whose workers load their tool with `loader`
    pub fn with_loader<L: ToolLoader>(config: BridgeConfig, loader: L) -> Result<Self> {
        config.validate()?;

        info!(
            workers = config.workers,
            output_file = %config.output_file,
            output_format = %config.output_format,
            "Initializing synthesis bridge"
        );

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let pending: Arc<PendingTable> = Arc::new(DashMap::new());

        // The listener must be up before any worker can reply.
        let listener = spawn_listener(response_rx, Arc::clone(&pending))?;
        let pool = WorkerPool::new(&config, loader, response_tx)?;

        Ok(Self {
            config,
            pool,
            pending,
            metrics: Arc::new(BridgeMetrics::new()),
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Synthesize `source` and return the content of the output file
    ///
    /// Any string is forwarded verbatim. Resolves with `None` when the tool
    /// fails or does not produce the output file. Overlapping calls are
    /// supported; each resolves with the result for its own source.
    #[instrument(skip(self, source), fields(source_len = source.len()))]
    pub async fn convert(&self, source: &str) -> Result<Option<String>> {
        let timer = RoundTripTimer::start();
        self.metrics.record_request();

        let request = WorkerRequest::new(source);
        let id = request.id;

        // Register before posting so the reply always finds its entry.
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(id, reply_tx);

        if let Err(e) = self.pool.dispatch(request) {
            self.pending.remove(&id);
            self.record_failure(&e);
            return Err(e);
        }

        debug!(request_id = %id, "Awaiting synthesis reply");

        let reply = match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => {
                let e = BridgeError::ResponseDropped(id.to_string());
                self.record_failure(&e);
                return Err(e);
            }
        };

        match reply {
            Reply::Output { content } => {
                self.metrics
                    .record_output(content.is_some(), timer.elapsed());
                Ok(content)
            }
            Reply::Unavailable { reason } => {
                let e = BridgeError::WorkerUnavailable(reason);
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn record_failure(&self, e: &BridgeError) {
        if matches!(e, BridgeError::WorkerUnavailable(_)) {
            self.metrics.record_unavailable();
        }
        self.metrics.record_error(&e.code().to_string());
        warn!(error = %e, "Synthesis request failed");
    }

    /// Get the bridge configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get bridge statistics
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            total_requests: self.metrics.total_requests(),
            outputs: self.metrics.outputs(),
            empty_outputs: self.metrics.empty_outputs(),
            unavailable: self.metrics.unavailable(),
            in_flight: self.pending.len(),
            avg_round_trip_us: self.metrics.avg_round_trip_us(),
            worker_states: self.pool.states(),
        }
    }

    /// Get Prometheus metrics
    pub fn prometheus_metrics(&self) -> String {
        self.metrics.to_prometheus()
    }

    /// Shut down the bridge
    ///
    /// Workers finish the requests already queued; calls still pending once
    /// every worker has exited fail with [`BridgeError::ResponseDropped`].
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down synthesis bridge");
        self.pool.close();

        let mut threads = self.pool.take_threads();
        threads.extend(self.listener.lock().take());

        tokio::task::spawn_blocking(move || {
            for handle in threads {
                if handle.join().is_err() {
                    warn!("Bridge thread panicked during shutdown");
                }
            }
        })
        .await
        .map_err(|e| BridgeError::Io(std::io::Error::other(e)))?;

        Ok(())
    }
}

impl Drop for SynthesisBridge {
    fn drop(&mut self) {
        self.pool.close();
    }
}

/// Start the thread that routes worker replies to pending calls
fn spawn_listener(
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pending: Arc<PendingTable>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("churchroad-listener".into())
        .spawn(move || {
            while let Some(WorkerResponse { id, reply }) = responses.blocking_recv() {
                match pending.remove(&id) {
                    Some((_, reply_tx)) => {
                        if reply_tx.send(reply).is_err() {
                            debug!(request_id = %id, "Caller stopped waiting for reply");
                        }
                    }
                    None => warn!(request_id = %id, "Reply for unknown request"),
                }
            }

            // Every worker is gone; nothing left can answer these.
            let abandoned = pending.len();
            pending.clear();
            if abandoned > 0 {
                warn!(abandoned, "Dropped pending requests after workers exited");
            }
            debug!("Response listener stopped");
        })
        .map_err(BridgeError::Io)
}

static GLOBAL: OnceCell<SynthesisBridge> = OnceCell::new();

/// The process-wide bridge, created with [`BridgeConfig::default`] on first
/// use and never torn down
pub fn global() -> Result<&'static SynthesisBridge> {
    GLOBAL.get_or_try_init(|| SynthesisBridge::new(BridgeConfig::default()))
}

/// Convert Verilog to Churchroad using the process-wide bridge
pub async fn verilog_to_churchroad(verilog: &str) -> Result<Option<String>> {
    global()?.convert(verilog).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchStrategy;
    use crate::engine::worker::WorkerState;
    use crate::tool::testing::{Behavior, FakeLoader};
    use std::time::Duration;

    fn create_bridge(loader: FakeLoader) -> SynthesisBridge {
        SynthesisBridge::with_loader(BridgeConfig::default(), loader).unwrap()
    }

    #[tokio::test]
    async fn test_bridge_creation() {
        let bridge = create_bridge(FakeLoader::echo());
        let stats = bridge.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.worker_states.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = BridgeConfig::new().with_workers(0);
        let err = SynthesisBridge::with_loader(config, FakeLoader::echo())
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[tokio::test]
    async fn test_convert_resolves_with_output() {
        let bridge = create_bridge(FakeLoader::echo());

        let output = bridge
            .convert("module m(input a, output b); assign b = a; endmodule")
            .await
            .unwrap();
        assert_eq!(
            output.unwrap(),
            "(egg module m(input a, output b); assign b = a; endmodule)"
        );

        let stats = bridge.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.outputs, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_are_independent() {
        let loader = FakeLoader::echo();
        let bridge = create_bridge(loader.clone());

        let first = bridge.convert("module m; endmodule").await.unwrap();
        let second = bridge.convert("module m; endmodule").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.runs(), 2);
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let bridge = create_bridge(FakeLoader::echo());
        assert_eq!(bridge.convert("").await.unwrap().unwrap(), "(egg )");

        let failing = create_bridge(FakeLoader::new(Behavior::Fail));
        assert!(failing.convert("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_output_resolves_none() {
        let bridge = create_bridge(FakeLoader::new(Behavior::NoOutput));
        assert!(bridge.convert("module m; endmodule").await.unwrap().is_none());
        assert_eq!(bridge.stats().empty_outputs, 1);
    }

    #[tokio::test]
    async fn test_overlapping_calls_resolve_with_their_own_output() {
        let loader = FakeLoader::echo().with_delay(Duration::from_millis(5));
        let bridge = Arc::new(create_bridge(loader));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(async move {
                    let source = format!("module m{}; endmodule", i);
                    let output = bridge.convert(&source).await.unwrap();
                    (source, output)
                })
            })
            .collect();

        for handle in handles {
            let (source, output) = handle.await.unwrap();
            assert_eq!(output.unwrap(), format!("(egg {})", source));
        }
        assert_eq!(bridge.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_calls_before_ready_are_serviced() {
        let (loader, gate) = FakeLoader::echo().gated();
        let bridge = Arc::new(create_bridge(loader));

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.convert("module early; endmodule").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bridge.stats().in_flight, 1);
        assert_ne!(bridge.stats().worker_states[0], WorkerState::Ready);

        gate.send(true).unwrap();
        let output = pending.await.unwrap().unwrap();
        assert_eq!(output.unwrap(), "(egg module early; endmodule)");
    }

    #[tokio::test]
    async fn test_failed_initialization_reports_unavailable() {
        let bridge = create_bridge(FakeLoader::echo().failing_load());

        let err = bridge.convert("module m; endmodule").await.unwrap_err();
        assert!(matches!(err, BridgeError::WorkerUnavailable(_)));

        let err = bridge.convert("module m; endmodule").await.unwrap_err();
        assert!(matches!(err, BridgeError::WorkerUnavailable(_)));

        let stats = bridge.stats();
        assert_eq!(stats.unavailable, 2);
        assert_eq!(stats.in_flight, 0);
        assert!(bridge
            .prometheus_metrics()
            .contains("churchroad_errors_total{code=\"WORKER_UNAVAILABLE\"} 2"));
    }

    #[tokio::test]
    async fn test_pool_spreads_requests() {
        let loader = FakeLoader::echo().with_delay(Duration::from_millis(5));
        let config = BridgeConfig::new()
            .with_workers(3)
            .with_dispatch(DispatchStrategy::LeastBusy);
        let bridge = Arc::new(SynthesisBridge::with_loader(config, loader.clone()).unwrap());

        let handles: Vec<_> = (0..9)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(async move { bridge.convert(&format!("m{}", i)).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        assert_eq!(loader.loads(), 3);
        assert_eq!(loader.runs(), 9);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let bridge = create_bridge(FakeLoader::echo());
        assert!(bridge.convert("module m; endmodule").await.unwrap().is_some());

        bridge.shutdown().await.unwrap();

        let err = bridge.convert("module m; endmodule").await.unwrap_err();
        assert!(matches!(err, BridgeError::Shutdown));
        assert_eq!(bridge.stats().worker_states, vec![WorkerState::Stopped]);
    }

    #[tokio::test]
    async fn test_shutdown_finishes_queued_requests() {
        let loader = FakeLoader::echo().with_delay(Duration::from_millis(20));
        let bridge = Arc::new(create_bridge(loader));

        let queued = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.convert("module q; endmodule").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        bridge.shutdown().await.unwrap();
        let output = queued.await.unwrap().unwrap();
        assert_eq!(output.unwrap(), "(egg module q; endmodule)");
    }
}
