//! N-API bindings for Node.js integration.
//!
//! This module exposes the bridge to JavaScript. `verilogToChurchroad`
//! returns a promise just like the browser module it replaces, backed by the
//! process-wide bridge.

use crate::config::{BridgeConfig, DispatchStrategy};
use crate::engine::SynthesisBridge;
use crate::extract::{ExtractError, GreedyDagExtractor, SerializedEGraph};
use napi::bindgen_prelude::*;
use napi_derive::napi;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// JavaScript-friendly configuration
#[napi(object)]
pub struct JsBridgeConfig {
    /// Virtual input file name
    pub input_file: Option<String>,
    /// Virtual output file name
    pub output_file: Option<String>,
    /// `write_<format>` backend
    pub output_format: Option<String>,
    /// Pass `-q` to Yosys
    pub quiet: Option<bool>,
    /// Number of workers
    pub workers: Option<u32>,
    /// "roundRobin" or "leastBusy"
    pub dispatch: Option<String>,
    /// Yosys executable
    pub yosys_path: Option<String>,
    /// Verbose per-request logging
    pub debug: Option<bool>,
}

impl TryFrom<JsBridgeConfig> for BridgeConfig {
    type Error = napi::Error;

    fn try_from(js: JsBridgeConfig) -> Result<Self> {
        let mut config = BridgeConfig::default();
        if let Some(name) = js.input_file {
            config = config.with_input_file(name);
        }
        if let Some(name) = js.output_file {
            config = config.with_output_file(name);
        }
        if let Some(format) = js.output_format {
            config = config.with_output_format(format);
        }
        if let Some(quiet) = js.quiet {
            config = config.with_quiet(quiet);
        }
        if let Some(workers) = js.workers {
            config = config.with_workers(workers as usize);
        }
        if let Some(dispatch) = js.dispatch {
            let strategy = match dispatch.as_str() {
                "roundRobin" => DispatchStrategy::RoundRobin,
                "leastBusy" => DispatchStrategy::LeastBusy,
                other => {
                    return Err(napi::Error::from_reason(format!(
                        "Unknown dispatch strategy: {}",
                        other
                    )))
                }
            };
            config = config.with_dispatch(strategy);
        }
        if let Some(path) = js.yosys_path {
            config = config.with_yosys_path(path);
        }
        if let Some(debug) = js.debug {
            config = config.with_debug(debug);
        }
        Ok(config)
    }
}

/// JavaScript-friendly bridge statistics
#[napi(object)]
pub struct JsBridgeStats {
    /// Requests submitted
    pub total_requests: i64,
    /// Requests answered with output
    pub outputs: i64,
    /// Requests answered without output
    pub empty_outputs: i64,
    /// Requests rejected as unavailable
    pub unavailable: i64,
    /// Requests awaiting a reply
    pub in_flight: u32,
    /// Average round trip in microseconds
    pub avg_round_trip_us: f64,
}

/// The bridge wrapper exposed to Node.js
#[napi]
pub struct ChurchroadBridge {
    inner: Arc<RwLock<Option<SynthesisBridge>>>,
}

#[napi]
impl ChurchroadBridge {
    /// Create a new bridge with the given configuration
    #[napi(constructor)]
    pub fn new(config: Option<JsBridgeConfig>) -> Result<Self> {
        let config = match config {
            Some(js) => BridgeConfig::try_from(js)?,
            None => BridgeConfig::default(),
        };

        let bridge = SynthesisBridge::new(config)
            .map_err(|e| napi::Error::from_reason(format!("Failed to create bridge: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RwLock::new(Some(bridge))),
        })
    }

    /// Convert Verilog to the configured output format
    #[napi]
    pub async fn convert(&self, verilog: String) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        let bridge = inner
            .as_ref()
            .ok_or_else(|| napi::Error::from_reason("Bridge has been shut down"))?;

        bridge
            .convert(&verilog)
            .await
            .map_err(|e| napi::Error::from_reason(format!("[{}] {}", e.code(), e)))
    }

    /// Get bridge statistics
    #[napi]
    pub async fn get_stats(&self) -> Result<JsBridgeStats> {
        let inner = self.inner.read().await;
        let bridge = inner
            .as_ref()
            .ok_or_else(|| napi::Error::from_reason("Bridge has been shut down"))?;

        let stats = bridge.stats();
        Ok(JsBridgeStats {
            total_requests: stats.total_requests as i64,
            outputs: stats.outputs as i64,
            empty_outputs: stats.empty_outputs as i64,
            unavailable: stats.unavailable as i64,
            in_flight: stats.in_flight as u32,
            avg_round_trip_us: stats.avg_round_trip_us,
        })
    }

    /// Shutdown the bridge
    #[napi]
    pub async fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some(bridge) = inner.take() {
            bridge
                .shutdown()
                .await
                .map_err(|e| napi::Error::from_reason(format!("Shutdown failed: {}", e)))?;
        }

        Ok(())
    }
}

/// Convert Verilog to Churchroad with the process-wide bridge
#[napi(js_name = "verilogToChurchroad")]
pub async fn verilog_to_churchroad(verilog: String) -> Result<Option<String>> {
    crate::engine::verilog_to_churchroad(&verilog)
        .await
        .map_err(|e| napi::Error::from_reason(format!("[{}] {}", e.code(), e)))
}

/// Extract a serialized e-graph, returning the chosen node id per class
#[napi(js_name = "extractGreedyDag")]
pub fn extract_greedy_dag(egraph_json: String) -> Result<HashMap<String, String>> {
    let to_napi = |e: ExtractError| {
        let e = crate::error::BridgeError::from(e);
        napi::Error::from_reason(format!("[{}] {}", e.code(), e))
    };

    let egraph = SerializedEGraph::from_json_str(&egraph_json).map_err(to_napi)?;
    let extraction = GreedyDagExtractor.extract(&egraph).map_err(to_napi)?;
    Ok(extraction
        .choices
        .into_iter()
        .map(|(class, node)| (class.to_string(), node.to_string()))
        .collect())
}

/// Initialize the module
#[napi]
pub fn init() {
    crate::init_tracing();
}
