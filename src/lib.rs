//! # Churchroad Synthesis Bridge
//!
//! This library hands Verilog source to a synthesis tool (Yosys) running on
//! an isolated worker thread and returns the content of the file the tool
//! writes. It is the Rust counterpart of the browser module that posts
//! Verilog to a Yosys web worker.
//!
//! ## Architecture
//!
//! ```text
//! caller (async)
//!     │
//!     │ convert(source)            ▲ reply matched by RequestId
//!     ▼                            │
//! SynthesisBridge ── WorkerRequest ──▶ worker thread(s)
//!     ▲                                  │ read_verilog; prep; write_<fmt>
//!     │                                  ▼
//! listener thread ◀── WorkerResponse ── SynthesisTool (Yosys)
//! ```
//!
//! ## Features
//!
//! - **Isolated workers**: each tool instance lives on its own thread and
//!   runs synthesis to completion without yielding
//! - **Correlated replies**: overlapping calls each resolve with their own
//!   result
//! - **Ordered start-up**: requests posted while the tool is loading are
//!   serviced once it is ready
//! - **Worker pooling**: round-robin or least-busy dispatch
//! - **E-graph extraction**: greedy DAG extraction over serialized egglog
//!   e-graphs

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extract;
pub mod metrics;
#[cfg(feature = "node")]
pub mod napi;
pub mod tool;

// Re-export commonly used types
pub use config::{BridgeConfig, DispatchStrategy};
pub use context::{Reply, RequestId, VirtualFiles, WorkerRequest, WorkerResponse};
pub use engine::worker::WorkerState;
pub use engine::{global, verilog_to_churchroad, SynthesisBridge};
pub use error::{BridgeError, ErrorCode};
pub use extract::{Extraction, GreedyDagExtractor, SerializedEGraph};
pub use metrics::BridgeStats;
pub use tool::{SynthesisTool, ToolError, ToolLoader, YosysLoader, YosysProcess};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber that honours `RUST_LOG`
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("churchroad_synth_bridge=info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
