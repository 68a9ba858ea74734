//! Synthesis tool interface.
//!
//! The synthesis tool is an opaque collaborator: given CLI-style arguments
//! and a set of virtual input files it synchronously produces a set of
//! virtual output files. Workers obtain their tool through a [`ToolLoader`],
//! which performs the one-time asynchronous setup.

pub mod yosys;

use crate::context::VirtualFiles;
use std::future::Future;

pub use yosys::{YosysLoader, YosysProcess};

/// Errors raised by a synthesis tool or its loader
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool executable could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but reported failure
    #[error("Tool exited with {status}: {stderr}")]
    Failed {
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// A virtual file name cannot be mapped onto the scratch directory
    #[error("Invalid virtual file name: {0}")]
    InvalidFileName(String),

    /// The tool is not available
    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    /// IO error while staging files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded synthesis tool
///
/// `run` executes synchronously and does not return until the tool has
/// finished. Implementations live on a single worker thread and need not be
/// `Send`.
pub trait SynthesisTool {
    /// Run the tool with `args` against `inputs`, returning every file the
    /// run left behind
    fn run(&mut self, args: &[String], inputs: &VirtualFiles) -> Result<VirtualFiles, ToolError>;
}

/// One-time asynchronous setup of a synthesis tool
///
/// A loader is cloned once per worker and consumed on the worker thread.
pub trait ToolLoader: Clone + Send + 'static {
    /// The tool this loader produces
    type Tool: SynthesisTool + 'static;

    /// Load and initialize the tool
    fn load(self) -> impl Future<Output = Result<Self::Tool, ToolError>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process tools for exercising workers and bridges without Yosys.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    /// Output file named by the trailing `write_<fmt> <file>` command
    pub(crate) fn output_target(args: &[String]) -> Option<&str> {
        args.last()?.split_whitespace().last()
    }

    /// Input file named by the leading `read_verilog <file>` command
    pub(crate) fn input_target(args: &[String]) -> Option<&str> {
        args.last()?
            .split(';')
            .next()?
            .split_whitespace()
            .nth(1)
    }

    /// How the fake tool behaves
    #[derive(Clone, Copy, Debug)]
    pub(crate) enum Behavior {
        /// Write `(egg <source>)` to the output file
        Echo,
        /// Produce no output file
        NoOutput,
        /// Report a failure
        Fail,
        /// Panic mid-run
        Panic,
    }

    pub(crate) struct FakeTool {
        behavior: Behavior,
        delay: Duration,
        runs: Arc<AtomicUsize>,
    }

    impl SynthesisTool for FakeTool {
        fn run(
            &mut self,
            args: &[String],
            inputs: &VirtualFiles,
        ) -> Result<VirtualFiles, ToolError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }

            let mut outputs = inputs.clone();
            match self.behavior {
                Behavior::Echo => {
                    let source = input_target(args)
                        .and_then(|name| inputs.read_text(name))
                        .unwrap_or_default();
                    if let Some(out) = output_target(args) {
                        outputs.insert_text(out, format!("(egg {})", source));
                    }
                    Ok(outputs)
                }
                Behavior::NoOutput => Ok(outputs),
                Behavior::Fail => Err(ToolError::Failed {
                    status: "exit status: 1".into(),
                    stderr: "ERROR: syntax error".into(),
                }),
                Behavior::Panic => panic!("tool crashed"),
            }
        }
    }

    /// Loader producing a [`FakeTool`]
    #[derive(Clone)]
    pub(crate) struct FakeLoader {
        pub(crate) behavior: Behavior,
        pub(crate) delay: Duration,
        pub(crate) fail_load: bool,
        pub(crate) gate: Option<watch::Receiver<bool>>,
        pub(crate) runs: Arc<AtomicUsize>,
        pub(crate) loads: Arc<AtomicUsize>,
    }

    impl FakeLoader {
        pub(crate) fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                delay: Duration::ZERO,
                fail_load: false,
                gate: None,
                runs: Arc::new(AtomicUsize::new(0)),
                loads: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn echo() -> Self {
            Self::new(Behavior::Echo)
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn failing_load(mut self) -> Self {
            self.fail_load = true;
            self
        }

        /// Hold initialization until `true` is sent on the returned sender
        pub(crate) fn gated(mut self) -> (Self, watch::Sender<bool>) {
            let (tx, rx) = watch::channel(false);
            self.gate = Some(rx);
            (self, tx)
        }

        pub(crate) fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        pub(crate) fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ToolLoader for FakeLoader {
        type Tool = FakeTool;

        async fn load(self) -> Result<FakeTool, ToolError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(mut gate) = self.gate {
                while !*gate.borrow_and_update() {
                    if gate.changed().await.is_err() {
                        break;
                    }
                }
            }
            if self.fail_load {
                return Err(ToolError::Unavailable("module failed to compile".into()));
            }
            Ok(FakeTool {
                behavior: self.behavior,
                delay: self.delay,
                runs: self.runs,
            })
        }
    }
}
