//! Synthesis command construction.
//!
//! Every request runs the same fixed script: read the Verilog input, run the
//! `prep` pass, and write the result with the configured backend.

use crate::config::BridgeConfig;
use crate::context::VirtualFiles;

/// The fixed invocation handed to the synthesis tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisScript {
    input_file: String,
    output_file: String,
    args: Vec<String>,
}

impl SynthesisScript {
    /// Build the script for a configuration
    pub fn from_config(config: &BridgeConfig) -> Self {
        let script = format!(
            "read_verilog {}; prep; write_{} {}",
            config.input_file, config.output_format, config.output_file
        );

        let mut args = Vec::with_capacity(3);
        if config.quiet {
            args.push("-q".to_string());
        }
        args.push("-p".to_string());
        args.push(script);

        Self {
            input_file: config.input_file.clone(),
            output_file: config.output_file.clone(),
            args,
        }
    }

    /// Command-line arguments for the tool
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Virtual input file name
    pub fn input_file(&self) -> &str {
        &self.input_file
    }

    /// Virtual output file name
    pub fn output_file(&self) -> &str {
        &self.output_file
    }

    /// Input mapping for one source document
    pub fn inputs(&self, source: &str) -> VirtualFiles {
        VirtualFiles::single(self.input_file.as_str(), source)
    }

    /// Pull the output file out of the tool's result
    pub fn extract_output(&self, mut outputs: VirtualFiles) -> Option<String> {
        outputs.take_text(&self.output_file)
    }
}
