//! Yosys executed as a child process.
//!
//! Each run gets a private scratch directory standing in for the virtual
//! filesystem: inputs are written into it, Yosys runs with it as the working
//! directory, and every regular file found afterwards becomes the output
//! mapping.

use super::{SynthesisTool, ToolError, ToolLoader};
use crate::config::BridgeConfig;
use crate::context::VirtualFiles;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Loader that locates a Yosys executable and checks it runs
#[derive(Debug, Clone)]
pub struct YosysLoader {
    program: PathBuf,
}

impl YosysLoader {
    /// Create a loader for the given executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Create a loader from the bridge configuration
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.yosys_path.clone())
    }

    /// The executable this loader starts
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ToolLoader for YosysLoader {
    type Tool = YosysProcess;

    async fn load(self) -> Result<YosysProcess, ToolError> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-V")
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Unavailable(format!(
                "{} -V exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(program = %self.program.display(), version = %version, "Loaded Yosys");

        Ok(YosysProcess {
            program: self.program,
            version,
        })
    }
}

/// A Yosys executable known to start
#[derive(Debug)]
pub struct YosysProcess {
    program: PathBuf,
    version: String,
}

impl YosysProcess {
    /// Version banner reported by `yosys -V`
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl SynthesisTool for YosysProcess {
    fn run(&mut self, args: &[String], inputs: &VirtualFiles) -> Result<VirtualFiles, ToolError> {
        let scratch = tempfile::Builder::new().prefix("churchroad-").tempdir()?;
        stage_inputs(scratch.path(), inputs)?;

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(scratch.path())
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let outputs = collect_outputs(scratch.path())?;
        debug!(
            files = ?outputs.names().collect::<Vec<_>>(),
            "Collected Yosys outputs"
        );
        Ok(outputs)
    }
}

fn stage_inputs(dir: &Path, inputs: &VirtualFiles) -> Result<(), ToolError> {
    for (name, content) in inputs.iter() {
        if !is_plain_name(name) {
            return Err(ToolError::InvalidFileName(name.to_string()));
        }
        std::fs::write(dir.join(name), content)?;
    }
    Ok(())
}

fn collect_outputs(dir: &Path) -> Result<VirtualFiles, ToolError> {
    let mut files = VirtualFiles::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.insert(name, std::fs::read(entry.path())?);
        }
    }
    Ok(files)
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
