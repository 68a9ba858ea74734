//! Bridge configuration types and defaults.
//!
//! This module defines the configuration options for the synthesis bridge,
//! including the virtual file names handed to the tool, the output backend,
//! and the size of the worker pool.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default virtual input file name
pub const DEFAULT_INPUT_FILE: &str = "test.v";

/// Default virtual output file name
pub const DEFAULT_OUTPUT_FILE: &str = "test.egg";

/// Default `write_<format>` backend
pub const DEFAULT_OUTPUT_FORMAT: &str = "lakeroad";

/// Default number of workers in the pool
pub const DEFAULT_WORKERS: usize = 1;

/// Default Yosys executable
pub const DEFAULT_YOSYS_PATH: &str = "yosys";

/// Strategy used to pick a worker for each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchStrategy {
    /// Cycle through workers in order
    #[default]
    RoundRobin,
    /// Pick the worker with the fewest in-flight requests
    LeastBusy,
}

/// Configuration for the synthesis bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Virtual file name holding the Verilog source (default: test.v)
    #[serde(default = "default_input_file")]
    pub input_file: String,

    /// Virtual file name the synthesis script writes (default: test.egg)
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Backend used by the `write_<format>` pass (default: lakeroad)
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Pass `-q` to the tool (default: true)
    #[serde(default = "default_true")]
    pub quiet: bool,

    /// Number of worker threads (default: 1)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Worker selection strategy (default: round robin)
    #[serde(default)]
    pub dispatch: DispatchStrategy,

    /// Yosys executable used by the process loader (default: yosys)
    #[serde(default = "default_yosys_path")]
    pub yosys_path: PathBuf,

    /// Enable debug mode (default: false)
    #[serde(default)]
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            input_file: DEFAULT_INPUT_FILE.to_string(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            quiet: true,
            workers: DEFAULT_WORKERS,
            dispatch: DispatchStrategy::RoundRobin,
            yosys_path: PathBuf::from(DEFAULT_YOSYS_PATH),
            debug: false,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Set the virtual input file name
    pub fn with_input_file(mut self, name: impl Into<String>) -> Self {
        self.input_file = name.into();
        self
    }

    /// Set the virtual output file name
    pub fn with_output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = name.into();
        self
    }

    /// Set the output backend
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Enable or disable quiet mode
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Set the number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the dispatch strategy
    pub fn with_dispatch(mut self, dispatch: DispatchStrategy) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the Yosys executable
    pub fn with_yosys_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.yosys_path = path.into();
        self
    }

    /// Enable debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers".into(),
                reason: "must be greater than 0".into(),
            });
        }

        validate_file_name("input_file", &self.input_file)?;
        validate_file_name("output_file", &self.output_file)?;

        if self.input_file == self.output_file {
            return Err(ConfigError::InvalidValue {
                field: "output_file".into(),
                reason: "must differ from input_file".into(),
            });
        }

        if self.output_format.is_empty()
            || !self
                .output_format
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidValue {
                field: "output_format".into(),
                reason: "must be a non-empty identifier".into(),
            });
        }

        Ok(())
    }
}

/// File names end up inside a `-p` script, so anything that would split a
/// command or escape the scratch directory is rejected.
fn validate_file_name(field: &str, name: &str) -> Result<(), ConfigError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| c.is_whitespace() || c == ';' || c == '/' || c == '\\');

    if invalid {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            reason: format!("'{}' is not a plain file name", name),
        });
    }

    Ok(())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field name
        field: String,
        /// The reason it's invalid
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Default value functions for serde
fn default_input_file() -> String {
    DEFAULT_INPUT_FILE.to_string()
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_FILE.to_string()
}

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_yosys_path() -> PathBuf {
    PathBuf::from(DEFAULT_YOSYS_PATH)
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.input_file, "test.v");
        assert_eq!(config.output_file, "test.egg");
        assert_eq!(config.output_format, "lakeroad");
        assert_eq!(config.workers, 1);
        assert_eq!(config.dispatch, DispatchStrategy::RoundRobin);
        assert!(config.quiet);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::new()
            .with_workers(4)
            .with_dispatch(DispatchStrategy::LeastBusy)
            .with_output_format("json")
            .with_output_file("out.json");

        assert_eq!(config.workers, 4);
        assert_eq!(config.dispatch, DispatchStrategy::LeastBusy);
        assert_eq!(config.output_format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(BridgeConfig::new().with_workers(0).validate().is_err());
        assert!(BridgeConfig::new().with_input_file("").validate().is_err());
        assert!(BridgeConfig::new()
            .with_output_file("a b.egg")
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_output_file("x; shell")
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_input_file("../escape.v")
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_output_file("test.v")
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_output_format("lake road")
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = BridgeConfig::from_json_str(r#"{"workers": 3, "dispatch": "leastBusy"}"#)
            .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.dispatch, DispatchStrategy::LeastBusy);
        assert_eq!(config.output_file, DEFAULT_OUTPUT_FILE);
    }

    #[test]
    fn test_config_from_json_rejects_invalid() {
        assert!(BridgeConfig::from_json_str(r#"{"workers": 0}"#).is_err());
        assert!(BridgeConfig::from_json_str("{").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{"outputFormat": "json", "outputFile": "out.json"}"#).unwrap();

        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.output_format, "json");
        assert_eq!(config.output_file, "out.json");

        assert!(matches!(
            BridgeConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = BridgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"outputFile\""));
        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.output_file, config.output_file);
    }
}
