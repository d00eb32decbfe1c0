//! Configuration for the transformer module.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Which transformer implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformerBackend {
    /// Copy content unchanged.
    #[default]
    Passthrough,
    /// Run an external program per item.
    Command,
}

/// Gateway and backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Backend implementation.
    #[serde(default)]
    pub backend: TransformerBackend,

    /// Timeout for a single item transformation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Parent directory for per-item scratch directories.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Maximum concurrent transformer calls. The transformer is treated as
    /// non-reentrant by default.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_calls: usize,

    /// Settings for the command backend.
    #[serde(default)]
    pub command: Option<CommandConfig>,
}

fn default_timeout() -> u64 {
    300
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("streambatch-scratch")
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            backend: TransformerBackend::default(),
            timeout_secs: default_timeout(),
            scratch_dir: default_scratch_dir(),
            max_concurrent_calls: default_max_concurrent(),
            command: None,
        }
    }
}

impl TransformerConfig {
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }
}

/// External program invocation.
///
/// Arguments may contain the placeholders `{input}`, `{output}`, `{recipe}`,
/// `{identifier}` and `{scratch}`. When any argument references `{output}`
/// the program must write its result there; otherwise stdout is the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to run, resolved against `PATH` when not a path.
    pub program: PathBuf,

    /// Argument template.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Arguments for a readiness probe run by `validate`. Empty means only
    /// check that the program exists.
    #[serde(default)]
    pub validate_args: Vec<String>,
}

fn default_args() -> Vec<String> {
    vec![
        "--recipe".to_string(),
        "{recipe}".to_string(),
        "--input".to_string(),
        "{input}".to_string(),
        "--output".to_string(),
        "{output}".to_string(),
    ]
}

impl CommandConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: default_args(),
            env: HashMap::new(),
            validate_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Whether the program writes its result to the `{output}` path.
    pub fn writes_output_file(&self) -> bool {
        self.args.iter().any(|arg| arg.contains("{output}"))
    }
}
