use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::archive::ArchiveConfig;
use crate::batch::BatchConfig;
use crate::sink::SinkConfig;
use crate::transformer::TransformerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Finished batches kept for status queries; older ones are evicted.
    #[serde(default = "default_retained_batches")]
    pub retained_batches: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            retained_batches: default_retained_batches(),
        }
    }
}

impl ServerConfig {
    pub fn with_retained_batches(mut self, retained_batches: usize) -> Self {
        self.retained_batches = retained_batches;
        self
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_retained_batches() -> usize {
    1000
}

/// Where batch input directories live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Requested input directories are resolved relative to this root.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./input")
}

/// Sanitized config for API responses (command environment values redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub batch: BatchConfig,
    pub archive: ArchiveConfig,
    pub transformer: SanitizedTransformerConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTransformerConfig {
    pub backend: String,
    pub timeout_secs: u64,
    pub max_concurrent_calls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<SanitizedCommandConfig>,
}

/// Command settings with environment values hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCommandConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Names of the extra environment variables, values omitted.
    pub env_keys: Vec<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let transformer = &config.transformer;
        Self {
            server: config.server.clone(),
            source: config.source.clone(),
            batch: config.batch.clone(),
            archive: config.archive.clone(),
            transformer: SanitizedTransformerConfig {
                backend: match transformer.backend {
                    crate::transformer::TransformerBackend::Passthrough => "passthrough",
                    crate::transformer::TransformerBackend::Command => "command",
                }
                .to_string(),
                timeout_secs: transformer.timeout_secs,
                max_concurrent_calls: transformer.max_concurrent_calls,
                command: transformer.command.as_ref().map(|c| SanitizedCommandConfig {
                    program: c.program.clone(),
                    args: c.args.clone(),
                    env_keys: sorted_keys(&c.env),
                }),
            },
            sink: config.sink.clone(),
        }
    }
}

fn sorted_keys(env: &HashMap<String, String>) -> Vec<String> {
    let mut keys: Vec<String> = env.keys().cloned().collect();
    keys.sort();
    keys
}
