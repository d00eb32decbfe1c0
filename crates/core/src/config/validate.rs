use super::{types::Config, ConfigError};
use crate::transformer::TransformerBackend;

/// Smallest accepted archive block threshold.
const MIN_BLOCK_THRESHOLD: usize = 1024;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }
    if config.server.retained_batches == 0 {
        return invalid("server.retained_batches must be at least 1");
    }

    if config.archive.block_threshold_bytes < MIN_BLOCK_THRESHOLD {
        return invalid(format!(
            "archive.block_threshold_bytes must be at least {MIN_BLOCK_THRESHOLD}"
        ));
    }
    if config.archive.compression_level > 9 {
        return invalid("archive.compression_level must be between 0 and 9");
    }

    let transformer = &config.transformer;
    if transformer.max_concurrent_calls == 0 {
        return invalid("transformer.max_concurrent_calls must be at least 1");
    }
    if transformer.timeout_secs == 0 {
        return invalid("transformer.timeout_secs must be at least 1");
    }
    if transformer.backend == TransformerBackend::Command {
        match &transformer.command {
            None => {
                return invalid("transformer.command is required when backend = \"command\"");
            }
            Some(command) if command.program.as_os_str().is_empty() => {
                return invalid("transformer.command.program cannot be empty");
            }
            Some(_) => {}
        }
    }

    if config.sink.stream_buffer_chunks == 0 {
        return invalid("sink.stream_buffer_chunks must be at least 1");
    }

    let log_name = &config.batch.error_log_name;
    if log_name.is_empty() || log_name.contains('/') || log_name.contains('\\') {
        return invalid("batch.error_log_name must be a plain file name");
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.into()))
}
