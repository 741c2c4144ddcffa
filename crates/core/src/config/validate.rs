use super::{types::Config, BrokerBackend, ConfigError};
use crate::transform::OutputFormat;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Resize bound is positive
/// - At least one worker
/// - Format whitelist is non-empty and encodable
/// - Retry policy makes at least one attempt and never shrinks the delay
/// - Kafka settings exist when the Kafka backend is selected
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.server.max_resize_side == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_resize_side must be at least 1".to_string(),
        ));
    }

    if config.workers.count == 0 {
        return Err(ConfigError::ValidationError(
            "workers.count must be at least 1".to_string(),
        ));
    }

    if config.formats.supported.is_empty() {
        return Err(ConfigError::ValidationError(
            "formats.supported cannot be empty".to_string(),
        ));
    }

    if let Some(unknown) = config
        .formats
        .supported
        .iter()
        .find(|f| OutputFormat::from_extension(f).is_none())
    {
        return Err(ConfigError::ValidationError(format!(
            "formats.supported contains unsupported format: {}",
            unknown
        )));
    }

    if config.retry.attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.attempts must be at least 1".to_string(),
        ));
    }

    if config.retry.backoff < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.backoff must be >= 1.0".to_string(),
        ));
    }

    if config.broker.backend == BrokerBackend::Kafka && config.broker.kafka.is_none() {
        return Err(ConfigError::ValidationError(
            "broker.kafka section is required when broker.backend = \"kafka\"".to_string(),
        ));
    }

    Ok(())
}
