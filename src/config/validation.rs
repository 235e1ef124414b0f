use crate::config::types::{
    Config, CrawlerConfig, EmbeddingConfig, RobotsConfig, ServerConfig, StorageConfig,
    TransportConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_transport_config(&config.transport)?;
    validate_robots_config(&config.robots)?;
    validate_storage_config(&config.storage)?;
    validate_embedding_config(&config.embeddings)?;
    validate_server_config(&config.server)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.default_max_pages < 1 {
        return Err(ConfigError::Validation(
            "default_max_pages must be >= 1".to_string(),
        ));
    }

    if config.idle_backoff_ms < 1 || config.max_idle_backoff_ms < config.idle_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "idle backoff must satisfy 1 <= idle_backoff_ms ({}) <= max_idle_backoff_ms ({})",
            config.idle_backoff_ms, config.max_idle_backoff_ms
        )));
    }

    Ok(())
}

/// Validates transport configuration
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_bytes == 0 {
        return Err(ConfigError::Validation("max_bytes must be >= 1".to_string()));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.dns_cache_size == 0 || config.metadata_cache_size == 0 {
        return Err(ConfigError::Validation(
            "dns_cache_size and metadata_cache_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates robots configuration
fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.identity.trim().is_empty() {
        return Err(ConfigError::Validation(
            "robots identity cannot be empty".to_string(),
        ));
    }

    if config.cache_size == 0 {
        return Err(ConfigError::Validation(
            "robots cache_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "storage batch_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates embedding configuration
fn validate_embedding_config(config: &EmbeddingConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "embedding batch_size must be >= 1".to_string(),
        ));
    }

    if config.dimensions == 0 {
        return Err(ConfigError::Validation(
            "embedding dimensions must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates server configuration
fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config.listen_addr.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!(
            "listen_addr '{}' is not a socket address: {}",
            config.listen_addr, e
        ))
    })?;
    Ok(())
}
