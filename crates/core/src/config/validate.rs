use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Pipeline capacities and batch sizes are non-zero
/// - The `[generation]` section, when present, is a valid run config
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let pipeline = &config.pipeline;
    if pipeline.stack_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.stack_capacity cannot be 0".to_string(),
        ));
    }
    if pipeline.mailbox_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.mailbox_capacity cannot be 0".to_string(),
        ));
    }
    if pipeline.ingest_batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.ingest_batch_size cannot be 0".to_string(),
        ));
    }
    if pipeline.stats_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.stats_interval_ms cannot be 0".to_string(),
        ));
    }

    if let Some(generation) = &config.generation {
        generation
            .run
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("generation: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationSection, ServerConfig};
    use crate::pipeline::{GenerationConfig, PipelineConfig};
    use std::net::IpAddr;

    fn generation(download_base_url: &str) -> GenerationSection {
        GenerationSection {
            autostart: true,
            run: GenerationConfig::new(
                "https://github.com/example/canvas-history",
                download_base_url,
                "https://game.example.com",
                "/data/commits.txt",
            ),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config {
            generation: Some(generation("https://raw.example.com/canvas")),
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_mailbox_capacity_fails() {
        let config = Config {
            pipeline: PipelineConfig {
                mailbox_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("mailbox_capacity"));
    }

    #[test]
    fn test_validate_bad_generation_url_fails() {
        let config = Config {
            generation: Some(generation("ftp://raw.example.com/canvas")),
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("download_base_url"));
    }
}
