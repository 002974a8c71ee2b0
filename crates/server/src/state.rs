use timelapse_core::{Config, GenerationConfig, GeneratorHandle, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    generator: GeneratorHandle,
}

impl AppState {
    pub fn new(config: Config, generator: GeneratorHandle) -> Self {
        Self { config, generator }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn generator(&self) -> &GeneratorHandle {
        &self.generator
    }

    /// Run config from the `[generation]` section, used when a start request has no body.
    pub fn default_generation(&self) -> Option<&GenerationConfig> {
        self.config.generation.as_ref().map(|section| &section.run)
    }
}
