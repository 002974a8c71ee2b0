pub mod canvas;
pub mod config;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod render;
pub mod testing;
pub mod transport;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use persistence::{Persistence, PersistenceError, SqlitePersistence};
pub use pipeline::{
    Dependencies, GenerationConfig, Generator, GeneratorHandle, PipelineConfig, PipelineError,
    PipelineEvent, Stage, StatsSnapshot,
};
pub use render::{PngRenderer, Renderer};
pub use transport::{HttpTransport, Transport};
