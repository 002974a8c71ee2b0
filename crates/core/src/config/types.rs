use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::pipeline::{GenerationConfig, PipelineConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub generation: Option<GenerationSection>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("timelapse.db")
}

/// The `[generation]` section: a run configuration plus boot behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationSection {
    /// Start generating as soon as the server is up.
    #[serde(default)]
    pub autostart: bool,
    #[serde(flatten)]
    pub run: GenerationConfig,
}

/// Config view for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<SanitizedGenerationConfig>,
}

/// Generation settings without the author allow-list contents.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGenerationConfig {
    pub autostart: bool,
    pub repo_url: String,
    pub download_base_url: String,
    pub game_server_base_url: String,
    pub commit_log: PathBuf,
    pub output_dir: PathBuf,
    pub max_top_placers: usize,
    pub author_filter_enabled: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            pipeline: config.pipeline.clone(),
            generation: config
                .generation
                .as_ref()
                .map(|g| SanitizedGenerationConfig {
                    autostart: g.autostart,
                    repo_url: g.run.repo_url.clone(),
                    download_base_url: g.run.download_base_url.clone(),
                    game_server_base_url: g.run.game_server_base_url.clone(),
                    commit_log: g.run.commit_log.clone(),
                    output_dir: g.run.output_dir.clone(),
                    max_top_placers: g.run.max_top_placers,
                    author_filter_enabled: !g.run.allowed_authors.is_empty(),
                }),
        }
    }
}
