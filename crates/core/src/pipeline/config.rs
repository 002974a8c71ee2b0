//! Configuration for the generation pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::error::PipelineError;
use super::types::Stage;

/// Process-wide pipeline settings, fixed when the generator is spawned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Download workers spawned when a generation starts.
    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    /// Render workers spawned when a generation starts.
    #[serde(default = "default_render_workers")]
    pub render_workers: usize,

    /// Save workers spawned when a generation starts.
    #[serde(default = "default_save_workers")]
    pub save_workers: usize,

    /// Initial capacity of each inter-stage stack.
    #[serde(default = "default_stack_capacity")]
    pub stack_capacity: usize,

    /// Maximum number of queued commands for the main loop.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Commit records ingested per continuation.
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,

    /// Download stack depth above which ingestion backs off.
    #[serde(default = "default_ingest_high_watermark")]
    pub ingest_high_watermark: usize,

    /// Delay before the next ingest batch when above the watermark.
    #[serde(default = "default_ingest_backoff")]
    pub ingest_backoff_ms: u64,

    /// Per-request timeout for downloads and user lookups.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Statistics collection interval in milliseconds.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,

    /// Capacity of the pipeline event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_download_workers() -> usize {
    4
}

fn default_render_workers() -> usize {
    2
}

fn default_save_workers() -> usize {
    1
}

fn default_stack_capacity() -> usize {
    256
}

fn default_mailbox_capacity() -> usize {
    1024
}

fn default_ingest_batch_size() -> usize {
    32
}

fn default_ingest_high_watermark() -> usize {
    252
}

fn default_ingest_backoff() -> u64 {
    500
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_stats_interval() -> u64 {
    1000 // 1 second
}

fn default_event_capacity() -> usize {
    256
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_workers: default_download_workers(),
            render_workers: default_render_workers(),
            save_workers: default_save_workers(),
            stack_capacity: default_stack_capacity(),
            mailbox_capacity: default_mailbox_capacity(),
            ingest_batch_size: default_ingest_batch_size(),
            ingest_high_watermark: default_ingest_high_watermark(),
            ingest_backoff_ms: default_ingest_backoff(),
            fetch_timeout_secs: default_fetch_timeout(),
            stats_interval_ms: default_stats_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Sets the default worker count for a stage.
    pub fn with_workers(mut self, stage: Stage, count: usize) -> Self {
        match stage {
            Stage::Download => self.download_workers = count,
            Stage::Render => self.render_workers = count,
            Stage::Save => self.save_workers = count,
        }
        self
    }

    /// Sets the ingest batch size.
    pub fn with_ingest_batch_size(mut self, size: usize) -> Self {
        self.ingest_batch_size = size;
        self
    }

    /// Sets the statistics interval.
    pub fn with_stats_interval_ms(mut self, ms: u64) -> Self {
        self.stats_interval_ms = ms;
        self
    }

    /// Number of workers a stage starts with.
    pub fn workers_for(&self, stage: Stage) -> usize {
        match stage {
            Stage::Download => self.download_workers,
            Stage::Render => self.render_workers,
            Stage::Save => self.save_workers,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn ingest_backoff(&self) -> Duration {
        Duration::from_millis(self.ingest_backoff_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Configuration of a single generation run.
///
/// Set once when generation starts and read-only until it stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Repository the commit history comes from.
    pub repo_url: String,

    /// Base URL serving `{hash}/place`, `{hash}/placers` and `{hash}/metadata.json`.
    pub download_base_url: String,

    /// Game server base URL serving `users/{id}`.
    pub game_server_base_url: String,

    /// Extracted commit log to ingest.
    pub commit_log: PathBuf,

    /// Number of placers listed in the top placers image.
    #[serde(default = "default_max_top_placers")]
    pub max_top_placers: usize,

    /// Root directory for saved artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// When non-empty, only commits by these authors are ingested.
    #[serde(default)]
    pub allowed_authors: Vec<String>,
}

fn default_max_top_placers() -> usize {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl GenerationConfig {
    pub fn new(
        repo_url: impl Into<String>,
        download_base_url: impl Into<String>,
        game_server_base_url: impl Into<String>,
        commit_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            download_base_url: download_base_url.into(),
            game_server_base_url: game_server_base_url.into(),
            commit_log: commit_log.into(),
            max_top_placers: default_max_top_placers(),
            output_dir: default_output_dir(),
            allowed_authors: Vec::new(),
        }
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the number of top placers.
    pub fn with_max_top_placers(mut self, count: usize) -> Self {
        self.max_top_placers = count;
        self
    }

    /// Check the run configuration before any resource is created.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.repo_url.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "repo_url cannot be empty".to_string(),
            ));
        }
        for (name, url) in [
            ("download_base_url", &self.download_base_url),
            ("game_server_base_url", &self.game_server_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        if self.commit_log.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "commit_log cannot be empty".to_string(),
            ));
        }
        if self.max_top_placers == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_top_placers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn author_allowed(&self, author: Option<&str>) -> bool {
        if self.allowed_authors.is_empty() {
            return true;
        }
        author.is_some_and(|a| self.allowed_authors.iter().any(|allowed| allowed == a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig::new(
            "https://github.com/example/canvas-history",
            "https://raw.example.com/canvas",
            "https://game.example.com",
            "/data/commits.txt",
        )
    }

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers_for(Stage::Download), 4);
        assert_eq!(config.workers_for(Stage::Render), 2);
        assert_eq!(config.workers_for(Stage::Save), 1);
        assert_eq!(config.stack_capacity, 256);
        assert_eq!(config.ingest_high_watermark, 252);
    }

    #[test]
    fn test_pipeline_builder() {
        let config = PipelineConfig::default()
            .with_workers(Stage::Render, 0)
            .with_ingest_batch_size(3);
        assert_eq!(config.render_workers, 0);
        assert_eq!(config.ingest_batch_size, 3);
    }

    #[test]
    fn test_generation_validate() {
        assert!(config().validate().is_ok());

        let bad = GenerationConfig {
            game_server_base_url: "game.example.com".to_string(),
            ..config()
        };
        assert!(matches!(
            bad.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let zero_top = config().with_max_top_placers(0);
        assert!(zero_top.validate().is_err());
    }

    #[test]
    fn test_author_filter() {
        let open = config();
        assert!(open.author_allowed(None));
        assert!(open.author_allowed(Some("anyone")));

        let filtered = GenerationConfig {
            allowed_authors: vec!["canvas-bot".to_string()],
            ..config()
        };
        assert!(filtered.author_allowed(Some("canvas-bot")));
        assert!(!filtered.author_allowed(Some("someone-else")));
        assert!(!filtered.author_allowed(None));
    }
}
