use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("TIMELAPSE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[pipeline]
download_workers = 8
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.pipeline.download_workers, 8);
        assert_eq!(config.pipeline.render_workers, 2);
        assert!(config.generation.is_none());
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.save_workers, 1);
    }

    #[test]
    fn test_load_config_generation_section() {
        let toml = r#"
[generation]
autostart = true
repo_url = "https://github.com/example/canvas-history"
download_base_url = "https://raw.example.com/canvas"
game_server_base_url = "https://game.example.com"
commit_log = "/data/commits.txt"
allowed_authors = ["canvas-bot"]
"#;
        let config = load_config_from_str(toml).unwrap();
        let generation = config.generation.unwrap();
        assert!(generation.autostart);
        assert_eq!(generation.run.max_top_placers, 10);
        assert_eq!(generation.run.allowed_authors, vec!["canvas-bot".to_string()]);
    }

    #[test]
    fn test_load_config_generation_missing_url() {
        let toml = r#"
[generation]
repo_url = "https://github.com/example/canvas-history"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[database]
path = "/tmp/timelapse-test.db"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(
            config.database.path.to_str(),
            Some("/tmp/timelapse-test.db")
        );
    }
}
