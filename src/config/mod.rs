pub mod validation;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Environment variable that points at the YAML config file.
pub const CONFIG_PATH_ENV: &str = "GEMINI_PROXY_CONFIG";
/// Legacy override for the scratch directory, applied once at startup.
pub const SCRATCH_DIR_ENV: &str = "TEMP_FOLDER";

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_thread_stack_size_kb: Option<usize>,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_max_request_body_bytes() -> usize {
    32 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            max_request_body_bytes: default_max_request_body_bytes(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: None,
            runtime_thread_stack_size_kb: None,
        }
    }
}

/// How the text-generation child process is launched and supervised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before the model and output-format flags.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_stderr_ignore_patterns")]
    pub stderr_ignore_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
}

fn default_binary() -> String {
    "gemini".to_string()
}
fn default_output_format() -> String {
    "stream-json".to_string()
}
fn default_model() -> String {
    "gemini".to_string()
}
fn default_models() -> Vec<String> {
    [
        "gemini-2.5-flash-lite",
        "gemini-2.5-pro",
        "gemini-2.5-flash",
        "gemini-3-flash-preview",
        "gemini-3-pro-preview",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./temp")
}
fn default_stderr_ignore_patterns() -> Vec<String> {
    vec!["Loaded cached credentials.".to_string()]
}
fn default_max_buffered_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            args: Vec::new(),
            output_format: default_output_format(),
            default_model: default_model(),
            models: default_models(),
            scratch_dir: default_scratch_dir(),
            stderr_ignore_patterns: default_stderr_ignore_patterns(),
            idle_timeout_secs: None,
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit the terminal chunk and `[DONE]` even when the process never
    /// reports a `result` event.
    #[serde(default = "default_true")]
    pub finish_on_early_exit: bool,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            finish_on_early_exit: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Validation`].
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = if contents.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the config for process startup.
///
/// Reads the file named by [`CONFIG_PATH_ENV`] (or `config.yaml`); a missing
/// file yields the defaults. [`SCRATCH_DIR_ENV`] then overrides the scratch
/// directory.
///
/// # Errors
///
/// Returns any [`ConfigError`] other than a missing file.
pub fn load_startup_config() -> Result<AppConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = match load_config(&path) {
        Ok(config) => config,
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            AppConfig::default()
        }
        Err(err) => return Err(err),
    };
    if let Ok(dir) = std::env::var(SCRATCH_DIR_ENV) {
        if !dir.trim().is_empty() {
            config.generator.scratch_dir = PathBuf::from(dir);
        }
    }
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.generator.binary, "gemini");
        assert_eq!(config.generator.output_format, "stream-json");
        assert_eq!(config.generator.scratch_dir, PathBuf::from("./temp"));
        assert_eq!(config.generator.models.len(), 5);
        assert!(config.generator.idle_timeout_secs.is_none());
        assert!(config.features.finish_on_early_exit);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r"
server:
  port: 8080
generator:
  binary: /usr/local/bin/gemini
  scratch_dir: /tmp/prompts
  idle_timeout_secs: 90
features:
  log_level: DEBUG
";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_request_body_bytes, 32 * 1024 * 1024);
        assert_eq!(config.generator.binary, "/usr/local/bin/gemini");
        assert_eq!(config.generator.scratch_dir, PathBuf::from("/tmp/prompts"));
        assert_eq!(config.generator.idle_timeout_secs, Some(90));
        assert_eq!(config.generator.default_model, "gemini");
        assert_eq!(config.features.log_level, "DEBUG");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config = parse_config(include_str!("../../config.example.yaml")).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.generator.models, defaults.generator.models);
        assert_eq!(
            config.generator.max_buffered_bytes,
            defaults.generator.max_buffered_bytes
        );
        assert!(config.features.finish_on_early_exit);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let err = parse_config("server: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_load_config_missing_file_is_io_error() {
        let err = load_config("/definitely/not/here/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
