use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub mod app;

pub use app::AppConfig;

/// Configuration file looked up in the working directory (`csmauth.toml`).
pub const DEFAULT_CONFIG_NAME: &str = "csmauth";
/// Prefix of environment overrides, e.g. `CSMAUTH__ENGINE__RING=Dogfood`.
pub const ENV_PREFIX: &str = "CSMAUTH";

/// Global configuration loading and access
static CONFIG: std::sync::OnceLock<ConfigLoadResult> = std::sync::OnceLock::new();

#[derive(Debug, Clone)]
pub enum ConfigLoadResult {
    Success(Box<AppConfig>),
    LoadError(String),
    DeserializeError(String),
}

/// Reads the optional configuration file, then environment overrides.
///
/// Without an explicit `path` a missing `csmauth.toml` is fine and every
/// setting falls back to its default. An explicit path must exist.
fn load_config(path: Option<&Path>) -> ConfigLoadResult {
    dotenv::dotenv().ok();

    let file_source = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };
    let env_source = Environment::with_prefix(ENV_PREFIX).separator("__");

    let config = match Config::builder()
        .add_source(file_source)
        .add_source(env_source) // environment entries override file values
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            return ConfigLoadResult::LoadError(format!(
                "Configuration loading failed: {e}. Please check your csmauth.toml file and environment variables."
            ));
        }
    };

    match config.try_deserialize::<AppConfig>() {
        Ok(app_config) => {
            if let Err(e) = app_config.engine().validate() {
                return ConfigLoadResult::DeserializeError(e.to_string());
            }
            ConfigLoadResult::Success(Box::new(app_config))
        }
        Err(e) => ConfigLoadResult::DeserializeError(format!("Failed to deserialize config: {e}")),
    }
}

/// Loads the configuration once per process; later calls return the same result.
pub fn init_config(path: Option<PathBuf>) -> anyhow::Result<&'static AppConfig> {
    match CONFIG.get_or_init(|| load_config(path.as_deref())) {
        ConfigLoadResult::Success(config) => Ok(config),
        ConfigLoadResult::LoadError(e) => Err(anyhow::anyhow!("Failed to load config: {e}")),
        ConfigLoadResult::DeserializeError(e) => {
            Err(anyhow::anyhow!("Failed to deserialize config: {e}"))
        }
    }
}

/// Additional logging configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    level: Option<String>,
    file: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}
