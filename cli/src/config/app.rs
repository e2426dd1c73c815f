use super::LoggingConfig;
use engine::EngineConfig;
use serde::Deserialize;

/// Top-level configuration for the `csmauth` binary.
///
/// ```toml
/// [engine]
/// ring = "Dogfood"
/// home_tenant_id = "common"
///
/// [logging]
/// level = "debug"
/// file = "csmauth.log"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    engine: EngineConfig,
    logging: LoggingConfig,
}

impl AppConfig {
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}
