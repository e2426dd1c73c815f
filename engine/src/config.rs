use crate::common::EngineError;
use crate::environment::DeploymentRing;
use crate::storage::CacheFiles;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Public client id of the command-line tool registered with the identity provider.
pub const DEFAULT_CLIENT_ID: &str = "1950a258-227b-4e31-a9cf-717495945fc2";
/// Out-of-band redirect URI used by native clients.
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
/// Resource every cached credential is issued for.
pub const DEFAULT_RESOURCE: &str = "https://management.core.windows.net/";
/// Tenant used for the initial interactive sign-in.
pub const DEFAULT_HOME_TENANT: &str = "common";
/// Name of the per-user cache directory under the home directory.
pub const CACHE_DIR_NAME: &str = ".csm";

/// Process-wide engine configuration.
///
/// Built once at startup and handed to [`Engine::new`](crate::Engine::new).
/// Every field has a default, so an empty TOML table or environment yields a
/// working production configuration.
///
/// # Examples
///
/// ```no_run
/// use engine::{DeploymentRing, EngineConfig};
///
/// let config = EngineConfig {
///     ring: Some(DeploymentRing::Ring2),
///     cache_dir: Some("/tmp/csm-test".into()),
///     ..EngineConfig::default()
/// };
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit ring override. When unset, the most recently used ring is
    /// read from the cache directory, falling back to production.
    pub ring: Option<DeploymentRing>,
    pub home_tenant_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub resource: String,
    /// Cache directory (defaults to `~/.csm`)
    pub cache_dir: Option<PathBuf>,
    /// Passphrase protecting the cache files. When unset, a random per-user
    /// key file is created in the cache directory.
    pub passphrase: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring: None,
            home_tenant_id: DEFAULT_HOME_TENANT.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            cache_dir: None,
            passphrase: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("ring", &self.ring)
            .field("home_tenant_id", &self.home_tenant_id)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("resource", &self.resource)
            .field("cache_dir", &self.cache_dir)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl EngineConfig {
    /// Resolves the cache directory and the file set inside it.
    pub fn cache_files(&self) -> Result<CacheFiles, EngineError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(CacheFiles::new(dir.clone()));
        }

        dirs::home_dir()
            .map(|home| CacheFiles::new(home.join(CACHE_DIR_NAME)))
            .ok_or_else(|| {
                EngineError::Configuration(
                    "Cannot determine home directory for the token cache".to_string(),
                )
            })
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let required = [
            ("home_tenant_id", &self.home_tenant_id),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("resource", &self.resource),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(EngineError::Configuration(format!("{name} cannot be empty")));
            }
        }

        Ok(())
    }
}
