use crate::encryption::EncryptionError;
use thiserror::Error;

/// Errors produced by the credential cache and tenant resolution engine.
///
/// Every fallible engine operation returns this type. The variants mirror the
/// ways a resolution or sign-in can go wrong, so callers can decide whether a
/// failure is recoverable by signing in again, needs user disambiguation or
/// should simply be reported.
///
/// # Error Categories
///
/// ## Resolution Errors
/// - [`TenantNotFound`] - The id matches no cached tenant, subscription or credential
/// - [`AmbiguousUser`] - More than one cached user signed into the same tenant
/// - [`NoRecentCredential`] - The recent-credential fallback has nothing on disk
///
/// ## Remote Errors
/// - [`AcquisitionFailed`] - The identity provider refused or failed the request
/// - [`RemoteApi`] - Directory or resource manager answered with a non-success status
/// - [`Http`] - The request never produced a status code
/// - [`DataShape`] - A success response was missing a required field
///
/// ## Local Errors
/// - [`CorruptCache`] - A persisted file could not be decrypted or parsed
/// - [`Storage`] - The cache directory could not be written
/// - [`Configuration`] - Invalid engine configuration
///
/// # Examples
///
/// ```no_run
/// use engine::EngineError;
///
/// fn explain(error: &EngineError) -> &'static str {
///     match error {
///         EngineError::TenantNotFound { .. } => "run `csmauth login` again",
///         EngineError::AmbiguousUser { .. } => "pass an explicit user",
///         _ => "unexpected failure",
///     }
/// }
/// ```
///
/// [`TenantNotFound`]: EngineError::TenantNotFound
/// [`AmbiguousUser`]: EngineError::AmbiguousUser
/// [`NoRecentCredential`]: EngineError::NoRecentCredential
/// [`AcquisitionFailed`]: EngineError::AcquisitionFailed
/// [`RemoteApi`]: EngineError::RemoteApi
/// [`Http`]: EngineError::Http
/// [`DataShape`]: EngineError::DataShape
/// [`CorruptCache`]: EngineError::CorruptCache
/// [`Storage`]: EngineError::Storage
/// [`Configuration`]: EngineError::Configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The tenant or subscription id is unknown to the local caches.
    ///
    /// Recoverable by running a full sign-in, which repopulates the
    /// tenant directory and the token cache.
    #[error("Cannot find tenant {id} in cache!")]
    TenantNotFound { id: String },

    /// Several users hold a credential for the same tenant.
    ///
    /// The engine never guesses which one to use; the candidates are
    /// listed so a higher layer can ask for an explicit user.
    #[error("Multiple users found for tenant {tenant_id}: {}. Please specify user argument!", users.join(", "))]
    AmbiguousUser {
        tenant_id: String,
        users: Vec<String>,
    },

    /// The identity provider call failed (user cancelled, invalid grant, network).
    ///
    /// Surfaced verbatim and never retried automatically.
    #[error("Token acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// Directory or resource manager service returned a non-success status.
    #[error("Remote API error (HTTP {status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// Transport failure before any HTTP status was received.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A successful response did not have the expected shape.
    #[error("Unexpected response shape: {0}")]
    DataShape(String),

    /// A persisted cache file exists but cannot be decrypted or parsed.
    #[error("Cache file {path} is corrupt: {reason}")]
    CorruptCache { path: String, reason: String },

    /// No recent credential has been recorded yet.
    #[error("No recent credential found. Please sign in first.")]
    NoRecentCredential,

    /// Writing to or managing the cache directory failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The engine configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Builds a [`EngineError::CorruptCache`] for the given file.
    pub fn corrupt(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::CorruptCache {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` when a fresh sign-in is the expected way out.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            EngineError::TenantNotFound { .. } | EngineError::NoRecentCredential
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Http(err.to_string())
    }
}

impl From<EncryptionError> for EngineError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::EncryptionFailed(_) | EncryptionError::KeyDerivation(_) => {
                EngineError::Storage(err.to_string())
            }
            EncryptionError::InvalidData(_) | EncryptionError::DecryptionFailed(_) => {
                EngineError::CorruptCache {
                    path: String::from("<protected storage>"),
                    reason: err.to_string(),
                }
            }
        }
    }
}
