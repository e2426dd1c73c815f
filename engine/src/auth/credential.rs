use crate::common::EngineError;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Bearer credential issued by the identity provider for one tenant and user.
///
/// Apart from the fields below the credential is opaque to the engine. It is
/// cached as a text blob produced by [`to_blob`](Self::to_blob).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry instant (UTC)
    pub expires_on: DateTime<Utc>,
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl Credential {
    /// A credential is valid while its expiry is strictly in the future.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on > now
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    /// Expired, but carries a refresh token that can be redeemed silently.
    pub fn is_refreshable(&self) -> bool {
        !self.is_valid() && self.has_refresh_token()
    }

    /// Value for the HTTP `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn to_blob(&self) -> Result<String, EngineError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize credential: {e}")))?;
        Ok(general_purpose::STANDARD.encode(json))
    }

    pub fn from_blob(blob: &str) -> Result<Self, EngineError> {
        let json = general_purpose::STANDARD
            .decode(blob.trim())
            .map_err(|e| EngineError::corrupt("<credential blob>", format!("Invalid base64: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| EngineError::corrupt("<credential blob>", format!("Invalid credential: {e}")))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("tenant_id", &self.tenant_id)
            .field("user_id", &self.user_id)
            .field("expires_on", &self.expires_on)
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.has_refresh_token())
            .finish_non_exhaustive()
    }
}
