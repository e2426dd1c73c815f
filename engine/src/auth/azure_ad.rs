use super::credential::Credential;
use super::provider::{AcquireRequest, ClientSecretRequest, IdentityProvider, SilentRequest};
use crate::common::EngineError;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Instructions shown to the user while a device code sign-in is pending.
#[derive(Clone, Debug)]
pub struct DeviceCodePrompt {
    pub user_code: String,
    pub verification_url: String,
    pub message: String,
}

pub type PromptCallback = Arc<dyn Fn(&DeviceCodePrompt) + Send + Sync>;

/// [`IdentityProvider`] speaking OAuth 2.0 to the identity provider's token endpoints.
///
/// - interactive sign-in uses the device code flow
/// - silent acquisition redeems a refresh token against the target tenant
/// - service principal sign-in uses the client credentials grant
#[derive(Clone)]
pub struct AzureAdIdentityProvider {
    http_client: reqwest::Client,
    prompt: PromptCallback,
}

#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_uri")]
    verification_url: String,
    #[serde(deserialize_with = "number_or_string")]
    expires_in: u64,
    #[serde(default = "default_interval", deserialize_with = "number_or_string")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(deserialize_with = "number_or_string")]
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Deserialize, Default)]
struct IdentityClaims {
    tid: Option<String>,
    upn: Option<String>,
    unique_name: Option<String>,
    email: Option<String>,
    oid: Option<String>,
    appid: Option<String>,
}

impl IdentityClaims {
    fn user_id(&self) -> Option<String> {
        [&self.upn, &self.unique_name, &self.email, &self.oid]
            .into_iter()
            .flatten()
            .find(|value| !value.is_empty())
            .cloned()
    }
}

fn default_interval() -> u64 {
    5
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// The v1 endpoints return numeric fields as strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Reads the (unverified) claims segment of a JWT.
fn decode_claims(jwt: &str) -> Option<IdentityClaims> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Absolute expiry for a token valid for `expires_in` seconds from now.
fn expiry_after(expires_in: u64) -> Result<DateTime<Utc>, EngineError> {
    i64::try_from(expires_in)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            EngineError::AcquisitionFailed(format!(
                "Token response has an out of range expires_in of {expires_in} seconds"
            ))
        })
}

fn describe_error(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => match error.error_description {
            Some(description) => format!("{}: {}", error.error, description),
            None => error.error,
        },
        Err(_) if body.trim().is_empty() => "empty response".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

impl AzureAdIdentityProvider {
    pub fn new() -> Self {
        Self::with_prompt(Arc::new(|prompt: &DeviceCodePrompt| {
            eprintln!("{}", prompt.message);
        }))
    }

    /// Uses `prompt` to show device code instructions instead of printing to stderr.
    pub fn with_prompt(prompt: PromptCallback) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            prompt,
        }
    }

    fn token_url(authority: &str) -> String {
        format!("{authority}/oauth2/token")
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<(reqwest::StatusCode, String), EngineError> {
        let response = self
            .http_client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| EngineError::AcquisitionFailed(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            EngineError::AcquisitionFailed(format!("Failed to read response from {url}: {e}"))
        })?;
        Ok((status, body))
    }

    /// Builds a credential from a token response, filling identity from the JWT claims.
    fn credential_from(
        token: TokenResponse,
        requested_tenant: &str,
        fallback_user: Option<&str>,
    ) -> Result<Credential, EngineError> {
        let claims = token
            .id_token
            .as_deref()
            .and_then(decode_claims)
            .or_else(|| decode_claims(&token.access_token))
            .unwrap_or_default();

        let tenant_id = claims
            .tid
            .clone()
            .filter(|tid| !tid.is_empty())
            .unwrap_or_else(|| requested_tenant.to_string());

        let user_id = claims
            .user_id()
            .or_else(|| fallback_user.map(str::to_string))
            .or_else(|| claims.appid.clone())
            .ok_or_else(|| {
                EngineError::AcquisitionFailed(
                    "Token response does not identify the signed-in user".to_string(),
                )
            })?;

        let expires_on = expiry_after(token.expires_in)?;

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_on,
            tenant_id,
            user_id,
            token_type: token.token_type,
        })
    }

    async fn start_device_code_flow(
        &self,
        request: &AcquireRequest,
    ) -> Result<DeviceCodeResponse, EngineError> {
        let url = format!("{}/oauth2/devicecode", request.authority());
        let params = [
            ("client_id", request.client_id.as_str()),
            ("resource", request.resource.as_str()),
        ];

        let (status, body) = self.post_form(&url, &params).await?;
        if !status.is_success() {
            return Err(EngineError::AcquisitionFailed(format!(
                "Failed to initiate device code flow ({status}): {}",
                describe_error(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            EngineError::AcquisitionFailed(format!("Failed to parse device code response: {e}"))
        })
    }

    async fn poll_device_code_token(
        &self,
        request: &AcquireRequest,
        device_code: &DeviceCodeResponse,
    ) -> Result<TokenResponse, EngineError> {
        let url = Self::token_url(&request.authority());
        let mut interval = Duration::from_secs(device_code.interval.max(1));
        let timeout = Duration::from_secs(device_code.expires_in);
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(EngineError::AcquisitionFailed(
                    "The device code has expired. Please sign in again.".to_string(),
                ));
            }

            tokio::time::sleep(interval).await;

            let params = [
                ("grant_type", "device_code"),
                ("client_id", request.client_id.as_str()),
                ("resource", request.resource.as_str()),
                ("code", device_code.device_code.as_str()),
            ];
            let (status, body) = self.post_form(&url, &params).await?;

            if status.is_success() {
                return serde_json::from_str(&body).map_err(|e| {
                    EngineError::AcquisitionFailed(format!("Failed to parse token response: {e}"))
                });
            }

            let error = serde_json::from_str::<ErrorResponse>(&body).ok();
            match error.as_ref().map(|e| e.error.as_str()) {
                Some("authorization_pending") => {
                    log::debug!("Waiting for user to complete sign-in");
                }
                Some("slow_down") => {
                    log::debug!("Polling too frequently, increasing interval");
                    interval += Duration::from_secs(5);
                }
                _ => {
                    return Err(EngineError::AcquisitionFailed(describe_error(&body)));
                }
            }
        }
    }

    async fn redeem(
        &self,
        authority: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, EngineError> {
        let (status, body) = self.post_form(&Self::token_url(authority), params).await?;
        if !status.is_success() {
            return Err(EngineError::AcquisitionFailed(describe_error(&body)));
        }
        serde_json::from_str(&body).map_err(|e| {
            EngineError::AcquisitionFailed(format!("Failed to parse token response: {e}"))
        })
    }
}

impl Default for AzureAdIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for AzureAdIdentityProvider {
    async fn acquire_interactive(
        &self,
        request: &AcquireRequest,
    ) -> Result<Credential, EngineError> {
        let device_code = self.start_device_code_flow(request).await?;

        let prompt = DeviceCodePrompt {
            message: device_code.message.clone().unwrap_or_else(|| {
                format!(
                    "To sign in, open {} and enter the code {}",
                    device_code.verification_url, device_code.user_code
                )
            }),
            user_code: device_code.user_code.clone(),
            verification_url: device_code.verification_url.clone(),
        };
        (self.prompt)(&prompt);
        log::info!("Device code sign-in initiated - awaiting user action");

        let token = self.poll_device_code_token(request, &device_code).await?;
        Self::credential_from(token, &request.tenant_id, None)
    }

    async fn acquire_silent(&self, request: &SilentRequest) -> Result<Credential, EngineError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", request.request.client_id.as_str()),
            ("resource", request.request.resource.as_str()),
            ("refresh_token", request.refresh_token.as_str()),
        ];

        let token = self.redeem(&request.request.authority(), &params).await?;
        let mut credential =
            Self::credential_from(token, &request.request.tenant_id, Some(&request.user_id))?;

        // refresh responses may omit a new refresh token; keep redeeming the old one
        if credential.refresh_token.is_none() {
            credential.refresh_token = Some(request.refresh_token.clone());
        }
        Ok(credential)
    }

    async fn acquire_with_client_secret(
        &self,
        request: &ClientSecretRequest,
    ) -> Result<Credential, EngineError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", request.app_id.as_str()),
            ("client_secret", request.app_key.as_str()),
            ("resource", request.resource.as_str()),
        ];

        let token = self.redeem(&request.authority(), &params).await?;
        Self::credential_from(token, &request.tenant_id, Some(&request.app_id))
    }
}
