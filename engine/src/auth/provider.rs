use super::credential::Credential;
use crate::common::EngineError;
use async_trait::async_trait;
use std::fmt;

/// Parameters shared by every user-credential acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquireRequest {
    /// Identity provider base URL for the active deployment ring
    pub login_endpoint: String,
    pub tenant_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub resource: String,
}

impl AcquireRequest {
    /// Authority URL (`{login}/{tenant}`) the request is sent to.
    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.login_endpoint.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Silent acquisition for a known user, redeeming a refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct SilentRequest {
    pub request: AcquireRequest,
    pub user_id: String,
    pub refresh_token: String,
}

impl fmt::Debug for SilentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SilentRequest")
            .field("request", &self.request)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Service principal sign-in with an application id and key.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecretRequest {
    pub login_endpoint: String,
    pub tenant_id: String,
    pub app_id: String,
    pub app_key: String,
    pub resource: String,
}

impl ClientSecretRequest {
    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.login_endpoint.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

impl fmt::Debug for ClientSecretRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretRequest")
            .field("login_endpoint", &self.login_endpoint)
            .field("tenant_id", &self.tenant_id)
            .field("app_id", &self.app_id)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// One unit of work for the acquisition worker.
#[derive(Clone, Debug)]
pub enum Acquisition {
    Interactive(AcquireRequest),
    Silent(SilentRequest),
    ClientSecret(ClientSecretRequest),
}

impl Acquisition {
    pub fn tenant_id(&self) -> &str {
        match self {
            Acquisition::Interactive(request) => &request.tenant_id,
            Acquisition::Silent(silent) => &silent.request.tenant_id,
            Acquisition::ClientSecret(request) => &request.tenant_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Acquisition::Interactive(_) => "interactive",
            Acquisition::Silent(_) => "silent",
            Acquisition::ClientSecret(_) => "client_secret",
        }
    }
}

/// Client of the identity provider that turns requests into credentials.
///
/// Implementations are only ever driven from the dedicated acquisition
/// worker (see [`AcquisitionWorker`](super::AcquisitionWorker)), one request
/// at a time, so they may assume exclusive access to any interactive prompt.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use engine::auth::{AcquireRequest, Credential, IdentityProvider, SilentRequest};
/// use engine::EngineError;
///
/// struct Offline;
///
/// #[async_trait]
/// impl IdentityProvider for Offline {
///     async fn acquire_interactive(&self, _: &AcquireRequest) -> Result<Credential, EngineError> {
///         Err(EngineError::AcquisitionFailed("offline".to_string()))
///     }
///
///     async fn acquire_silent(&self, _: &SilentRequest) -> Result<Credential, EngineError> {
///         Err(EngineError::AcquisitionFailed("offline".to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Prompts the user to sign in against the request's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AcquisitionFailed`] when the user cancels or
    /// the provider rejects the request.
    async fn acquire_interactive(&self, request: &AcquireRequest)
    -> Result<Credential, EngineError>;

    /// Obtains a credential for `request.user_id` without user interaction.
    async fn acquire_silent(&self, request: &SilentRequest) -> Result<Credential, EngineError>;

    /// Service principal sign-in. Unsupported unless overridden.
    async fn acquire_with_client_secret(
        &self,
        request: &ClientSecretRequest,
    ) -> Result<Credential, EngineError> {
        Err(EngineError::AcquisitionFailed(format!(
            "client secret sign-in is not supported for tenant {}",
            request.tenant_id
        )))
    }

    /// Dispatches an [`Acquisition`] to the matching method.
    async fn acquire(&self, acquisition: &Acquisition) -> Result<Credential, EngineError> {
        match acquisition {
            Acquisition::Interactive(request) => self.acquire_interactive(request).await,
            Acquisition::Silent(request) => self.acquire_silent(request).await,
            Acquisition::ClientSecret(request) => self.acquire_with_client_secret(request).await,
        }
    }
}
