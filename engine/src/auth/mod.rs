//! Credentials, the token cache and everything that talks to the identity provider.

pub mod acquisition_worker;
pub mod azure_ad;
pub mod credential;
pub mod provider;
pub mod token_cache;

pub use acquisition_worker::AcquisitionWorker;
pub use azure_ad::{AzureAdIdentityProvider, DeviceCodePrompt};
pub use credential::Credential;
pub use provider::{
    AcquireRequest, Acquisition, ClientSecretRequest, IdentityProvider, SilentRequest,
};
pub use token_cache::{CacheKey, TokenCache, TokenCacheStore};
