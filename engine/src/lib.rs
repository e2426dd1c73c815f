//! # csmauth Engine Library
//!
//! Credential cache and tenant resolution engine for a multi-tenant cloud
//! identity provider. The engine signs a user in once, discovers every
//! tenant and subscription they can reach, and afterwards maps a tenant or
//! subscription id to a cached, automatically refreshed credential.
//!
//! ## Modules
//!
//! - [`auth`] - Credentials, the token cache and identity provider access
//! - [`directory`] - Tenant/subscription directory cache and remote discovery
//! - [`orchestrator`] - The [`Engine`] and its sign-in and resolution flows
//! - [`recent_state`] - Last-used deployment ring and credential
//! - [`storage`] - Protected (encrypted at rest) cache file storage
//! - [`encryption`] - AES-GCM primitives behind protected storage
//! - [`environment`] - Deployment rings and their endpoints
//! - [`config`] - Engine configuration
//! - [`common`] - Common error type

pub mod auth;
pub mod common;
pub mod config;
pub mod directory;
pub mod encryption;
pub mod environment;
pub mod orchestrator;
pub mod recent_state;
pub mod storage;

pub use auth::{Credential, IdentityProvider};
pub use common::EngineError;
pub use config::EngineConfig;
pub use directory::{SubscriptionInfo, TenantDiscovery, TenantInfo};
pub use environment::{DeploymentRing, Endpoints};
pub use orchestrator::{CacheSummary, Engine, SignInSummary};
pub use storage::{CacheFiles, EncryptedFileStorage, MemoryStorage, ProtectedStorage};
