#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use engine::auth::{
    AcquireRequest, ClientSecretRequest, Credential, IdentityProvider, SilentRequest,
    TokenCache, TokenCacheStore,
};
use engine::directory::{
    SubscriptionInfo, TenantCacheStore, TenantDetails, TenantDirectory, TenantDiscovery,
    TenantInfo, VerifiedDomain,
};
use engine::{CacheFiles, Endpoints, Engine, EngineConfig, EngineError, MemoryStorage};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CACHE_DIR: &str = "/home/test/.csm";
pub const USER: &str = "alice@contoso.com";

pub fn config() -> EngineConfig {
    EngineConfig {
        cache_dir: Some(PathBuf::from(CACHE_DIR)),
        ..EngineConfig::default()
    }
}

pub fn files() -> CacheFiles {
    CacheFiles::new(CACHE_DIR)
}

pub fn credential(
    tenant: &str,
    user: &str,
    expires_in: Duration,
    refresh: Option<&str>,
) -> Credential {
    Credential {
        access_token: format!("access-{tenant}-{user}"),
        refresh_token: refresh.map(str::to_string),
        expires_on: Utc::now() + expires_in,
        tenant_id: tenant.to_string(),
        user_id: user.to_string(),
        token_type: "Bearer".to_string(),
    }
}

pub fn tenant(id: &str, subscriptions: &[&str]) -> TenantInfo {
    TenantInfo {
        tenant_id: id.to_string(),
        display_name: format!("Tenant {id}"),
        domain: format!("{id}.onmicrosoft.com"),
        subscriptions: subscriptions.iter().map(|s| subscription(s)).collect(),
    }
}

pub fn subscription(id: &str) -> SubscriptionInfo {
    SubscriptionInfo {
        subscription_id: id.to_string(),
        display_name: format!("Subscription {id}"),
    }
}

/// Writes credentials into the token cache file the engine will load.
pub fn seed_tokens(storage: &Arc<MemoryStorage>, credentials: &[Credential]) {
    let config = config();
    let mut cache = TokenCache::new();
    for credential in credentials {
        cache
            .insert_credential(credential, &config.client_id, &config.resource)
            .unwrap();
    }
    TokenCacheStore::new(storage.clone(), files())
        .save(&cache)
        .unwrap();
}

pub fn seed_directory(storage: &Arc<MemoryStorage>, tenants: &[TenantInfo]) {
    let mut directory = TenantDirectory::new();
    for info in tenants {
        directory.insert(info.clone());
    }
    TenantCacheStore::new(storage.clone(), files())
        .save(&directory)
        .unwrap();
}

pub fn stored_tokens(storage: &Arc<MemoryStorage>) -> Vec<Credential> {
    TokenCacheStore::new(storage.clone(), files())
        .load()
        .unwrap()
        .credentials()
        .unwrap()
}

pub fn stored_directory(storage: &Arc<MemoryStorage>) -> TenantDirectory {
    TenantCacheStore::new(storage.clone(), files()).load().unwrap()
}

pub fn engine_with(
    storage: &Arc<MemoryStorage>,
    provider: &Arc<ScriptedProvider>,
    discovery: &Arc<ScriptedDiscovery>,
) -> Engine {
    Engine::new(
        config(),
        storage.clone(),
        provider.clone(),
        discovery.clone(),
    )
    .unwrap()
}

/// Identity provider double.
///
/// Interactive sign-in returns a credential for `home_tenant`; silent
/// acquisition issues a fresh credential for the requested tenant unless the
/// tenant is listed in `failing_tenants` or the refresh token is `revoked`.
pub struct ScriptedProvider {
    pub user_id: String,
    pub home_tenant: String,
    pub failing_tenants: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    issued: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(home_tenant: &str) -> Self {
        Self {
            user_id: USER.to_string(),
            home_tenant: home_tenant.to_string(),
            failing_tenants: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, tenant: &str) -> Self {
        self.failing_tenants.insert(tenant.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn issue(&self, tenant: &str, user: &str) -> Credential {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Credential {
            access_token: format!("issued-{tenant}-{n}"),
            refresh_token: Some(format!("refresh-{n}")),
            expires_on: Utc::now() + Duration::hours(1),
            tenant_id: tenant.to_string(),
            user_id: user.to_string(),
            token_type: "Bearer".to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn acquire_interactive(
        &self,
        request: &AcquireRequest,
    ) -> Result<Credential, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("interactive:{}", request.tenant_id));
        Ok(self.issue(&self.home_tenant, &self.user_id))
    }

    async fn acquire_silent(&self, request: &SilentRequest) -> Result<Credential, EngineError> {
        let tenant = request.request.tenant_id.as_str();
        self.calls.lock().unwrap().push(format!("silent:{tenant}"));

        if self.failing_tenants.contains(tenant) || request.refresh_token == "revoked" {
            return Err(EngineError::AcquisitionFailed(format!(
                "AADSTS50020: user not allowed in tenant {tenant}"
            )));
        }
        Ok(self.issue(tenant, &request.user_id))
    }

    async fn acquire_with_client_secret(
        &self,
        request: &ClientSecretRequest,
    ) -> Result<Credential, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("client_secret:{}", request.tenant_id));
        let mut credential = self.issue(&request.tenant_id, &request.app_id);
        credential.refresh_token = None;
        Ok(credential)
    }
}

/// Discovery double returning canned tenants, details and subscriptions.
#[derive(Default)]
pub struct ScriptedDiscovery {
    pub tenants: Vec<String>,
    pub subscriptions: HashMap<String, Vec<SubscriptionInfo>>,
    pub failing_details: HashSet<String>,
    pub failing_subscriptions: HashSet<String>,
    pub detail_calls: Mutex<Vec<String>>,
}

impl ScriptedDiscovery {
    pub fn with_tenants(tenants: &[&str]) -> Self {
        Self {
            tenants: tenants.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn subscriptions(mut self, tenant: &str, ids: &[&str]) -> Self {
        self.subscriptions
            .insert(tenant.to_string(), ids.iter().map(|s| subscription(s)).collect());
        self
    }

    pub fn failing_details(mut self, tenant: &str) -> Self {
        self.failing_details.insert(tenant.to_string());
        self
    }

    pub fn failing_subscriptions(mut self, tenant: &str) -> Self {
        self.failing_subscriptions.insert(tenant.to_string());
        self
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TenantDiscovery for ScriptedDiscovery {
    async fn list_tenant_ids(
        &self,
        _endpoints: &Endpoints,
        _credential: &Credential,
    ) -> Result<Vec<String>, EngineError> {
        Ok(self.tenants.clone())
    }

    async fn list_subscriptions(
        &self,
        _endpoints: &Endpoints,
        credential: &Credential,
    ) -> Result<Vec<SubscriptionInfo>, EngineError> {
        if self.failing_subscriptions.contains(&credential.tenant_id) {
            return Err(EngineError::RemoteApi {
                status: 403,
                message: "The client does not have authorization".to_string(),
            });
        }
        Ok(self
            .subscriptions
            .get(&credential.tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_tenant_details(
        &self,
        _endpoints: &Endpoints,
        _credential: &Credential,
        tenant_id: &str,
    ) -> Result<TenantDetails, EngineError> {
        self.detail_calls.lock().unwrap().push(tenant_id.to_string());

        if self.failing_details.contains(tenant_id) {
            return Err(EngineError::RemoteApi {
                status: 500,
                message: "Insufficient privileges to complete the operation.".to_string(),
            });
        }
        Ok(TenantDetails {
            object_id: tenant_id.to_string(),
            display_name: format!("Tenant {tenant_id}"),
            verified_domains: vec![VerifiedDomain {
                default: true,
                name: format!("{tenant_id}.onmicrosoft.com"),
            }],
        })
    }
}
