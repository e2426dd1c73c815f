use crate::auth::{
    AcquireRequest, Acquisition, AcquisitionWorker, AzureAdIdentityProvider, CacheKey,
    ClientSecretRequest, Credential, IdentityProvider, SilentRequest, TokenCache, TokenCacheStore,
};
use crate::common::EngineError;
use crate::config::EngineConfig;
use crate::directory::{
    HttpTenantDiscovery, SubscriptionInfo, TenantCacheStore, TenantDirectory, TenantDiscovery,
    TenantInfo, infrastructure_tenant_details, is_infrastructure_tenant,
};
use crate::environment::{DeploymentRing, Endpoints};
use crate::recent_state::RecentState;
use crate::storage::{CacheFiles, EncryptedFileStorage, ProtectedStorage};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

/// One line of the cache dump: a signed-in user and what their tenant holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSummary {
    pub user_id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub domain: String,
    pub subscriptions: Vec<SubscriptionInfo>,
}

/// Outcome of a full sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInSummary {
    pub user_id: String,
    pub home_tenant_id: String,
    /// Tenants written to the directory cache, in discovery order
    pub tenants: Vec<TenantInfo>,
    /// Tenants for which no credential could be acquired
    pub skipped: Vec<String>,
}

/// The credential cache and tenant resolution engine.
///
/// `Engine` owns the in-memory token cache (loaded lazily on first use), the
/// persisted tenant directory, the recent-state files and the dedicated
/// acquisition worker that every identity provider call goes through.
///
/// # Resolution
///
/// [`get_by_tenant`](Self::get_by_tenant) accepts either a tenant id or a
/// subscription id and maps it to exactly one cached credential, refreshing
/// it silently when it has expired.
/// [`get_by_subscription`](Self::get_by_subscription) does the same from a
/// subscription id but falls back to the most recently used credential when
/// no cached tenant lists that subscription.
///
/// # Examples
///
/// ```no_run
/// use engine::{DeploymentRing, Engine, EngineConfig};
///
/// # async fn run() -> Result<(), engine::EngineError> {
/// let engine = Engine::with_defaults(EngineConfig::default())?;
///
/// if !engine.is_cache_valid().await? {
///     engine.acquire_and_populate(DeploymentRing::Production).await?;
/// }
///
/// let credential = engine.get_by_subscription("00000000-0000-0000-0000-000000000000").await?;
/// println!("{}", credential.authorization_header());
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    token_store: TokenCacheStore,
    tenant_store: TenantCacheStore,
    recent: RecentState,
    discovery: Arc<dyn TenantDiscovery>,
    worker: AcquisitionWorker,

    // Resolved once, overridden by sign-in
    ring: Mutex<Option<DeploymentRing>>,
    // Loaded on first access
    token_cache: Mutex<Option<TokenCache>>,
}

impl Engine {
    /// Creates an engine over explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] for an invalid configuration
    /// and [`EngineError::AcquisitionFailed`] when the acquisition worker
    /// thread cannot be started.
    pub fn new(
        config: EngineConfig,
        storage: Arc<dyn ProtectedStorage>,
        provider: Arc<dyn IdentityProvider>,
        discovery: Arc<dyn TenantDiscovery>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let files = config.cache_files()?;

        Ok(Self {
            token_store: TokenCacheStore::new(storage.clone(), files.clone()),
            tenant_store: TenantCacheStore::new(storage.clone(), files.clone()),
            recent: RecentState::new(storage, files),
            discovery,
            worker: AcquisitionWorker::spawn(provider)?,
            ring: Mutex::new(config.ring),
            token_cache: Mutex::new(None),
            config,
        })
    }

    /// Creates an engine backed by encrypted files in the cache directory,
    /// the OAuth identity provider and the HTTP discovery client.
    pub fn with_defaults(config: EngineConfig) -> Result<Self, EngineError> {
        let files: CacheFiles = config.cache_files()?;
        let storage = Arc::new(EncryptedFileStorage::new(&files, config.passphrase.clone()));

        Self::new(
            config,
            storage,
            Arc::new(AzureAdIdentityProvider::new()),
            Arc::new(HttpTenantDiscovery::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The deployment ring in effect.
    ///
    /// An explicit ring (configuration or the last sign-in of this process)
    /// wins, then the ring recorded by the last sign-in on disk, then
    /// production.
    pub async fn current_ring(&self) -> Result<DeploymentRing, EngineError> {
        let mut ring = self.ring.lock().await;
        if let Some(ring) = *ring {
            return Ok(ring);
        }

        let resolved = match self.recent.load_ring()? {
            Some(recent) => recent,
            None => {
                log::warn!(
                    "No recent environment recorded, using {}",
                    DeploymentRing::Production
                );
                DeploymentRing::Production
            }
        };
        *ring = Some(resolved);
        Ok(resolved)
    }

    async fn set_ring(&self, ring: DeploymentRing) {
        *self.ring.lock().await = Some(ring);
    }

    async fn token_cache(&self) -> Result<MappedMutexGuard<'_, TokenCache>, EngineError> {
        let mut slot = self.token_cache.lock().await;
        if slot.is_none() {
            *slot = Some(self.token_store.load()?);
        }
        Ok(MutexGuard::map(slot, |slot| {
            slot.get_or_insert_with(TokenCache::new)
        }))
    }

    /// Like [`token_cache`](Self::token_cache), but a corrupt file is replaced
    /// by an empty cache. Used by sign-in, which rewrites the file anyway.
    async fn token_cache_for_sign_in(
        &self,
    ) -> Result<MappedMutexGuard<'_, TokenCache>, EngineError> {
        let mut slot = self.token_cache.lock().await;
        if slot.is_none() {
            let cache = match self.token_store.load() {
                Ok(cache) => cache,
                Err(EngineError::CorruptCache { path, reason }) => {
                    log::warn!("Discarding unreadable token cache {path}: {reason}");
                    TokenCache::new()
                }
                Err(e) => return Err(e),
            };
            *slot = Some(cache);
        }
        Ok(MutexGuard::map(slot, |slot| {
            slot.get_or_insert_with(TokenCache::new)
        }))
    }

    fn acquire_request(&self, endpoints: &Endpoints, tenant_id: &str) -> AcquireRequest {
        AcquireRequest {
            login_endpoint: endpoints.login.clone(),
            tenant_id: tenant_id.to_string(),
            client_id: self.config.client_id.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            resource: self.config.resource.clone(),
        }
    }

    fn cache_key(&self, credential: &Credential) -> CacheKey {
        CacheKey::for_credential(credential, &self.config.client_id, &self.config.resource)
    }

    /// Interactive sign-in followed by the tenant fan-out.
    ///
    /// Signs in against the home tenant, then for every tenant the user
    /// belongs to (in discovery order) acquires a credential silently,
    /// fetches the tenant details and subscriptions and records the result
    /// in the directory cache. A tenant whose credential cannot be acquired
    /// is skipped; failing detail or subscription lookups leave placeholders.
    /// Neither aborts the remaining tenants.
    ///
    /// # Errors
    ///
    /// Fails only when the interactive sign-in, the tenant listing or
    /// persisting the caches fails.
    pub async fn acquire_and_populate(
        &self,
        ring: DeploymentRing,
    ) -> Result<SignInSummary, EngineError> {
        self.set_ring(ring).await;
        let endpoints = ring.endpoints();

        let home = self
            .worker
            .submit(Acquisition::Interactive(
                self.acquire_request(&endpoints, &self.config.home_tenant_id),
            ))
            .await?;
        log::info!("Welcome {} (Tenant: {})", home.user_id, home.tenant_id);

        let tenant_ids = self.discovery.list_tenant_ids(&endpoints, &home).await?;
        log::info!("User belongs to {} tenants", tenant_ids.len());

        let mut cache = self.token_cache_for_sign_in().await?;
        let home_key = self.cache_key(&home);
        cache.insert(home_key, home.to_blob()?);

        let mut directory = match self.tenant_store.load() {
            Ok(directory) => directory,
            Err(EngineError::CorruptCache { path, reason }) => {
                log::warn!("Discarding unreadable tenant cache {path}: {reason}");
                TenantDirectory::new()
            }
            Err(e) => return Err(e),
        };

        let mut tenants = Vec::with_capacity(tenant_ids.len());
        let mut skipped = Vec::new();
        for tenant_id in tenant_ids {
            match self
                .populate_tenant(&endpoints, &home, &tenant_id, &mut cache)
                .await
            {
                Some(info) => {
                    directory.insert(info.clone());
                    tenants.push(info);
                }
                None => skipped.push(tenant_id),
            }
        }

        self.tenant_store.save(&directory)?;
        self.recent.save_ring(ring)?;
        self.recent.save_credential(&home)?;
        self.token_store.save(&cache)?;

        Ok(SignInSummary {
            user_id: home.user_id,
            home_tenant_id: home.tenant_id,
            tenants,
            skipped,
        })
    }

    /// Acquire → details → subscriptions for a single tenant.
    ///
    /// Returns `None` when no credential could be acquired for the tenant.
    async fn populate_tenant(
        &self,
        endpoints: &Endpoints,
        home: &Credential,
        tenant_id: &str,
        cache: &mut TokenCache,
    ) -> Option<TenantInfo> {
        let credential = match self
            .acquire_for_tenant(endpoints, home, tenant_id, cache)
            .await
        {
            Ok(credential) => credential,
            Err(e) => {
                log::warn!("User: {}, Tenant: {} {}", home.user_id, tenant_id, e);
                return None;
            }
        };

        let mut info = TenantInfo::placeholder(tenant_id);

        let details = if is_infrastructure_tenant(tenant_id) {
            Ok(infrastructure_tenant_details(tenant_id))
        } else {
            self.discovery
                .get_tenant_details(endpoints, &credential, tenant_id)
                .await
        };
        match details.and_then(|details| {
            let domain = details.default_domain()?.to_string();
            Ok((details.display_name, domain))
        }) {
            Ok((display_name, domain)) => {
                log::info!(
                    "User: {}, Tenant: {} {} ({})",
                    credential.user_id,
                    tenant_id,
                    display_name,
                    domain
                );
                info.display_name = display_name;
                info.domain = domain;
            }
            Err(e) => {
                log::warn!("User: {}, Tenant: {} {}", credential.user_id, tenant_id, e);
            }
        }

        match self
            .discovery
            .list_subscriptions(endpoints, &credential)
            .await
        {
            Ok(subscriptions) => {
                log::info!("\tThere are {} subscriptions", subscriptions.len());
                for subscription in &subscriptions {
                    log::info!(
                        "\tSubscription {} ({})",
                        subscription.subscription_id,
                        subscription.display_name
                    );
                }
                info.subscriptions = subscriptions;
            }
            Err(e) => log::warn!("\t{e}!"),
        }

        Some(info)
    }

    /// Reuses a valid cached credential for the signed-in user, or redeems
    /// the home refresh token against `tenant_id`.
    async fn acquire_for_tenant(
        &self,
        endpoints: &Endpoints,
        home: &Credential,
        tenant_id: &str,
        cache: &mut TokenCache,
    ) -> Result<Credential, EngineError> {
        let key = CacheKey::new(
            tenant_id,
            home.user_id.as_str(),
            self.config.client_id.as_str(),
            self.config.resource.as_str(),
        );
        if let Some(blob) = cache.get(&key) {
            if let Ok(cached) = Credential::from_blob(blob) {
                if cached.is_valid() {
                    return Ok(cached);
                }
            }
        }

        let refresh_token = home.refresh_token.clone().ok_or_else(|| {
            EngineError::AcquisitionFailed(
                "sign-in did not return a refresh token for other tenants".to_string(),
            )
        })?;

        let credential = self
            .worker
            .submit(Acquisition::Silent(SilentRequest {
                request: self.acquire_request(endpoints, tenant_id),
                user_id: home.user_id.clone(),
                refresh_token,
            }))
            .await?;

        let stored_key = self.cache_key(&credential);
        cache.insert(stored_key, credential.to_blob()?);
        Ok(credential)
    }

    /// Client credentials sign-in for a service principal.
    ///
    /// The credential becomes the recent credential; the token cache is left
    /// untouched.
    pub async fn acquire_by_service_principal(
        &self,
        tenant_id: &str,
        app_id: &str,
        app_key: &str,
        ring: DeploymentRing,
    ) -> Result<Credential, EngineError> {
        self.set_ring(ring).await;

        let credential = self
            .worker
            .submit(Acquisition::ClientSecret(ClientSecretRequest {
                login_endpoint: ring.login_url().to_string(),
                tenant_id: tenant_id.to_string(),
                app_id: app_id.to_string(),
                app_key: app_key.to_string(),
                resource: self.config.resource.clone(),
            }))
            .await?;

        self.recent.save_ring(ring)?;
        self.recent.save_credential(&credential)?;
        Ok(credential)
    }

    /// Deletes every file in the cache directory and forgets the in-memory cache.
    pub async fn clear_cache(&self) -> Result<Vec<PathBuf>, EngineError> {
        let mut slot = self.token_cache.lock().await;
        let removed = self.token_store.clear()?;
        *slot = None;
        Ok(removed)
    }

    /// Whether anyone has signed in, i.e. the token cache is non-empty.
    ///
    /// Individual expiry is not checked. An unreadable cache counts as empty.
    pub async fn is_cache_valid(&self) -> Result<bool, EngineError> {
        match self.token_cache().await {
            Ok(cache) => Ok(!cache.is_empty()),
            Err(EngineError::CorruptCache { path, reason }) => {
                log::warn!("Token cache {path} is unreadable: {reason}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Every cached user/tenant pair with the tenant's directory entry.
    ///
    /// Infrastructure tenants are left out. Tenants missing from the
    /// directory are reported with unknown names and no subscriptions.
    /// Entries whose credential cannot be decoded are skipped with a warning.
    pub async fn dump_cache(&self) -> Result<Vec<CacheSummary>, EngineError> {
        let directory = self.tenant_store.load()?;
        let cache = self.token_cache().await?;

        let mut summaries = Vec::new();
        for (key, blob) in cache.iter() {
            let credential = match Credential::from_blob(blob) {
                Ok(credential) => credential,
                Err(e) => {
                    log::warn!(
                        "Skipping unreadable cache entry for {} in tenant {}: {e}",
                        key.user_id, key.tenant_id
                    );
                    continue;
                }
            };
            if is_infrastructure_tenant(&credential.tenant_id) {
                continue;
            }

            let info = directory
                .get(&credential.tenant_id)
                .cloned()
                .unwrap_or_else(|| TenantInfo::placeholder(credential.tenant_id.as_str()));

            summaries.push(CacheSummary {
                user_id: credential.user_id,
                tenant_id: credential.tenant_id,
                display_name: info.display_name,
                domain: info.domain,
                subscriptions: info.subscriptions,
            });
        }

        Ok(summaries)
    }

    /// Resolves a tenant id (or a subscription id) to its cached credential.
    ///
    /// # Errors
    ///
    /// - [`EngineError::TenantNotFound`] when `id` matches no cached tenant
    ///   or subscription, or the tenant has no cached credential
    /// - [`EngineError::AmbiguousUser`] when several users are signed into
    ///   the tenant
    /// - [`EngineError::AcquisitionFailed`] when an expired credential
    ///   cannot be refreshed
    pub async fn get_by_tenant(&self, id: &str) -> Result<Credential, EngineError> {
        let directory = self.tenant_store.load()?;
        let tenant_id = directory
            .resolve_tenant_id(id)
            .ok_or_else(|| EngineError::TenantNotFound { id: id.to_string() })?
            .to_string();

        self.resolve_credential(&tenant_id).await
    }

    /// Resolves a subscription id through its owning tenant.
    ///
    /// When no cached tenant lists the subscription the most recently used
    /// credential is returned instead.
    pub async fn get_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Credential, EngineError> {
        let directory = self.tenant_store.load()?;
        let owner = directory
            .find_by_subscription(subscription_id)
            .map(|tenant| tenant.tenant_id.clone());

        match owner {
            Some(tenant_id) => self.resolve_credential(&tenant_id).await,
            None => {
                log::info!(
                    "Cannot find subscription {subscription_id} in cache! Use recent token instead."
                );
                self.get_recent_token().await
            }
        }
    }

    /// The most recently used credential, silently refreshed when it has
    /// expired and carries a refresh token.
    pub async fn get_recent_token(&self) -> Result<Credential, EngineError> {
        let recent = self
            .recent
            .load_credential()?
            .ok_or(EngineError::NoRecentCredential)?;

        if recent.is_valid() {
            return Ok(recent);
        }
        if !recent.has_refresh_token() {
            log::warn!(
                "Recent credential for tenant {} has expired and cannot be refreshed",
                recent.tenant_id
            );
            return Ok(recent);
        }

        let mut cache = self.token_cache().await?;
        let key = self.cache_key(&recent);
        let refreshed = self.refresh(&recent).await?;

        cache.insert(key, refreshed.to_blob()?);
        self.token_store.save(&cache)?;
        self.recent.save_credential(&refreshed)?;
        Ok(refreshed)
    }

    async fn resolve_credential(&self, tenant_id: &str) -> Result<Credential, EngineError> {
        let mut cache = self.token_cache().await?;
        let mut matches = cache.credentials_for_tenant(tenant_id)?;

        let users: BTreeSet<&str> = matches
            .iter()
            .map(|(_, credential)| credential.user_id.as_str())
            .collect();
        if users.len() > 1 {
            for user in &users {
                log::info!("{user}");
            }
            return Err(EngineError::AmbiguousUser {
                tenant_id: tenant_id.to_string(),
                users: users.into_iter().map(str::to_string).collect(),
            });
        }

        let Some((key, credential)) = matches.pop() else {
            return Err(EngineError::TenantNotFound {
                id: tenant_id.to_string(),
            });
        };

        let credential = if credential.is_valid() {
            credential
        } else {
            let refreshed = self.refresh(&credential).await?;
            cache.insert(key, refreshed.to_blob()?);
            self.token_store.save(&cache)?;
            refreshed
        };

        self.recent.save_credential(&credential)?;
        Ok(credential)
    }

    /// Silent refresh of an expired credential on the acquisition worker.
    ///
    /// The result is guaranteed to be valid; the caller decides where to
    /// store it.
    async fn refresh(&self, expired: &Credential) -> Result<Credential, EngineError> {
        let refresh_token = expired
            .refresh_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                EngineError::AcquisitionFailed(format!(
                    "credential for tenant {} has expired and has no refresh token",
                    expired.tenant_id
                ))
            })?;

        let ring = self.current_ring().await?;
        log::debug!(
            "Refreshing credential for {} in tenant {}",
            expired.user_id,
            expired.tenant_id
        );

        let refreshed = self
            .worker
            .submit(Acquisition::Silent(SilentRequest {
                request: self.acquire_request(&ring.endpoints(), &expired.tenant_id),
                user_id: expired.user_id.clone(),
                refresh_token,
            }))
            .await?;

        if !refreshed.is_valid() {
            return Err(EngineError::AcquisitionFailed(format!(
                "identity provider returned an expired credential for tenant {}",
                expired.tenant_id
            )));
        }

        Ok(refreshed)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
