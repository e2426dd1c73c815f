use crate::common::EngineError;
use crate::storage::{CacheFiles, ProtectedStorage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Placeholder used for tenant names and domains that could not be fetched.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub subscription_id: String,
    pub display_name: String,
}

/// Directory entry for one tenant the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    pub tenant_id: String,
    pub display_name: String,
    pub domain: String,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionInfo>,
}

impl TenantInfo {
    /// Entry with unknown name and domain and no subscriptions.
    pub fn placeholder(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            display_name: UNKNOWN.to_string(),
            domain: UNKNOWN.to_string(),
            subscriptions: Vec::new(),
        }
    }

    pub fn owns_subscription(&self, subscription_id: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|subscription| subscription.subscription_id == subscription_id)
    }
}

/// Tenant id → [`TenantInfo`] mapping.
///
/// Iteration (and therefore "first match" when a subscription id is listed
/// under more than one tenant) follows ascending tenant id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantDirectory {
    tenants: BTreeMap<String, TenantInfo>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    pub fn get(&self, tenant_id: &str) -> Option<&TenantInfo> {
        self.tenants.get(tenant_id)
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.tenants.contains_key(tenant_id)
    }

    /// Stores `info` under its tenant id, replacing any previous entry.
    pub fn insert(&mut self, info: TenantInfo) -> Option<TenantInfo> {
        self.tenants.insert(info.tenant_id.clone(), info)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TenantInfo> {
        self.tenants.values()
    }

    /// First tenant listing `subscription_id`.
    pub fn find_by_subscription(&self, subscription_id: &str) -> Option<&TenantInfo> {
        self.tenants
            .values()
            .find(|tenant| tenant.owns_subscription(subscription_id))
    }

    /// Interprets `id` as a tenant id, or else as a subscription id, and
    /// returns the tenant id it designates.
    pub fn resolve_tenant_id(&self, id: &str) -> Option<&str> {
        if let Some((tenant_id, _)) = self.tenants.get_key_value(id) {
            return Some(tenant_id.as_str());
        }

        self.find_by_subscription(id)
            .map(|tenant| tenant.tenant_id.as_str())
    }
}

/// Persistence of the [`TenantDirectory`] as a single protected file.
#[derive(Clone)]
pub struct TenantCacheStore {
    storage: Arc<dyn ProtectedStorage>,
    files: CacheFiles,
}

impl TenantCacheStore {
    pub fn new(storage: Arc<dyn ProtectedStorage>, files: CacheFiles) -> Self {
        Self { storage, files }
    }

    pub fn path(&self) -> PathBuf {
        self.files.tenant_cache()
    }

    /// Loads the directory; a missing file yields an empty directory.
    pub fn load(&self) -> Result<TenantDirectory, EngineError> {
        let path = self.path();
        match self.storage.read_text(&path)? {
            None => Ok(TenantDirectory::new()),
            Some(json) => serde_json::from_str(&json).map_err(|e| EngineError::corrupt(&path, e)),
        }
    }

    pub fn save(&self, directory: &TenantDirectory) -> Result<(), EngineError> {
        let json = serde_json::to_string(directory)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize tenant cache: {e}")))?;
        self.storage.write_text(&self.path(), &json)
    }
}
