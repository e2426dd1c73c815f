use super::credential::Credential;
use crate::common::EngineError;
use crate::storage::{CacheFiles, ProtectedStorage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Slot identifying one cached credential.
///
/// Client id and resource are process-wide constants, so in practice the
/// key is unique per (tenant, user).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub tenant_id: String,
    pub user_id: String,
    pub client_id: String,
    pub resource: String,
}

impl CacheKey {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        client_id: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            client_id: client_id.into(),
            resource: resource.into(),
        }
    }

    pub fn for_credential(credential: &Credential, client_id: &str, resource: &str) -> Self {
        Self::new(
            credential.tenant_id.as_str(),
            credential.user_id.as_str(),
            client_id,
            resource,
        )
    }
}

/// In-memory token cache: at most one serialized credential per [`CacheKey`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenCache {
    entries: BTreeMap<CacheKey, String>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    key: CacheKey,
    blob: String,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Stores `blob` under `key`, returning the blob it replaced.
    pub fn insert(&mut self, key: CacheKey, blob: String) -> Option<String> {
        self.entries.insert(key, blob)
    }

    /// Serializes and stores a credential, overwriting any previous one for the same slot.
    pub fn insert_credential(
        &mut self,
        credential: &Credential,
        client_id: &str,
        resource: &str,
    ) -> Result<CacheKey, EngineError> {
        let key = CacheKey::for_credential(credential, client_id, resource);
        self.entries.insert(key.clone(), credential.to_blob()?);
        Ok(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &str)> {
        self.entries.iter().map(|(key, blob)| (key, blob.as_str()))
    }

    /// Deserializes every cached credential.
    pub fn credentials(&self) -> Result<Vec<Credential>, EngineError> {
        self.entries
            .values()
            .map(|blob| Credential::from_blob(blob))
            .collect()
    }

    /// All credentials cached for `tenant_id`, one per signed-in user.
    pub fn credentials_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<(CacheKey, Credential)>, EngineError> {
        self.entries
            .iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .map(|(key, blob)| Ok((key.clone(), Credential::from_blob(blob)?)))
            .collect()
    }

    fn to_json(&self) -> Result<String, EngineError> {
        let entries: Vec<PersistedEntry> = self
            .entries
            .iter()
            .map(|(key, blob)| PersistedEntry {
                key: key.clone(),
                blob: blob.clone(),
            })
            .collect();
        serde_json::to_string(&entries)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize token cache: {e}")))
    }

    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<PersistedEntry> = serde_json::from_str(json)?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.key, entry.blob))
                .collect(),
        })
    }
}

/// Persistence of the [`TokenCache`] as a single protected file.
#[derive(Clone)]
pub struct TokenCacheStore {
    storage: Arc<dyn ProtectedStorage>,
    files: CacheFiles,
}

impl TokenCacheStore {
    pub fn new(storage: Arc<dyn ProtectedStorage>, files: CacheFiles) -> Self {
        Self { storage, files }
    }

    pub fn path(&self) -> PathBuf {
        self.files.token_cache()
    }

    /// Loads the cache; a missing file yields an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CorruptCache`] when the file cannot be decrypted
    /// or parsed.
    pub fn load(&self) -> Result<TokenCache, EngineError> {
        let path = self.path();
        match self.storage.read_text(&path)? {
            None => Ok(TokenCache::new()),
            Some(json) => TokenCache::from_json(&json).map_err(|e| EngineError::corrupt(&path, e)),
        }
    }

    /// Rewrites the whole file with `cache`.
    pub fn save(&self, cache: &TokenCache) -> Result<(), EngineError> {
        self.storage.write_text(&self.path(), &cache.to_json()?)
    }

    /// `true` when a non-empty cache is on disk, i.e. someone has signed in.
    pub fn is_valid(&self) -> Result<bool, EngineError> {
        Ok(!self.load()?.is_empty())
    }

    /// Deletes every file in the cache directory (token, tenant and recent-state files).
    pub fn clear(&self) -> Result<Vec<PathBuf>, EngineError> {
        self.storage.clear(self.files.dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::{Duration, Utc};
    use claims::*;

    fn credential(tenant: &str, user: &str) -> Credential {
        Credential {
            access_token: format!("access-{tenant}-{user}"),
            refresh_token: Some("refresh".to_string()),
            expires_on: Utc::now() + Duration::hours(1),
            tenant_id: tenant.to_string(),
            user_id: user.to_string(),
            token_type: "Bearer".to_string(),
        }
    }

    fn store() -> (Arc<MemoryStorage>, TokenCacheStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenCacheStore::new(storage.clone(), CacheFiles::new("/home/test/.csm"));
        (storage, store)
    }

    #[test]
    fn test_later_insert_overwrites_same_key() {
        let mut cache = TokenCache::new();
        let first = credential("t1", "alice");
        let mut second = credential("t1", "alice");
        second.access_token = "newer".to_string();

        let key = assert_ok!(cache.insert_credential(&first, "client", "resource"));
        assert_ok!(cache.insert_credential(&second, "client", "resource"));

        assert_eq!(cache.len(), 1);
        let stored = Credential::from_blob(assert_some!(cache.get(&key))).unwrap();
        assert_eq!(stored.access_token, "newer");
    }

    #[test]
    fn test_credentials_for_tenant_filters_by_tenant() {
        let mut cache = TokenCache::new();
        for (tenant, user) in [("t1", "alice"), ("t1", "bob"), ("t2", "alice")] {
            assert_ok!(cache.insert_credential(&credential(tenant, user), "c", "r"));
        }

        let matches = assert_ok!(cache.credentials_for_tenant("t1"));
        let users: Vec<&str> = matches.iter().map(|(_, c)| c.user_id.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob"]);
        assert!(assert_ok!(cache.credentials_for_tenant("t3")).is_empty());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let (_, store) = store();
        assert!(assert_ok!(store.load()).is_empty());
        assert!(!assert_ok!(store.is_valid()));
    }

    #[test]
    fn test_save_then_load_preserves_entries() {
        let (_, store) = store();
        let mut cache = TokenCache::new();
        let key = assert_ok!(cache.insert_credential(&credential("t1", "alice"), "c", "r"));

        assert_ok!(store.save(&cache));
        let loaded = assert_ok!(store.load());

        assert_eq!(loaded.get(&key), cache.get(&key));
        assert!(assert_ok!(store.is_valid()));
    }

    #[test]
    fn test_unparseable_file_is_corrupt() {
        let (storage, store) = store();
        assert_ok!(storage.write_text(&store.path(), "{not json"));
        assert_matches!(store.load(), Err(EngineError::CorruptCache { .. }));

        storage.corrupt(&store.path());
        assert_matches!(store.load(), Err(EngineError::CorruptCache { .. }));
    }

    #[test]
    fn test_clear_invalidates_cache() {
        let (_, store) = store();
        let mut cache = TokenCache::new();
        assert_ok!(cache.insert_credential(&credential("t1", "alice"), "c", "r"));
        assert_ok!(store.save(&cache));

        assert_ok!(store.clear());
        assert!(!assert_ok!(store.is_valid()));
    }
}
