mod common;

use chrono::Duration;
use common::*;
use engine::auth::{TokenCache, TokenCacheStore};
use engine::directory::{TenantDetails, VerifiedDomain};
use engine::{EngineError, MemoryStorage};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn entries() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["t1", "t2", "t3"]),
            prop::sample::select(vec!["alice", "bob", "carol"]),
        ),
        0..8,
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(t, u)| (t.to_string(), u.to_string()))
            .collect()
    })
}

#[cfg(test)]
mod resolution_property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn test_ambiguous_iff_multiple_users_in_tenant(entries in entries()) {
            let storage = Arc::new(MemoryStorage::new());
            seed_directory(&storage, &[tenant("t1", &[]), tenant("t2", &[]), tenant("t3", &[])]);
            let credentials: Vec<_> = entries
                .iter()
                .map(|(t, u)| credential(t, u, Duration::hours(1), None))
                .collect();
            seed_tokens(&storage, &credentials);

            let users: BTreeSet<&str> = entries
                .iter()
                .filter(|(t, _)| t == "t1")
                .map(|(_, u)| u.as_str())
                .collect();

            let runtime = tokio::runtime::Runtime::new().unwrap();
            let result = runtime.block_on(async {
                let provider = Arc::new(ScriptedProvider::new("home"));
                let discovery = Arc::new(ScriptedDiscovery::default());
                engine_with(&storage, &provider, &discovery).get_by_tenant("t1").await
            });

            match users.len() {
                0 => prop_assert!(
                    matches!(result, Err(EngineError::TenantNotFound { .. })),
                    "expected TenantNotFound"
                ),
                1 => {
                    let credential = result.unwrap();
                    prop_assert_eq!(credential.tenant_id.as_str(), "t1");
                    prop_assert!(users.contains(credential.user_id.as_str()));
                }
                _ => prop_assert!(
                    matches!(result, Err(EngineError::AmbiguousUser { ref users, .. }) if users.len() >= 2),
                    "expected AmbiguousUser"
                ),
            }
        }
    }
}

#[cfg(test)]
mod persistence_property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_saved_entries_survive_reload(
            entries in entries(),
            tokens in prop::collection::vec("[A-Za-z0-9._-]{1,40}", 8)
        ) {
            let storage = Arc::new(MemoryStorage::new());
            let store = TokenCacheStore::new(storage, files());

            let mut cache = TokenCache::new();
            for ((t, u), token) in entries.iter().zip(tokens.iter().cycle()) {
                let mut credential = credential(t, u, Duration::hours(1), Some(token.as_str()));
                credential.access_token = token.clone();
                cache.insert_credential(&credential, "client", "resource").unwrap();
            }

            store.save(&cache).unwrap();
            let loaded = store.load().unwrap();

            prop_assert_eq!(loaded.len(), cache.len());
            for (key, blob) in cache.iter() {
                prop_assert_eq!(loaded.get(key), Some(blob));
            }
        }

        #[test]
        fn test_default_domain_is_first_flagged(flags in prop::collection::vec(any::<bool>(), 0..6)) {
            let details = TenantDetails {
                object_id: "t1".to_string(),
                display_name: "Contoso".to_string(),
                verified_domains: flags
                    .iter()
                    .enumerate()
                    .map(|(i, default)| VerifiedDomain {
                        default: *default,
                        name: format!("domain{i}.com"),
                    })
                    .collect(),
            };

            match flags.iter().position(|flag| *flag) {
                Some(i) => {
                    let expected = format!("domain{i}.com");
                    prop_assert_eq!(details.default_domain().unwrap(), expected.as_str());
                }
                None => prop_assert!(matches!(details.default_domain(), Err(EngineError::DataShape(_)))),
            }
        }
    }
}
