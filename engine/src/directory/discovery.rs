use super::tenant_cache::SubscriptionInfo;
use crate::auth::Credential;
use crate::common::EngineError;
use crate::environment::{DIRECTORY_API_VERSION, Endpoints, RESOURCE_MANAGER_API_VERSION};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Tenants that cannot be looked up through the directory service.
pub const INFRASTRUCTURE_TENANT_IDS: [&str; 2] = [
    "ea8a4392-515e-481f-879e-6571ff2a8a36",
    "f8cdef31-a31e-4b4a-93e4-5f571e91255a",
];

pub fn is_infrastructure_tenant(tenant_id: &str) -> bool {
    INFRASTRUCTURE_TENANT_IDS
        .iter()
        .any(|id| id.eq_ignore_ascii_case(tenant_id))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedDomain {
    #[serde(default)]
    pub default: bool,
    pub name: String,
}

/// Tenant record returned by the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDetails {
    pub object_id: String,
    pub display_name: String,
    #[serde(default)]
    pub verified_domains: Vec<VerifiedDomain>,
}

impl TenantDetails {
    /// The first verified domain flagged as default.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DataShape`] when no domain is flagged default.
    pub fn default_domain(&self) -> Result<&str, EngineError> {
        self.verified_domains
            .iter()
            .find(|domain| domain.default)
            .map(|domain| domain.name.as_str())
            .ok_or_else(|| {
                EngineError::DataShape(format!(
                    "tenant {} has no default verified domain",
                    self.object_id
                ))
            })
    }
}

/// Synthesized details for an infrastructure tenant.
pub fn infrastructure_tenant_details(tenant_id: &str) -> TenantDetails {
    TenantDetails {
        object_id: tenant_id.to_string(),
        display_name: "Infrastructure".to_string(),
        verified_domains: vec![VerifiedDomain {
            default: true,
            name: "live.com".to_string(),
        }],
    }
}

/// Pulls the human-readable message out of an error response body.
///
/// Understands the resource manager envelope (`{"error": {"message"}}`) and
/// the directory service envelope (`{"odata.error": {"message": {"value"}}}`);
/// anything else is returned as-is.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(message) = json["error"]["message"].as_str() {
                return message.to_string();
            }
            if let Some(message) = json["odata.error"]["message"]["value"].as_str() {
                return message.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Enumerates what a signed-in user can reach.
///
/// Every call is authorized with the given credential and targets the
/// endpoints of one deployment ring.
#[async_trait]
pub trait TenantDiscovery: Send + Sync {
    async fn list_tenant_ids(
        &self,
        endpoints: &Endpoints,
        credential: &Credential,
    ) -> Result<Vec<String>, EngineError>;

    /// Subscriptions visible to the credential's tenant.
    async fn list_subscriptions(
        &self,
        endpoints: &Endpoints,
        credential: &Credential,
    ) -> Result<Vec<SubscriptionInfo>, EngineError>;

    async fn get_tenant_details(
        &self,
        endpoints: &Endpoints,
        credential: &Credential,
        tenant_id: &str,
    ) -> Result<TenantDetails, EngineError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantIdRecord {
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRecord {
    subscription_id: String,
    #[serde(default)]
    display_name: String,
}

/// [`TenantDiscovery`] over the resource manager and directory REST APIs.
#[derive(Debug, Clone, Default)]
pub struct HttpTenantDiscovery {
    client: reqwest::Client,
}

impl HttpTenantDiscovery {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<T, EngineError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, credential.authorization_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::RemoteApi {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::DataShape(format!("Unexpected response from {url}: {e}")))
    }

    /// Follows `nextLink` until every page of a list has been read.
    async fn get_all<T: DeserializeOwned>(
        &self,
        first_url: String,
        credential: &Credential,
    ) -> Result<Vec<T>, EngineError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: ListResponse<T> = self.get_json(&url, credential).await?;
            items.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(items)
    }
}

#[async_trait]
impl TenantDiscovery for HttpTenantDiscovery {
    async fn list_tenant_ids(
        &self,
        endpoints: &Endpoints,
        credential: &Credential,
    ) -> Result<Vec<String>, EngineError> {
        let url = format!(
            "{}/tenants?api-version={}",
            endpoints.resource_manager.trim_end_matches('/'),
            RESOURCE_MANAGER_API_VERSION
        );

        let tenants: Vec<TenantIdRecord> = self.get_all(url, credential).await?;
        Ok(tenants.into_iter().map(|tenant| tenant.tenant_id).collect())
    }

    async fn list_subscriptions(
        &self,
        endpoints: &Endpoints,
        credential: &Credential,
    ) -> Result<Vec<SubscriptionInfo>, EngineError> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            endpoints.resource_manager.trim_end_matches('/'),
            RESOURCE_MANAGER_API_VERSION
        );

        let subscriptions: Vec<SubscriptionRecord> = self.get_all(url, credential).await?;
        Ok(subscriptions
            .into_iter()
            .map(|record| SubscriptionInfo {
                subscription_id: record.subscription_id,
                display_name: record.display_name,
            })
            .collect())
    }

    async fn get_tenant_details(
        &self,
        endpoints: &Endpoints,
        credential: &Credential,
        tenant_id: &str,
    ) -> Result<TenantDetails, EngineError> {
        if is_infrastructure_tenant(tenant_id) {
            return Ok(infrastructure_tenant_details(tenant_id));
        }

        let url = format!(
            "{}/{}/tenantDetails?api-version={}",
            endpoints.directory.trim_end_matches('/'),
            urlencoding::encode(tenant_id),
            DIRECTORY_API_VERSION
        );

        let response: ListResponse<TenantDetails> = self.get_json(&url, credential).await?;
        response.value.into_iter().next().ok_or_else(|| {
            EngineError::DataShape(format!("directory returned no details for tenant {tenant_id}"))
        })
    }
}
