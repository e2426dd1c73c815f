//! Tenant and subscription directory: the cached view plus remote discovery.

pub mod discovery;
pub mod tenant_cache;

pub use discovery::{
    HttpTenantDiscovery, INFRASTRUCTURE_TENANT_IDS, TenantDetails, TenantDiscovery,
    VerifiedDomain, extract_error_message, infrastructure_tenant_details,
    is_infrastructure_tenant,
};
pub use tenant_cache::{SubscriptionInfo, TenantCacheStore, TenantDirectory, TenantInfo, UNKNOWN};
