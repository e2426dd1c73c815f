use chrono::{Duration, Utc};
use claims::*;
use engine::auth::Credential;
use engine::directory::{HttpTenantDiscovery, INFRASTRUCTURE_TENANT_IDS, TenantDiscovery};
use engine::{Endpoints, EngineError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Helper module for discovery testing
mod discovery_helpers {
    use super::*;

    pub fn endpoints(server: &MockServer) -> Endpoints {
        Endpoints {
            login: format!("{}/login", server.uri()),
            directory: format!("{}/graph", server.uri()),
            resource_manager: format!("{}/arm", server.uri()),
        }
    }

    pub fn credential() -> Credential {
        Credential {
            access_token: "test-access-token".to_string(),
            refresh_token: None,
            expires_on: Utc::now() + Duration::hours(1),
            tenant_id: "t1".to_string(),
            user_id: "alice@contoso.com".to_string(),
            token_type: "Bearer".to_string(),
        }
    }
}

use discovery_helpers::*;

mod resource_manager {
    use super::*;

    #[tokio::test]
    async fn test_list_tenant_ids_sends_bearer_and_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/arm/tenants"))
            .and(query_param("api-version", "2014-01-01"))
            .and(header("authorization", "Bearer test-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/tenants/t1", "tenantId": "t1"},
                    {"id": "/tenants/t2", "tenantId": "t2"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let discovery = HttpTenantDiscovery::new();
        let tenants = assert_ok!(
            discovery
                .list_tenant_ids(&endpoints(&server), &credential())
                .await
        );

        assert_eq!(tenants, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_list_tenant_ids_failure_is_remote_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/arm/tenants"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let result = HttpTenantDiscovery::new()
            .list_tenant_ids(&endpoints(&server), &credential())
            .await;

        assert_eq!(
            result,
            Err(EngineError::RemoteApi {
                status: 401,
                message: "Unauthorized".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_list_subscriptions_follows_next_link() {
        let server = MockServer::start().await;
        let next = format!("{}/arm/subscriptions-page-2", server.uri());

        Mock::given(method("GET"))
            .and(path("/arm/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"subscriptionId": "s1", "displayName": "Dev"}],
                "nextLink": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/arm/subscriptions-page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"subscriptionId": "s2", "displayName": "Prod"}]
            })))
            .mount(&server)
            .await;

        let subscriptions = assert_ok!(
            HttpTenantDiscovery::new()
                .list_subscriptions(&endpoints(&server), &credential())
                .await
        );

        let ids: Vec<&str> = subscriptions
            .iter()
            .map(|s| s.subscription_id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(subscriptions[1].display_name, "Prod");
    }

    #[tokio::test]
    async fn test_list_subscriptions_extracts_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/arm/subscriptions"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "AuthorizationFailed", "message": "No access to subscriptions"}
            })))
            .mount(&server)
            .await;

        let result = HttpTenantDiscovery::new()
            .list_subscriptions(&endpoints(&server), &credential())
            .await;

        assert_eq!(
            result,
            Err(EngineError::RemoteApi {
                status: 403,
                message: "No access to subscriptions".to_string()
            })
        );
    }
}

mod directory_service {
    use super::*;

    #[tokio::test]
    async fn test_tenant_details_default_domain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/t1/tenantDetails"))
            .and(query_param("api-version", "1.5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "objectId": "t1",
                    "displayName": "Contoso",
                    "verifiedDomains": [
                        {"default": false, "name": "contoso.onmicrosoft.com"},
                        {"default": true, "name": "contoso.com"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let details = assert_ok!(
            HttpTenantDiscovery::new()
                .get_tenant_details(&endpoints(&server), &credential(), "t1")
                .await
        );

        assert_eq!(details.display_name, "Contoso");
        assert_eq!(assert_ok!(details.default_domain()), "contoso.com");
    }

    #[tokio::test]
    async fn test_tenant_details_odata_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/t1/tenantDetails"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "odata.error": {
                    "code": "Authorization_RequestDenied",
                    "message": {"lang": "en", "value": "Insufficient privileges"}
                }
            })))
            .mount(&server)
            .await;

        let result = HttpTenantDiscovery::new()
            .get_tenant_details(&endpoints(&server), &credential(), "t1")
            .await;

        assert_eq!(
            result,
            Err(EngineError::RemoteApi {
                status: 403,
                message: "Insufficient privileges".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_empty_details_is_data_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/t1/tenantDetails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let result = HttpTenantDiscovery::new()
            .get_tenant_details(&endpoints(&server), &credential(), "t1")
            .await;

        assert_matches!(result, Err(EngineError::DataShape(_)));
    }

    #[tokio::test]
    async fn test_infrastructure_tenant_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let details = assert_ok!(
            HttpTenantDiscovery::new()
                .get_tenant_details(&endpoints(&server), &credential(), INFRASTRUCTURE_TENANT_IDS[1])
                .await
        );

        assert_eq!(details.display_name, "Infrastructure");
    }
}
