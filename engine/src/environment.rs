use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// API version used against the resource manager (tenant and subscription listing).
pub const RESOURCE_MANAGER_API_VERSION: &str = "2014-01-01";
/// API version used against the directory service (tenant details).
pub const DIRECTORY_API_VERSION: &str = "1.5";

/// Deployment ring the tool is pointed at.
///
/// Each ring selects a fixed triple of endpoints: the identity provider
/// login endpoint, the directory service and the resource manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeploymentRing {
    Ring0,
    Ring1,
    Ring2,
    #[default]
    Production,
}

/// Base URLs for one deployment ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub directory: String,
    pub resource_manager: String,
}

impl DeploymentRing {
    pub const ALL: [DeploymentRing; 4] = [
        DeploymentRing::Ring0,
        DeploymentRing::Ring1,
        DeploymentRing::Ring2,
        DeploymentRing::Production,
    ];

    pub fn login_url(self) -> &'static str {
        match self {
            DeploymentRing::Ring0 | DeploymentRing::Ring1 | DeploymentRing::Ring2 => {
                "https://login.windows-ppe.net"
            }
            DeploymentRing::Production => "https://login.windows.net",
        }
    }

    pub fn directory_url(self) -> &'static str {
        match self {
            DeploymentRing::Ring0 | DeploymentRing::Ring1 | DeploymentRing::Ring2 => {
                "https://graph.ppe.windows.net"
            }
            DeploymentRing::Production => "https://graph.windows.net",
        }
    }

    pub fn resource_manager_url(self) -> &'static str {
        match self {
            DeploymentRing::Ring0 => "https://api-next.resources.windows-int.net",
            DeploymentRing::Ring1 => "https://api-current.resources.windows-int.net",
            DeploymentRing::Ring2 => "https://api-dogfood.resources.windows-int.net",
            DeploymentRing::Production => "https://management.azure.com",
        }
    }

    pub fn endpoints(self) -> Endpoints {
        Endpoints {
            login: self.login_url().to_string(),
            directory: self.directory_url().to_string(),
            resource_manager: self.resource_manager_url().to_string(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentRing::Ring0 => "Ring0",
            DeploymentRing::Ring1 => "Ring1",
            DeploymentRing::Ring2 => "Ring2",
            DeploymentRing::Production => "Production",
        }
    }
}

impl fmt::Display for DeploymentRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown deployment ring '{0}'. Expected one of Ring0, Ring1, Ring2, Production")]
pub struct ParseRingError(pub String);

impl FromStr for DeploymentRing {
    type Err = ParseRingError;

    /// Accepts ring names as well as the legacy environment names
    /// (`Next`, `Current`, `Dogfood`, `Prod`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ring0" | "next" => Ok(DeploymentRing::Ring0),
            "ring1" | "current" => Ok(DeploymentRing::Ring1),
            "ring2" | "dogfood" => Ok(DeploymentRing::Ring2),
            "production" | "prod" => Ok(DeploymentRing::Production),
            _ => Err(ParseRingError(s.trim().to_string())),
        }
    }
}

impl TryFrom<String> for DeploymentRing {
    type Error = ParseRingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeploymentRing> for String {
    fn from(ring: DeploymentRing) -> Self {
        ring.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_endpoints() {
        let endpoints = DeploymentRing::Production.endpoints();
        assert_eq!(endpoints.login, "https://login.windows.net");
        assert_eq!(endpoints.directory, "https://graph.windows.net");
        assert_eq!(endpoints.resource_manager, "https://management.azure.com");
    }

    #[test]
    fn test_pre_production_rings_share_login_but_not_resource_manager() {
        let rings = [
            DeploymentRing::Ring0,
            DeploymentRing::Ring1,
            DeploymentRing::Ring2,
        ];
        for ring in rings {
            assert_eq!(ring.login_url(), "https://login.windows-ppe.net");
        }
        assert_ne!(
            DeploymentRing::Ring0.resource_manager_url(),
            DeploymentRing::Ring2.resource_manager_url()
        );
    }

    #[test]
    fn test_display_parses_back() {
        for ring in DeploymentRing::ALL {
            assert_eq!(ring.to_string().parse::<DeploymentRing>(), Ok(ring));
        }
    }

    #[test]
    fn test_legacy_aliases() {
        assert_eq!("dogfood".parse(), Ok(DeploymentRing::Ring2));
        assert_eq!(" Prod\n".parse(), Ok(DeploymentRing::Production));
        assert!("staging".parse::<DeploymentRing>().is_err());
    }

    #[test]
    fn test_serde_uses_ring_names() {
        let json = serde_json::to_string(&DeploymentRing::Ring1).unwrap();
        assert_eq!(json, "\"Ring1\"");
        let ring: DeploymentRing = serde_json::from_str("\"current\"").unwrap();
        assert_eq!(ring, DeploymentRing::Ring1);
    }
}
