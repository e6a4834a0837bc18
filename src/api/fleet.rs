//! Fleet API client: agent policies, package policies and enrollment tokens.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::HttpClient;
use crate::config::ServiceSettings;
use crate::error::ProviderError;

/// An agent policy as carried by `/api/fleet/agent_policies`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Subset of `["logs", "metrics"]`.
    #[serde(default)]
    pub monitoring_enabled: Vec<String>,
}

/// Package reference inside a package policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

/// An integration (package) policy as carried by
/// `/api/fleet/package_policies`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackagePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub policy_id: String,
    pub package: PackageRef,
    #[serde(default)]
    pub inputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<Value>,
}

/// One enrollment API key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrollmentToken {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub api_key: String,
    pub api_key_id: String,
    #[serde(default)]
    pub policy_id: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Deserialize)]
struct ItemEnvelope<T> {
    item: T,
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    items: Vec<T>,
}

/// Client for the Fleet REST API (hosted by Kibana).
#[derive(Debug, Clone)]
pub struct FleetClient {
    http: HttpClient,
}

impl FleetClient {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpClient::kibana(settings)?,
        })
    }

    pub async fn create_agent_policy(
        &self,
        policy: &AgentPolicy,
    ) -> Result<AgentPolicy, ProviderError> {
        let response = self
            .http
            .post_json("/api/fleet/agent_policies", &serde_json::to_value(policy)?)
            .await?;
        let envelope: ItemEnvelope<AgentPolicy> = serde_json::from_value(response)?;
        Ok(envelope.item)
    }

    pub async fn get_agent_policy(&self, id: &str) -> Result<Option<AgentPolicy>, ProviderError> {
        let response = self
            .http
            .get_json(&format!("/api/fleet/agent_policies/{id}"))
            .await?;
        response
            .map(|body| {
                let envelope: ItemEnvelope<AgentPolicy> = serde_json::from_value(body)?;
                Ok(envelope.item)
            })
            .transpose()
    }

    pub async fn update_agent_policy(
        &self,
        id: &str,
        policy: &AgentPolicy,
    ) -> Result<AgentPolicy, ProviderError> {
        let response = self
            .http
            .put_json(
                &format!("/api/fleet/agent_policies/{id}"),
                &serde_json::to_value(policy)?,
            )
            .await?;
        let envelope: ItemEnvelope<AgentPolicy> = serde_json::from_value(response)?;
        Ok(envelope.item)
    }

    /// Agent policy deletion goes through a dedicated POST endpoint. An
    /// already-deleted policy is reported as 404 and treated as success.
    pub async fn delete_agent_policy(&self, id: &str) -> Result<(), ProviderError> {
        let body = json!({ "agentPolicyId": id });
        match self
            .http
            .post_json("/api/fleet/agent_policies/delete", &body)
            .await
        {
            Ok(_) => Ok(()),
            Err(ProviderError::UnexpectedStatus { status: 404, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn create_package_policy(
        &self,
        policy: &PackagePolicy,
    ) -> Result<PackagePolicy, ProviderError> {
        let response = self
            .http
            .post_json(
                "/api/fleet/package_policies",
                &serde_json::to_value(policy)?,
            )
            .await?;
        let envelope: ItemEnvelope<PackagePolicy> = serde_json::from_value(response)?;
        Ok(envelope.item)
    }

    pub async fn get_package_policy(
        &self,
        id: &str,
    ) -> Result<Option<PackagePolicy>, ProviderError> {
        let response = self
            .http
            .get_json(&format!("/api/fleet/package_policies/{id}"))
            .await?;
        response
            .map(|body| {
                let envelope: ItemEnvelope<PackagePolicy> = serde_json::from_value(body)?;
                Ok(envelope.item)
            })
            .transpose()
    }

    pub async fn update_package_policy(
        &self,
        id: &str,
        policy: &PackagePolicy,
    ) -> Result<PackagePolicy, ProviderError> {
        let response = self
            .http
            .put_json(
                &format!("/api/fleet/package_policies/{id}"),
                &serde_json::to_value(policy)?,
            )
            .await?;
        let envelope: ItemEnvelope<PackagePolicy> = serde_json::from_value(response)?;
        Ok(envelope.item)
    }

    pub async fn delete_package_policy(&self, id: &str) -> Result<(), ProviderError> {
        self.http
            .delete(&format!("/api/fleet/package_policies/{id}"))
            .await
    }

    /// List enrollment API keys, optionally filtered to one agent policy.
    pub async fn list_enrollment_tokens(
        &self,
        policy_id: Option<&str>,
    ) -> Result<Vec<EnrollmentToken>, ProviderError> {
        let path = match policy_id {
            Some(id) => format!("/api/fleet/enrollment_api_keys?kuery=policy_id:\"{id}\""),
            None => "/api/fleet/enrollment_api_keys".to_string(),
        };
        let response = self
            .http
            .get_json(&path)
            .await?
            .ok_or_else(|| ProviderError::Internal("enrollment token listing returned 404".into()))?;
        let envelope: ListEnvelope<EnrollmentToken> = serde_json::from_value(response)?;
        Ok(envelope.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> FleetClient {
        let settings = ServiceSettings {
            endpoint: Some(server.uri()),
            ..Default::default()
        };
        FleetClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn agent_policy_create_unwraps_the_item_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fleet/agent_policies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item": {
                    "id": "policy-1",
                    "name": "Edge servers",
                    "namespace": "default",
                    "monitoring_enabled": ["logs"]
                }
            })))
            .mount(&server)
            .await;

        let policy = AgentPolicy {
            id: None,
            name: "Edge servers".to_string(),
            namespace: "default".to_string(),
            description: None,
            monitoring_enabled: vec!["logs".to_string()],
        };
        let created = client(&server)
            .await
            .create_agent_policy(&policy)
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("policy-1"));
    }

    #[tokio::test]
    async fn agent_policy_delete_ignores_missing_policies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fleet/agent_policies/delete"))
            .and(body_json(json!({"agentPolicyId": "gone"})))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server)
            .await
            .delete_agent_policy("gone")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enrollment_tokens_filter_by_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fleet/enrollment_api_keys"))
            .and(query_param("kuery", "policy_id:\"policy-1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "token-1",
                    "api_key": "secret",
                    "api_key_id": "key-1",
                    "policy_id": "policy-1",
                    "active": true,
                    "created_at": "2024-01-01T00:00:00Z"
                }],
                "total": 1
            })))
            .mount(&server)
            .await;

        let tokens = client(&server)
            .await
            .list_enrollment_tokens(Some("policy-1"))
            .await
            .unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].api_key_id, "key-1");
    }
}
