//! Kibana API client: spaces and alerting rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::HttpClient;
use crate::config::ServiceSettings;
use crate::error::ProviderError;

/// A Kibana space as carried by `/api/spaces/space`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Space {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "disabledFeatures")]
    pub disabled_features: Vec<String>,
}

/// The rule schedule. Kibana expresses it as a nested object holding a single
/// interval string such as `"1m"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSchedule {
    pub interval: String,
}

/// Request body for rule creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub consumer: String,
    pub rule_type_id: String,
    pub schedule: RuleSchedule,
    pub params: Value,
    pub enabled: bool,
}

/// Request body for rule update. The consumer, type and enable state are not
/// updatable through this call.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRuleRequest {
    pub name: String,
    pub schedule: RuleSchedule,
    pub params: Value,
}

/// An alerting rule as returned by `/api/alerting/rule/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub consumer: String,
    pub rule_type_id: String,
    pub schedule: RuleSchedule,
    #[serde(default)]
    pub params: Value,
    pub enabled: bool,
}

/// Client for the Kibana REST API.
#[derive(Debug, Clone)]
pub struct KibanaClient {
    http: HttpClient,
}

impl KibanaClient {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpClient::kibana(settings)?,
        })
    }

    pub async fn create_space(&self, space: &Space) -> Result<(), ProviderError> {
        self.http
            .post_json("/api/spaces/space", &serde_json::to_value(space)?)
            .await?;
        Ok(())
    }

    pub async fn get_space(&self, id: &str) -> Result<Option<Space>, ProviderError> {
        let response = self.http.get_json(&format!("/api/spaces/space/{id}")).await?;
        response
            .map(serde_json::from_value)
            .transpose()
            .map_err(ProviderError::from)
    }

    pub async fn update_space(&self, space: &Space) -> Result<(), ProviderError> {
        self.http
            .put_json(
                &format!("/api/spaces/space/{}", space.id),
                &serde_json::to_value(space)?,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_space(&self, id: &str) -> Result<(), ProviderError> {
        self.http.delete(&format!("/api/spaces/space/{id}")).await
    }

    /// Create a rule under a caller-chosen identifier.
    pub async fn create_rule(
        &self,
        rule_id: &str,
        request: &CreateRuleRequest,
    ) -> Result<Rule, ProviderError> {
        let response = self
            .http
            .post_json(
                &format!("/api/alerting/rule/{rule_id}"),
                &serde_json::to_value(request)?,
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_rule(&self, id: &str) -> Result<Option<Rule>, ProviderError> {
        let response = self.http.get_json(&format!("/api/alerting/rule/{id}")).await?;
        response
            .map(serde_json::from_value)
            .transpose()
            .map_err(ProviderError::from)
    }

    pub async fn update_rule(
        &self,
        id: &str,
        request: &UpdateRuleRequest,
    ) -> Result<Rule, ProviderError> {
        let response = self
            .http
            .put_json(
                &format!("/api/alerting/rule/{id}"),
                &serde_json::to_value(request)?,
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn enable_rule(&self, id: &str) -> Result<(), ProviderError> {
        self.http
            .post_empty(&format!("/api/alerting/rule/{id}/_enable"))
            .await
    }

    pub async fn disable_rule(&self, id: &str) -> Result<(), ProviderError> {
        self.http
            .post_empty(&format!("/api/alerting/rule/{id}/_disable"))
            .await
    }

    pub async fn delete_rule(&self, id: &str) -> Result<(), ProviderError> {
        self.http.delete(&format!("/api/alerting/rule/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> KibanaClient {
        let settings = ServiceSettings {
            endpoint: Some(server.uri()),
            ..Default::default()
        };
        KibanaClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn space_requests_carry_the_xsrf_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/spaces/space"))
            .and(header("kbn-xsrf", "true"))
            .and(body_json(json!({
                "id": "team-a",
                "name": "Team A",
                "disabledFeatures": ["ml"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let space = Space {
            id: "team-a".to_string(),
            name: "Team A".to_string(),
            description: None,
            disabled_features: vec!["ml".to_string()],
        };
        client(&server).await.create_space(&space).await.unwrap();
    }

    #[tokio::test]
    async fn missing_space_reads_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/spaces/space/absent"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let space = client(&server).await.get_space("absent").await.unwrap();
        assert!(space.is_none());
    }

    #[tokio::test]
    async fn rule_response_deserializes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/alerting/rule/cpu-high"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cpu-high",
                "name": "CPU high",
                "consumer": "alerts",
                "rule_type_id": ".index-threshold",
                "schedule": {"interval": "1m"},
                "params": {"threshold": [80]},
                "enabled": true,
                "created_by": "elastic"
            })))
            .mount(&server)
            .await;

        let rule = client(&server)
            .await
            .get_rule("cpu-high")
            .await
            .unwrap()
            .expect("rule should exist");
        assert_eq!(rule.schedule.interval, "1m");
        assert!(rule.enabled);
    }

    #[tokio::test]
    async fn enable_posts_to_the_dedicated_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/alerting/rule/cpu-high/_enable"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.enable_rule("cpu-high").await.unwrap();
    }
}
