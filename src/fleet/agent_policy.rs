//! The `elasticstack_fleet_agent_policy` resource.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::fleet::AgentPolicy;
use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::ResourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::util::{from_struct, to_struct};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
struct AgentPolicyState {
    #[serde(default)]
    policy_id: Option<String>,
    name: String,
    namespace: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    monitor_logs: bool,
    #[serde(default)]
    monitor_metrics: bool,
}

impl AgentPolicyState {
    fn to_api(&self, include_id: bool) -> AgentPolicy {
        let mut monitoring_enabled = Vec::new();
        if self.monitor_logs {
            monitoring_enabled.push("logs".to_string());
        }
        if self.monitor_metrics {
            monitoring_enabled.push("metrics".to_string());
        }
        AgentPolicy {
            id: if include_id { self.policy_id.clone() } else { None },
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            description: self.description.clone(),
            monitoring_enabled,
        }
    }

    fn from_api(policy: AgentPolicy) -> Self {
        Self {
            policy_id: policy.id,
            name: policy.name,
            namespace: policy.namespace,
            description: policy.description,
            monitor_logs: policy.monitoring_enabled.iter().any(|m| m == "logs"),
            monitor_metrics: policy.monitoring_enabled.iter().any(|m| m == "metrics"),
        }
    }

    fn require_id(&self) -> Result<&str, ProviderError> {
        self.policy_id.as_deref().ok_or_else(|| {
            ProviderError::Internal("agent policy state has no policy_id".to_string())
        })
    }
}

pub struct AgentPolicyResource;

#[async_trait::async_trait]
impl ResourceHandler for AgentPolicyResource {
    fn type_name(&self) -> &'static str {
        "elasticstack_fleet_agent_policy"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "policy_id",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_description("Identifier of the policy; assigned by Fleet when omitted."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "namespace",
                Attribute::required_string()
                    .with_description("Default data-stream namespace for the policy."),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("monitor_logs", Attribute::optional_bool())
            .with_attribute("monitor_metrics", Attribute::optional_bool())
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError> {
        let model: AgentPolicyState = to_struct(planned)?;
        let created = clients
            .fleet()?
            .create_agent_policy(&model.to_api(true))
            .await?;
        from_struct(&AgentPolicyState::from_api(created))
    }

    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: AgentPolicyState = to_struct(state)?;
        let Some(policy) = clients
            .fleet()?
            .get_agent_policy(model.require_id()?)
            .await?
        else {
            return Ok(None);
        };
        from_struct(&AgentPolicyState::from_api(policy)).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let model: AgentPolicyState = to_struct(planned)?;
        // The update body must not repeat the id; it travels in the path.
        let updated = clients
            .fleet()?
            .update_agent_policy(model.require_id()?, &model.to_api(false))
            .await?;
        from_struct(&AgentPolicyState::from_api(updated))
    }

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError> {
        let model: AgentPolicyState = to_struct(state)?;
        clients
            .fleet()?
            .delete_agent_policy(model.require_id()?)
            .await
    }

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let Some(policy) = clients.fleet()?.get_agent_policy(id).await? else {
            return Ok(None);
        };
        from_struct(&AgentPolicyState::from_api(policy)).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitoring_bools_map_to_the_enabled_list() {
        let model = AgentPolicyState {
            policy_id: Some("p-1".to_string()),
            name: "Edge".to_string(),
            namespace: "default".to_string(),
            description: None,
            monitor_logs: true,
            monitor_metrics: false,
        };
        let api = model.to_api(true);
        assert_eq!(api.monitoring_enabled, vec!["logs"]);
        assert_eq!(api.id.as_deref(), Some("p-1"));

        let round_tripped = AgentPolicyState::from_api(api);
        assert!(round_tripped.monitor_logs);
        assert!(!round_tripped.monitor_metrics);
    }

    #[test]
    fn update_body_omits_the_id() {
        let model = AgentPolicyState {
            policy_id: Some("p-1".to_string()),
            name: "Edge".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        assert!(model.to_api(false).id.is_none());
    }

    #[test]
    fn state_without_policy_id_cannot_be_read() {
        let model = AgentPolicyState {
            name: "Edge".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        assert!(model.require_id().is_err());
    }
}
