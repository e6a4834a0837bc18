//! The `elasticstack_kibana_alerting_rule` resource.
//!
//! Rule parameters are a JSON-normalized string attribute; the configured
//! string is kept verbatim in state whenever it is semantically equal to what
//! the API reports. Enable state is not part of the update body; it flips
//! through the dedicated `_enable`/`_disable` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::kibana::{CreateRuleRequest, Rule, RuleSchedule, UpdateRuleRequest};
use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::ResourceHandler;
use crate::schema::{Attribute, Schema};
use crate::util::{from_struct, normalized_eq, to_struct};

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct RuleState {
    #[serde(default)]
    id: Option<String>,
    rule_id: String,
    name: String,
    consumer: String,
    rule_type_id: String,
    interval: String,
    /// JSON-normalized rule parameters.
    #[serde(default)]
    params: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

impl RuleState {
    fn params_value(&self) -> Result<Value, ProviderError> {
        match &self.params {
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                ProviderError::Validation(format!("params is not valid JSON: {e}"))
            }),
            None => Ok(json!({})),
        }
    }

    fn absorb(&mut self, rule: Rule) -> Result<(), ProviderError> {
        self.id = Some(rule.id);
        self.name = rule.name;
        self.consumer = rule.consumer;
        self.rule_type_id = rule.rule_type_id;
        self.interval = rule.schedule.interval;
        self.enabled = rule.enabled;

        let observed = serde_json::to_string(&rule.params)?;
        let keep_configured = self
            .params
            .as_deref()
            .is_some_and(|configured| normalized_eq(configured, &observed));
        if !keep_configured {
            self.params = Some(observed);
        }
        Ok(())
    }
}

pub struct AlertingRuleResource;

#[async_trait::async_trait]
impl ResourceHandler for AlertingRuleResource {
    fn type_name(&self) -> &'static str {
        "elasticstack_kibana_alerting_rule"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "rule_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Identifier of the rule; cannot be changed once created."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "consumer",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Application scope that owns the rule."),
            )
            .with_attribute(
                "rule_type_id",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute(
                "interval",
                Attribute::required_string()
                    .with_description("Check interval, e.g. `1m`."),
            )
            .with_attribute(
                "params",
                Attribute::optional_string()
                    .with_description("Rule parameters as a JSON document."),
            )
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError> {
        let mut model: RuleState = to_struct(planned)?;
        let request = CreateRuleRequest {
            name: model.name.clone(),
            consumer: model.consumer.clone(),
            rule_type_id: model.rule_type_id.clone(),
            schedule: RuleSchedule {
                interval: model.interval.clone(),
            },
            params: model.params_value()?,
            enabled: model.enabled,
        };
        let rule = clients
            .kibana()?
            .create_rule(&model.rule_id, &request)
            .await?;
        model.absorb(rule)?;
        from_struct(&model)
    }

    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError> {
        let mut model: RuleState = to_struct(state)?;
        let Some(rule) = clients.kibana()?.get_rule(&model.rule_id).await? else {
            return Ok(None);
        };
        model.absorb(rule)?;
        from_struct(&model).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior_model: RuleState = to_struct(prior)?;
        let mut model: RuleState = to_struct(planned)?;
        let kibana = clients.kibana()?;

        let request = UpdateRuleRequest {
            name: model.name.clone(),
            schedule: RuleSchedule {
                interval: model.interval.clone(),
            },
            params: model.params_value()?,
        };
        let rule = kibana.update_rule(&model.rule_id, &request).await?;

        let want_enabled = model.enabled;
        if want_enabled != prior_model.enabled {
            debug!(rule_id = %model.rule_id, enabled = want_enabled, "flipping rule enable state");
            if want_enabled {
                kibana.enable_rule(&model.rule_id).await?;
            } else {
                kibana.disable_rule(&model.rule_id).await?;
            }
        }

        model.absorb(rule)?;
        model.enabled = want_enabled;
        from_struct(&model)
    }

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError> {
        let model: RuleState = to_struct(state)?;
        clients.kibana()?.delete_rule(&model.rule_id).await
    }

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let Some(rule) = clients.kibana()?.get_rule(id).await? else {
            return Ok(None);
        };
        let mut model = RuleState {
            id: None,
            rule_id: id.to_string(),
            name: String::new(),
            consumer: String::new(),
            rule_type_id: String::new(),
            interval: String::new(),
            params: None,
            enabled: true,
        };
        model.absorb(rule)?;
        from_struct(&model).map(Some)
    }
}
