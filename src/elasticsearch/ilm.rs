//! The `elasticstack_elasticsearch_index_lifecycle` resource.
//!
//! ILM policies carry a fixed phase enumeration (`hot`, `warm`, `cold`,
//! `frozen`, `delete`). Each configured phase is marshaled field-by-field into
//! the API's `actions` object; deserialization is the mechanical inverse.
//! Actions this provider does not model are preserved verbatim in a computed
//! `unknown_actions` attribute so they survive the round-trip.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::ResourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};
use crate::util::{from_struct, to_struct};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
struct RolloverAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_docs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_primary_shard_size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
struct ShrinkAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    number_of_shards: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_primary_shard_size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
struct ForcemergeAction {
    max_num_segments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct PhaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rollover: Option<RolloverAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shrink: Option<ShrinkAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forcemerge: Option<ForcemergeAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    freeze: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    readonly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    set_priority: Option<i64>,
    /// Actions observed remotely that this provider does not model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unknown_actions: Option<Map<String, Value>>,
}

impl PhaseConfig {
    /// Marshal into the API phase shape. The `delete` phase carries an
    /// implicit `delete` action when the configuration names none.
    fn to_api(&self, implicit_delete: bool) -> Result<Value, ProviderError> {
        let mut actions = Map::new();
        if let Some(rollover) = &self.rollover {
            actions.insert("rollover".to_string(), serde_json::to_value(rollover)?);
        }
        if let Some(shrink) = &self.shrink {
            actions.insert("shrink".to_string(), serde_json::to_value(shrink)?);
        }
        if let Some(forcemerge) = &self.forcemerge {
            actions.insert("forcemerge".to_string(), serde_json::to_value(forcemerge)?);
        }
        if self.freeze == Some(true) {
            actions.insert("freeze".to_string(), json!({}));
        }
        if self.readonly == Some(true) {
            actions.insert("readonly".to_string(), json!({}));
        }
        if let Some(priority) = self.set_priority {
            actions.insert("set_priority".to_string(), json!({ "priority": priority }));
        }
        if let Some(unknown) = &self.unknown_actions {
            for (name, body) in unknown {
                actions.insert(name.clone(), body.clone());
            }
        }
        if implicit_delete && !actions.contains_key("delete") {
            actions.insert("delete".to_string(), json!({}));
        }

        let mut phase = Map::new();
        if let Some(min_age) = &self.min_age {
            phase.insert("min_age".to_string(), json!(min_age));
        }
        phase.insert("actions".to_string(), Value::Object(actions));
        Ok(Value::Object(phase))
    }

    /// The mechanical inverse of [`Self::to_api`].
    fn from_api(phase: &Value, delete_phase: bool) -> Result<Self, ProviderError> {
        let mut config = PhaseConfig {
            min_age: phase
                .get("min_age")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..Default::default()
        };

        let mut actions = phase
            .get("actions")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if let Some(rollover) = actions.remove("rollover") {
            config.rollover = Some(serde_json::from_value(rollover)?);
        }
        if let Some(shrink) = actions.remove("shrink") {
            config.shrink = Some(serde_json::from_value(shrink)?);
        }
        if let Some(forcemerge) = actions.remove("forcemerge") {
            config.forcemerge = Some(serde_json::from_value(forcemerge)?);
        }
        if actions.remove("freeze").is_some() {
            config.freeze = Some(true);
        }
        if actions.remove("readonly").is_some() {
            config.readonly = Some(true);
        }
        if let Some(set_priority) = actions.remove("set_priority") {
            config.set_priority = set_priority.get("priority").and_then(Value::as_i64);
        }
        if delete_phase {
            // The implicit delete action round-trips to nothing; a delete
            // action with options is preserved.
            if let Some(delete) = actions.remove("delete") {
                if delete.as_object().is_some_and(|o| !o.is_empty()) {
                    actions.insert("delete".to_string(), delete);
                }
            }
        }
        if !actions.is_empty() {
            config.unknown_actions = Some(actions);
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct LifecycleState {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hot: Option<PhaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warm: Option<PhaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cold: Option<PhaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frozen: Option<PhaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<PhaseConfig>,
}

impl LifecycleState {
    fn to_api(&self) -> Result<Value, ProviderError> {
        let mut phases = Map::new();
        for (name, phase) in [
            ("hot", &self.hot),
            ("warm", &self.warm),
            ("cold", &self.cold),
            ("frozen", &self.frozen),
        ] {
            if let Some(phase) = phase {
                phases.insert(name.to_string(), phase.to_api(false)?);
            }
        }
        if let Some(phase) = &self.delete {
            phases.insert("delete".to_string(), phase.to_api(true)?);
        }
        Ok(json!({ "phases": phases }))
    }

    fn from_api(name: &str, policy: &Value) -> Result<Self, ProviderError> {
        let phases = policy.get("phases").unwrap_or(&Value::Null);
        let parse = |key: &str, delete_phase: bool| -> Result<Option<PhaseConfig>, ProviderError> {
            phases
                .get(key)
                .map(|phase| PhaseConfig::from_api(phase, delete_phase))
                .transpose()
        };
        Ok(Self {
            id: Some(name.to_string()),
            name: name.to_string(),
            hot: parse("hot", false)?,
            warm: parse("warm", false)?,
            cold: parse("cold", false)?,
            frozen: parse("frozen", false)?,
            delete: parse("delete", true)?,
        })
    }
}

fn action_phase_block() -> Block {
    Block::new()
        .with_attribute("min_age", Attribute::optional_string())
        .with_attribute("freeze", Attribute::optional_bool())
        .with_attribute("readonly", Attribute::optional_bool())
        .with_attribute("set_priority", Attribute::optional_int64())
        .with_attribute(
            "unknown_actions",
            Attribute::new(AttributeType::Dynamic, AttributeFlags::computed()),
        )
        .with_block(
            "rollover",
            NestedBlock::single(
                Block::new()
                    .with_attribute("max_age", Attribute::optional_string())
                    .with_attribute("max_docs", Attribute::optional_int64())
                    .with_attribute("max_size", Attribute::optional_string())
                    .with_attribute("max_primary_shard_size", Attribute::optional_string()),
            ),
        )
        .with_block(
            "shrink",
            NestedBlock::single(
                Block::new()
                    .with_attribute("number_of_shards", Attribute::optional_int64())
                    .with_attribute("max_primary_shard_size", Attribute::optional_string()),
            ),
        )
        .with_block(
            "forcemerge",
            NestedBlock::single(
                Block::new().with_attribute(
                    "max_num_segments",
                    Attribute::new(AttributeType::Int64, AttributeFlags::required()),
                ),
            ),
        )
}

fn delete_phase_block() -> Block {
    Block::new()
        .with_attribute("min_age", Attribute::optional_string())
        .with_attribute(
            "unknown_actions",
            Attribute::new(AttributeType::Dynamic, AttributeFlags::computed()),
        )
}

pub struct IndexLifecycleResource;

#[async_trait::async_trait]
impl ResourceHandler for IndexLifecycleResource {
    fn type_name(&self) -> &'static str {
        "elasticstack_elasticsearch_index_lifecycle"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Name of the ILM policy."),
            )
            .with_block("hot", NestedBlock::single(action_phase_block()))
            .with_block("warm", NestedBlock::single(action_phase_block()))
            .with_block("cold", NestedBlock::single(action_phase_block()))
            .with_block("frozen", NestedBlock::single(action_phase_block()))
            .with_block("delete", NestedBlock::single(delete_phase_block()))
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError> {
        let mut model: LifecycleState = to_struct(planned)?;
        let es = clients.elasticsearch()?;
        es.put_ilm_policy(&model.name, &model.to_api()?).await?;
        model.id = Some(model.name.clone());
        from_struct(&model)
    }

    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: LifecycleState = to_struct(state)?;
        let es = clients.elasticsearch()?;
        let Some(policy) = es.get_ilm_policy(&model.name).await? else {
            return Ok(None);
        };
        from_struct(&LifecycleState::from_api(&model.name, &policy)?).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        // ILM policy updates are a full PUT, same as create.
        self.create(clients, planned).await
    }

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError> {
        let model: LifecycleState = to_struct(state)?;
        clients.elasticsearch()?.delete_ilm_policy(&model.name).await
    }

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let es = clients.elasticsearch()?;
        let Some(policy) = es.get_ilm_policy(id).await? else {
            return Ok(None);
        };
        from_struct(&LifecycleState::from_api(id, &policy)?).map(Some)
    }
}
