//! The `elasticstack_elasticsearch_index` resource and data source.
//!
//! Elasticsearch reports far more settings than a user ever configures
//! (defaults, UUIDs, creation dates). To keep state drift-free, reads flatten
//! the observed settings and mappings to dotted-key maps and keep only the
//! keys the configuration declares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::{DataSourceHandler, ResourceHandler};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::util::{flatten, from_struct, normalized_eq, prune_undeclared, to_struct};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct IndexState {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    settings: Option<BTreeMap<String, Value>>,
    /// JSON-normalized mappings document.
    #[serde(default)]
    mappings: Option<String>,
}

impl IndexState {
    fn to_api(&self) -> Result<Value, ProviderError> {
        let mut body = Map::new();
        if let Some(settings) = &self.settings {
            let map: Map<String, Value> = settings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            body.insert("settings".to_string(), Value::Object(map));
        }
        if let Some(mappings) = &self.mappings {
            body.insert("mappings".to_string(), parse_mappings(mappings)?);
        }
        Ok(Value::Object(body))
    }
}

fn parse_mappings(raw: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(raw).map_err(|e| {
        ProviderError::Validation(format!("mappings is not valid JSON: {e}"))
    })
}

/// Restrict observed settings to the keys the configuration declares.
/// Elasticsearch nests everything under `index`, so a desired key matches
/// either verbatim or with the `index.` prefix.
fn reconcile_settings(
    observed: &Value,
    desired: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let flat = flatten(observed);
    desired
        .keys()
        .filter_map(|key| {
            flat.get(key)
                .or_else(|| flat.get(&format!("index.{key}")))
                .map(|value| (key.clone(), value.clone()))
        })
        .collect()
}

/// Restrict observed mappings to the desired document's keys; keep the
/// configured string verbatim when it is semantically equal.
fn reconcile_mappings(observed: &Value, desired: &str) -> Result<String, ProviderError> {
    let desired_value = parse_mappings(desired)?;
    let pruned = prune_undeclared(observed, &desired_value);
    let rendered = serde_json::to_string(&pruned)?;
    if normalized_eq(&rendered, desired) {
        Ok(desired.to_string())
    } else {
        Ok(rendered)
    }
}

/// Flattened mapping keys of the `properties` tree.
fn mapping_keys(raw: &str) -> Vec<String> {
    serde_json::from_str::<Value>(raw)
        .map(|value| flatten(&value).into_keys().collect())
        .unwrap_or_default()
}

pub struct IndexResource;

#[async_trait::async_trait]
impl ResourceHandler for IndexResource {
    fn type_name(&self) -> &'static str {
        "elasticstack_elasticsearch_index"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Name of the index."),
            )
            .with_attribute(
                "settings",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional(),
                )
                .with_description("Index settings as dotted keys, e.g. `number_of_shards`."),
            )
            .with_attribute(
                "mappings",
                Attribute::optional_string()
                    .with_description("Field mappings as a JSON document."),
            )
    }

    /// Mapping fields cannot be removed in place.
    fn requires_replace(&self, prior: &Value, planned: &Value) -> bool {
        let prior_mappings = prior.get("mappings").and_then(Value::as_str);
        let planned_mappings = planned.get("mappings").and_then(Value::as_str);
        match (prior_mappings, planned_mappings) {
            (Some(prior), Some(planned)) => {
                let planned_keys = mapping_keys(planned);
                mapping_keys(prior)
                    .iter()
                    .any(|key| !planned_keys.contains(key))
            }
            (Some(_), None) => true,
            _ => false,
        }
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError> {
        let mut model: IndexState = to_struct(planned)?;
        let es = clients.elasticsearch()?;
        es.create_index(&model.name, &model.to_api()?).await?;
        model.id = Some(model.name.clone());
        from_struct(&model)
    }

    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError> {
        let mut model: IndexState = to_struct(state)?;
        let es = clients.elasticsearch()?;
        let Some(observed) = es.get_index(&model.name).await? else {
            debug!(index = %model.name, "index no longer exists");
            return Ok(None);
        };

        if let Some(desired) = model.settings.take() {
            let observed_settings = observed.get("settings").unwrap_or(&Value::Null);
            model.settings = Some(reconcile_settings(observed_settings, &desired));
        }
        if let Some(desired) = model.mappings.take() {
            let observed_mappings = observed.get("mappings").unwrap_or(&Value::Null);
            model.mappings = Some(reconcile_mappings(observed_mappings, &desired)?);
        }
        model.id = Some(model.name.clone());
        from_struct(&model).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior_model: IndexState = to_struct(prior)?;
        let mut model: IndexState = to_struct(planned)?;
        let es = clients.elasticsearch()?;

        // Only changed settings go over the wire; the API rejects updates
        // that touch static settings it already holds.
        let prior_settings = prior_model.settings.unwrap_or_default();
        let planned_settings = model.settings.clone().unwrap_or_default();
        let changed: Map<String, Value> = planned_settings
            .iter()
            .filter(|(key, value)| prior_settings.get(*key) != Some(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !changed.is_empty() {
            es.put_settings(&model.name, &Value::Object(changed)).await?;
        }

        // Mapping updates are additive. Removals never reach this point;
        // they force replacement at plan time.
        if let Some(mappings) = &model.mappings {
            let changed = match &prior_model.mappings {
                Some(prior) => !normalized_eq(prior, mappings),
                None => true,
            };
            if changed {
                es.put_mapping(&model.name, &parse_mappings(mappings)?).await?;
            }
        }

        model.id = Some(model.name.clone());
        from_struct(&model)
    }

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError> {
        let model: IndexState = to_struct(state)?;
        clients.elasticsearch()?.delete_index(&model.name).await
    }

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let es = clients.elasticsearch()?;
        let Some(observed) = es.get_index(id).await? else {
            return Ok(None);
        };
        let mappings = observed
            .get("mappings")
            .filter(|m| m.as_object().is_some_and(|o| !o.is_empty()))
            .map(serde_json::to_string)
            .transpose()?;
        let model = IndexState {
            id: Some(id.to_string()),
            name: id.to_string(),
            settings: None,
            mappings,
        };
        from_struct(&model).map(Some)
    }
}

pub struct IndexDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for IndexDataSource {
    fn type_name(&self) -> &'static str {
        "elasticstack_elasticsearch_index"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "settings",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::computed(),
                ),
            )
            .with_attribute(
                "mappings",
                Attribute::new(AttributeType::String, AttributeFlags::computed()),
            )
    }

    async fn read(&self, clients: &Clients, config: Value) -> Result<Value, ProviderError> {
        let name = crate::util::require_str(&config, "name")?.to_string();
        let es = clients.elasticsearch()?;
        let observed = es
            .get_index(&name)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("index {name} does not exist")))?;

        let settings: BTreeMap<String, Value> =
            flatten(observed.get("settings").unwrap_or(&Value::Null));
        let mappings = serde_json::to_string(observed.get("mappings").unwrap_or(&json!({})))?;

        Ok(json!({
            "id": name,
            "name": name,
            "settings": settings,
            "mappings": mappings,
        }))
    }
}
