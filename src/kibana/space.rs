//! The `elasticstack_kibana_space` resource and data source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::kibana::Space;
use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::{DataSourceHandler, ResourceHandler};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::util::{from_struct, require_str, to_struct};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
struct SpaceState {
    #[serde(default)]
    id: Option<String>,
    space_id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    disabled_features: Vec<String>,
}

impl SpaceState {
    fn to_api(&self) -> Space {
        Space {
            id: self.space_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            disabled_features: self.disabled_features.clone(),
        }
    }

    fn from_api(space: Space) -> Self {
        Self {
            id: Some(space.id.clone()),
            space_id: space.id,
            name: space.name,
            description: space.description,
            disabled_features: space.disabled_features,
        }
    }
}

fn space_schema(flags: AttributeFlags) -> Schema {
    let base = Schema::v0().with_attribute("id", Attribute::computed_string());
    match flags.required {
        // Resource shape: the user declares everything.
        true => base
            .with_attribute(
                "space_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Identifier of the space; cannot be changed once created."),
            )
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "disabled_features",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            ),
        // Data-source shape: only the lookup key is user-supplied.
        false => base
            .with_attribute("space_id", Attribute::required_string())
            .with_attribute(
                "name",
                Attribute::new(AttributeType::String, AttributeFlags::computed()),
            )
            .with_attribute(
                "description",
                Attribute::new(AttributeType::String, AttributeFlags::computed()),
            )
            .with_attribute(
                "disabled_features",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::computed(),
                ),
            ),
    }
}

pub struct SpaceResource;

#[async_trait::async_trait]
impl ResourceHandler for SpaceResource {
    fn type_name(&self) -> &'static str {
        "elasticstack_kibana_space"
    }

    fn schema(&self) -> Schema {
        space_schema(AttributeFlags::required())
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError> {
        let mut model: SpaceState = to_struct(planned)?;
        clients.kibana()?.create_space(&model.to_api()).await?;
        model.id = Some(model.space_id.clone());
        from_struct(&model)
    }

    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError> {
        let model: SpaceState = to_struct(state)?;
        let Some(space) = clients.kibana()?.get_space(&model.space_id).await? else {
            return Ok(None);
        };
        from_struct(&SpaceState::from_api(space)).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let mut model: SpaceState = to_struct(planned)?;
        clients.kibana()?.update_space(&model.to_api()).await?;
        model.id = Some(model.space_id.clone());
        from_struct(&model)
    }

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError> {
        let model: SpaceState = to_struct(state)?;
        clients.kibana()?.delete_space(&model.space_id).await
    }

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let Some(space) = clients.kibana()?.get_space(id).await? else {
            return Ok(None);
        };
        from_struct(&SpaceState::from_api(space)).map(Some)
    }
}

pub struct SpaceDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for SpaceDataSource {
    fn type_name(&self) -> &'static str {
        "elasticstack_kibana_space"
    }

    fn schema(&self) -> Schema {
        space_schema(AttributeFlags::optional())
    }

    async fn read(&self, clients: &Clients, config: Value) -> Result<Value, ProviderError> {
        let space_id = require_str(&config, "space_id")?;
        let space = clients
            .kibana()?
            .get_space(space_id)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!("space {space_id} does not exist"))
            })?;
        from_struct(&SpaceState::from_api(space))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_round_trips_through_the_api_shape() {
        let model = SpaceState {
            id: None,
            space_id: "team-a".to_string(),
            name: "Team A".to_string(),
            description: Some("Team A's space".to_string()),
            disabled_features: vec!["ml".to_string(), "apm".to_string()],
        };
        let round_tripped = SpaceState::from_api(model.to_api());
        assert_eq!(round_tripped.space_id, model.space_id);
        assert_eq!(round_tripped.disabled_features, model.disabled_features);
        assert_eq!(round_tripped.id.as_deref(), Some("team-a"));
    }

    #[test]
    fn resource_schema_forces_replacement_on_space_id() {
        let schema = SpaceResource.schema();
        assert_eq!(schema.force_new_attributes(), vec!["space_id"]);
    }

    #[test]
    fn state_deserializes_without_optional_fields() {
        let model: SpaceState =
            to_struct(json!({"space_id": "a", "name": "A"})).unwrap();
        assert!(model.description.is_none());
        assert!(model.disabled_features.is_empty());
    }
}
