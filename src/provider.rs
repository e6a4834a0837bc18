//! The Elastic stack provider: resource/data-source registries and the
//! [`ProviderService`] implementation dispatching lifecycle calls to them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::api::{Clients, ElasticsearchClient, FleetClient, KibanaClient};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::util::diff_flattened;
use crate::validation;

/// One managed resource type: its schema and CRUD callbacks.
///
/// States are `serde_json::Value` objects shaped by [`Self::schema`].
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Replacement triggers beyond `force_new` attributes. The index resource
    /// overrides this to force replacement when mapping fields are removed.
    fn requires_replace(&self, prior: &Value, planned: &Value) -> bool {
        let _ = (prior, planned);
        false
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError>;

    /// `None` means the remote object is gone and should leave state.
    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError>;

    async fn update(
        &self,
        clients: &Clients,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError>;

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let _ = (clients, id);
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            self.type_name()
        )))
    }
}

/// One read-only data source type.
#[async_trait::async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    async fn read(&self, clients: &Clients, config: Value) -> Result<Value, ProviderError>;
}

fn service_block(service: &str) -> NestedBlock {
    NestedBlock::single(
        Block::new()
            .with_description(format!("Connection settings for {service}."))
            .with_attribute(
                "endpoint",
                Attribute::optional_string().with_description("Base URL of the service API."),
            )
            .with_attribute("username", Attribute::optional_string())
            .with_attribute("password", Attribute::optional_string().sensitive())
            .with_attribute("api_key", Attribute::optional_string().sensitive())
            .with_attribute(
                "insecure",
                Attribute::optional_bool()
                    .with_description("Skip TLS certificate verification."),
            ),
    )
}

fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_block("elasticsearch", service_block("Elasticsearch"))
        .with_block("kibana", service_block("Kibana"))
        .with_block("fleet", service_block("Fleet"))
}

/// The provider. Holds the resource and data-source registries and, once
/// configured, the service clients.
pub struct ElasticstackProvider {
    resources: BTreeMap<&'static str, Box<dyn ResourceHandler>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSourceHandler>>,
    clients: RwLock<Option<Arc<Clients>>>,
}

impl ElasticstackProvider {
    /// Build the provider with every resource and data source registered.
    pub fn new() -> Self {
        let mut provider = Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            clients: RwLock::new(None),
        };

        provider.register_resource(Box::new(crate::elasticsearch::index::IndexResource));
        provider.register_resource(Box::new(crate::elasticsearch::ilm::IndexLifecycleResource));
        provider.register_resource(Box::new(crate::kibana::space::SpaceResource));
        provider.register_resource(Box::new(crate::kibana::alerting_rule::AlertingRuleResource));
        provider.register_resource(Box::new(crate::fleet::agent_policy::AgentPolicyResource));
        provider.register_resource(Box::new(
            crate::fleet::integration_policy::IntegrationPolicyResource::new(),
        ));

        provider.register_data_source(Box::new(crate::elasticsearch::index::IndexDataSource));
        provider.register_data_source(Box::new(crate::kibana::space::SpaceDataSource));
        provider.register_data_source(Box::new(
            crate::fleet::enrollment_tokens::EnrollmentTokensDataSource,
        ));

        provider
    }

    fn register_resource(&mut self, handler: Box<dyn ResourceHandler>) {
        self.resources.insert(handler.type_name(), handler);
    }

    fn register_data_source(&mut self, handler: Box<dyn DataSourceHandler>) {
        self.data_sources.insert(handler.type_name(), handler);
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn ResourceHandler, ProviderError> {
        self.resources
            .get(resource_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSourceHandler, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(Box::as_ref)
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    async fn clients(&self) -> Result<Arc<Clients>, ProviderError> {
        self.clients.read().await.clone().ok_or_else(|| {
            ProviderError::FailedPrecondition("provider has not been configured".to_string())
        })
    }

    fn build_clients(config: &ProviderConfig) -> Result<Clients, ProviderError> {
        let mut clients = Clients::default();
        if config.elasticsearch.is_configured() {
            clients.elasticsearch = Some(ElasticsearchClient::new(&config.elasticsearch)?);
        }
        if config.kibana.is_configured() {
            clients.kibana = Some(KibanaClient::new(&config.kibana)?);
        }
        if config.fleet.is_configured() {
            clients.fleet = Some(FleetClient::new(&config.fleet)?);
        }
        Ok(clients)
    }
}

impl Default for ElasticstackProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// True when `path` is `attribute` or lies beneath it.
fn path_under(path: &str, attribute: &str) -> bool {
    path == attribute
        || (path.starts_with(attribute) && path.as_bytes().get(attribute.len()) == Some(&b'.'))
}

#[async_trait::async_trait]
impl ProviderService for ElasticstackProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(provider_config_schema());
        for (name, handler) in &self.resources {
            schema = schema.with_resource(*name, handler.schema());
        }
        for (name, handler) in &self.data_sources {
            schema = schema.with_data_source(*name, handler.schema());
        }
        schema
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&provider_config_schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = ProviderConfig::resolve(&config);
        let clients = Self::build_clients(&resolved)?;
        debug!(
            elasticsearch = clients.elasticsearch.is_some(),
            kibana = clients.kibana.is_some(),
            fleet = clients.fleet.is_some(),
            "Service clients configured"
        );
        *self.clients.write().await = Some(Arc::new(clients));
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let handler = self.resource(resource_type)?;
        Ok(validation::validate(&handler.schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let handler = self.resource(resource_type)?;

        let changes = diff_flattened(prior_state.as_ref(), &proposed_state);
        if changes.is_empty() {
            return Ok(PlanResult::no_change(proposed_state));
        }

        // Replacement only applies to resources that already exist.
        let requires_replace = match &prior_state {
            Some(prior) => {
                let schema = handler.schema();
                let force_new = schema.force_new_attributes();
                changes.iter().any(|change| {
                    force_new.iter().any(|attr| path_under(&change.path, attr))
                }) || handler.requires_replace(prior, &proposed_state)
            }
            None => false,
        };

        Ok(PlanResult::with_changes(
            proposed_state,
            changes,
            requires_replace,
        ))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let handler = self.resource(resource_type)?;
        let clients = self.clients().await?;
        handler.create(&clients, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let handler = self.resource(resource_type)?;
        let clients = self.clients().await?;
        Ok(handler
            .read(&clients, current_state)
            .await?
            .unwrap_or(Value::Null))
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let handler = self.resource(resource_type)?;
        let clients = self.clients().await?;
        handler.update(&clients, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let handler = self.resource(resource_type)?;
        let clients = self.clients().await?;
        handler.delete(&clients, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let handler = self.resource(resource_type)?;
        let clients = self.clients().await?;
        let state = handler
            .import(&clients, id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let handler = self.data_source(data_source_type)?;
        Ok(validation::validate(&handler.schema(), &config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let handler = self.data_source(data_source_type)?;
        let clients = self.clients().await?;
        handler.read(&clients, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_lists_every_resource_and_data_source() {
        let schema = ElasticstackProvider::new().schema();
        let mut resources: Vec<&String> = schema.resources.keys().collect();
        resources.sort();
        assert_eq!(
            resources,
            vec![
                "elasticstack_elasticsearch_index",
                "elasticstack_elasticsearch_index_lifecycle",
                "elasticstack_fleet_agent_policy",
                "elasticstack_fleet_integration_policy",
                "elasticstack_kibana_alerting_rule",
                "elasticstack_kibana_space",
            ]
        );
        let mut data_sources: Vec<&String> = schema.data_sources.keys().collect();
        data_sources.sort();
        assert_eq!(
            data_sources,
            vec![
                "elasticstack_elasticsearch_index",
                "elasticstack_fleet_enrollment_tokens",
                "elasticstack_kibana_space",
            ]
        );
    }

    #[tokio::test]
    async fn plan_flags_force_new_attribute_changes() {
        let provider = ElasticstackProvider::new();
        let plan = provider
            .plan(
                "elasticstack_kibana_space",
                Some(json!({"space_id": "a", "name": "A"})),
                json!({"space_id": "b", "name": "A"}),
                json!({}),
            )
            .await
            .unwrap();
        assert!(plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "space_id");
    }

    #[tokio::test]
    async fn plan_without_prior_state_never_replaces() {
        let provider = ElasticstackProvider::new();
        let plan = provider
            .plan(
                "elasticstack_kibana_space",
                None,
                json!({"space_id": "a", "name": "A"}),
                json!({}),
            )
            .await
            .unwrap();
        assert!(!plan.requires_replace);
        assert!(!plan.changes.is_empty());
    }

    #[tokio::test]
    async fn plan_with_equal_states_is_a_no_op() {
        let provider = ElasticstackProvider::new();
        let state = json!({"space_id": "a", "name": "A"});
        let plan = provider
            .plan(
                "elasticstack_kibana_space",
                Some(state.clone()),
                state.clone(),
                json!({}),
            )
            .await
            .unwrap();
        assert!(plan.changes.is_empty());
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state, state);
    }

    #[tokio::test]
    async fn lifecycle_calls_before_configure_fail() {
        let provider = ElasticstackProvider::new();
        let err = provider
            .create("elasticstack_kibana_space", json!({"space_id": "a"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn unknown_resource_type_is_rejected() {
        let provider = ElasticstackProvider::new();
        let err = provider
            .validate_resource_config("elasticstack_nonexistent", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn provider_config_validation_accepts_service_blocks() {
        let provider = ElasticstackProvider::new();
        let diagnostics = provider
            .validate_provider_config(json!({
                "elasticsearch": {"endpoint": "https://es:9200", "username": "elastic", "password": "x"}
            }))
            .await
            .unwrap();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }
}
