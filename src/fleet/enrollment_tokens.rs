//! The `elasticstack_fleet_enrollment_tokens` data source.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::DataSourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

fn token_object_type() -> AttributeType {
    let fields: HashMap<String, AttributeType> = [
        ("id", AttributeType::String),
        ("name", AttributeType::String),
        ("api_key", AttributeType::String),
        ("api_key_id", AttributeType::String),
        ("policy_id", AttributeType::String),
        ("active", AttributeType::Bool),
        ("created_at", AttributeType::String),
    ]
    .into_iter()
    .map(|(name, attr_type)| (name.to_string(), attr_type))
    .collect();
    AttributeType::Object(fields)
}

pub struct EnrollmentTokensDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for EnrollmentTokensDataSource {
    fn type_name(&self) -> &'static str {
        "elasticstack_fleet_enrollment_tokens"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "policy_id",
                Attribute::optional_string()
                    .with_description("Only list tokens for this agent policy."),
            )
            .with_attribute(
                "tokens",
                Attribute::new(
                    AttributeType::list(token_object_type()),
                    AttributeFlags::computed(),
                )
                .sensitive(),
            )
    }

    async fn read(&self, clients: &Clients, config: Value) -> Result<Value, ProviderError> {
        let policy_id = config
            .get("policy_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let tokens = clients
            .fleet()?
            .list_enrollment_tokens(policy_id.as_deref())
            .await?;
        Ok(json!({
            "policy_id": policy_id,
            "tokens": tokens,
        }))
    }
}
