//! The `elasticstack_fleet_integration_policy` resource.
//!
//! Fleet replaces secret values with opaque `{"id": "<ref>"}` references in
//! every response. The resource keeps a private map from reference id to the
//! plaintext the user configured and substitutes plaintext back during read,
//! so state never degrades to opaque references. References whose plaintext
//! was never seen (after an import, or a provider restart) are left as
//! references.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::fleet::{PackagePolicy, PackageRef};
use crate::api::Clients;
use crate::error::ProviderError;
use crate::provider::ResourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::util::{from_struct, normalized_eq, to_struct};

/// True for the opaque reference objects Fleet substitutes for secrets.
fn is_secret_ref(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has_id = obj.get("id").is_some_and(Value::is_string);
    has_id
        && (obj.len() == 1
            || obj.get("isSecretRef").and_then(Value::as_bool) == Some(true))
}

/// Walk the desired and observed payloads in parallel; wherever the server
/// substituted a reference for a configured value, remember the plaintext.
fn harvest_secrets(desired: &Value, observed: &Value, cache: &mut HashMap<String, Value>) {
    if is_secret_ref(observed) && !is_secret_ref(desired) {
        if let Some(id) = observed["id"].as_str() {
            cache.insert(id.to_string(), desired.clone());
        }
        return;
    }
    match (desired, observed) {
        (Value::Object(desired), Value::Object(observed)) => {
            for (key, observed_value) in observed {
                if let Some(desired_value) = desired.get(key) {
                    harvest_secrets(desired_value, observed_value, cache);
                }
            }
        }
        (Value::Array(desired), Value::Array(observed)) => {
            for (desired_value, observed_value) in desired.iter().zip(observed) {
                harvest_secrets(desired_value, observed_value, cache);
            }
        }
        _ => {}
    }
}

/// Replace known references with their plaintext; unknown ones stay opaque.
fn restore_secrets(value: Value, cache: &HashMap<String, Value>) -> Value {
    if is_secret_ref(&value) {
        if let Some(plaintext) = value["id"].as_str().and_then(|id| cache.get(id)) {
            return plaintext.clone();
        }
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, restore_secrets(v, cache)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| restore_secrets(v, cache))
                .collect(),
        ),
        other => other,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
struct IntegrationPolicyState {
    #[serde(default)]
    policy_id: Option<String>,
    name: String,
    agent_policy_id: String,
    package_name: String,
    package_version: String,
    /// JSON-normalized inputs document.
    #[serde(default)]
    inputs: Option<String>,
    /// JSON-normalized package-level variables.
    #[serde(default)]
    vars: Option<String>,
}

fn parse_json_attr(raw: Option<&str>, attr: &str) -> Result<Option<Value>, ProviderError> {
    raw.map(|raw| {
        serde_json::from_str(raw)
            .map_err(|e| ProviderError::Validation(format!("{attr} is not valid JSON: {e}")))
    })
    .transpose()
}

impl IntegrationPolicyState {
    fn to_api(&self, include_id: bool) -> Result<PackagePolicy, ProviderError> {
        Ok(PackagePolicy {
            id: if include_id { self.policy_id.clone() } else { None },
            name: self.name.clone(),
            policy_id: self.agent_policy_id.clone(),
            package: PackageRef {
                name: self.package_name.clone(),
                version: self.package_version.clone(),
            },
            inputs: parse_json_attr(self.inputs.as_deref(), "inputs")?.unwrap_or(json!({})),
            vars: parse_json_attr(self.vars.as_deref(), "vars")?,
        })
    }

    /// Fold an observed policy into state, keeping configured JSON strings
    /// verbatim when they are semantically equal to the observation.
    fn absorb(&mut self, policy: PackagePolicy) -> Result<(), ProviderError> {
        self.policy_id = policy.id;
        self.name = policy.name;
        self.agent_policy_id = policy.policy_id;
        self.package_name = policy.package.name;
        self.package_version = policy.package.version;

        self.inputs = keep_or_replace(self.inputs.take(), Some(&policy.inputs))?;
        self.vars = keep_or_replace(self.vars.take(), policy.vars.as_ref())?;
        Ok(())
    }

    fn require_id(&self) -> Result<&str, ProviderError> {
        self.policy_id.as_deref().ok_or_else(|| {
            ProviderError::Internal("integration policy state has no policy_id".to_string())
        })
    }
}

fn keep_or_replace(
    configured: Option<String>,
    observed: Option<&Value>,
) -> Result<Option<String>, ProviderError> {
    let Some(observed) = observed else {
        return Ok(configured);
    };
    let rendered = serde_json::to_string(observed)?;
    match configured {
        Some(configured) if normalized_eq(&configured, &rendered) => Ok(Some(configured)),
        _ => Ok(Some(rendered)),
    }
}

pub struct IntegrationPolicyResource {
    secrets: Mutex<HashMap<String, Value>>,
}

impl IntegrationPolicyResource {
    pub fn new() -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
        }
    }

    fn harvest(&self, desired: &PackagePolicy, observed: &PackagePolicy) {
        let mut cache = self.secrets.lock().expect("secret cache poisoned");
        harvest_secrets(&desired.inputs, &observed.inputs, &mut cache);
        if let (Some(desired_vars), Some(observed_vars)) = (&desired.vars, &observed.vars) {
            harvest_secrets(desired_vars, observed_vars, &mut cache);
        }
        debug!(refs = cache.len(), "secret reference cache updated");
    }

    fn restore(&self, mut policy: PackagePolicy) -> PackagePolicy {
        let cache = self.secrets.lock().expect("secret cache poisoned");
        policy.inputs = restore_secrets(policy.inputs, &cache);
        policy.vars = policy.vars.map(|vars| restore_secrets(vars, &cache));
        policy
    }
}

impl Default for IntegrationPolicyResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ResourceHandler for IntegrationPolicyResource {
    fn type_name(&self) -> &'static str {
        "elasticstack_fleet_integration_policy"
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
                "agent_policy_id",
                Attribute::required_string()
                    .with_description("Agent policy the integration is attached to."),
            )
            .with_attribute(
                "package_name",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute("package_version", Attribute::required_string())
            .with_attribute(
                "inputs",
                Attribute::optional_string()
                    .with_description("Integration inputs as a JSON document."),
            )
            .with_attribute(
                "vars",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Package-level variables as a JSON document."),
            )
    }

    async fn create(&self, clients: &Clients, planned: Value) -> Result<Value, ProviderError> {
        let mut model: IntegrationPolicyState = to_struct(planned)?;
        let desired = model.to_api(true)?;
        let created = clients.fleet()?.create_package_policy(&desired).await?;
        self.harvest(&desired, &created);
        model.policy_id = created.id.clone();
        model.absorb(self.restore(created))?;
        from_struct(&model)
    }

    async fn read(&self, clients: &Clients, state: Value) -> Result<Option<Value>, ProviderError> {
        let mut model: IntegrationPolicyState = to_struct(state)?;
        let Some(observed) = clients
            .fleet()?
            .get_package_policy(model.require_id()?)
            .await?
        else {
            return Ok(None);
        };
        model.absorb(self.restore(observed))?;
        from_struct(&model).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let mut model: IntegrationPolicyState = to_struct(planned)?;
        let desired = model.to_api(false)?;
        let updated = clients
            .fleet()?
            .update_package_policy(model.require_id()?, &desired)
            .await?;
        self.harvest(&desired, &updated);
        model.absorb(self.restore(updated))?;
        from_struct(&model)
    }

    async fn delete(&self, clients: &Clients, state: Value) -> Result<(), ProviderError> {
        let model: IntegrationPolicyState = to_struct(state)?;
        clients
            .fleet()?
            .delete_package_policy(model.require_id()?)
            .await
    }

    async fn import(&self, clients: &Clients, id: &str) -> Result<Option<Value>, ProviderError> {
        let Some(observed) = clients.fleet()?.get_package_policy(id).await? else {
            return Ok(None);
        };
        // No plaintext is known at import time; references stay opaque.
        let mut model = IntegrationPolicyState::default();
        model.absorb(observed)?;
        from_struct(&model).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_refs_are_detected() {
        assert!(is_secret_ref(&json!({"id": "ref-1"})));
        assert!(is_secret_ref(&json!({"id": "ref-1", "isSecretRef": true})));
        assert!(!is_secret_ref(&json!({"id": "ref-1", "other": 1})));
        assert!(!is_secret_ref(&json!("plaintext")));
        assert!(!is_secret_ref(&json!({"id": 42})));
    }

    #[test]
    fn harvest_pairs_plaintext_with_references() {
        let desired = json!({
            "logfile": {"vars": {"token": "hunter2", "path": "/var/log"}}
        });
        let observed = json!({
            "logfile": {"vars": {"token": {"id": "ref-1", "isSecretRef": true}, "path": "/var/log"}}
        });
        let mut cache = HashMap::new();
        harvest_secrets(&desired, &observed, &mut cache);
        assert_eq!(cache.get("ref-1"), Some(&json!("hunter2")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn harvest_descends_into_arrays() {
        let desired = json!([{"token": "a"}, {"token": "b"}]);
        let observed = json!([{"token": {"id": "ref-a"}}, {"token": {"id": "ref-b"}}]);
        let mut cache = HashMap::new();
        harvest_secrets(&desired, &observed, &mut cache);
        assert_eq!(cache.get("ref-a"), Some(&json!("a")));
        assert_eq!(cache.get("ref-b"), Some(&json!("b")));
    }

    #[test]
    fn restore_substitutes_known_refs_and_keeps_unknown_ones() {
        let mut cache = HashMap::new();
        cache.insert("ref-1".to_string(), json!("hunter2"));
        let observed = json!({
            "vars": {
                "token": {"id": "ref-1", "isSecretRef": true},
                "other": {"id": "ref-2", "isSecretRef": true}
            }
        });
        let restored = restore_secrets(observed, &cache);
        assert_eq!(restored["vars"]["token"], json!("hunter2"));
        assert_eq!(restored["vars"]["other"]["id"], json!("ref-2"));
    }

    #[test]
    fn absorb_keeps_configured_json_strings_when_equal() {
        let mut model = IntegrationPolicyState {
            policy_id: None,
            name: "nginx".to_string(),
            agent_policy_id: "p-1".to_string(),
            package_name: "nginx".to_string(),
            package_version: "1.0.0".to_string(),
            inputs: Some(r#"{"logfile": {"enabled": true}}"#.to_string()),
            vars: None,
        };
        let observed = PackagePolicy {
            id: Some("pp-1".to_string()),
            name: "nginx".to_string(),
            policy_id: "p-1".to_string(),
            package: PackageRef {
                name: "nginx".to_string(),
                version: "1.0.0".to_string(),
            },
            // Same document, different formatting.
            inputs: json!({"logfile": {"enabled": true}}),
            vars: None,
        };
        model.absorb(observed).unwrap();
        assert_eq!(
            model.inputs.as_deref(),
            Some(r#"{"logfile": {"enabled": true}}"#)
        );
        assert_eq!(model.policy_id.as_deref(), Some("pp-1"));
    }

    #[test]
    fn invalid_inputs_json_is_a_validation_error() {
        let model = IntegrationPolicyState {
            name: "nginx".to_string(),
            agent_policy_id: "p-1".to_string(),
            package_name: "nginx".to_string(),
            package_version: "1.0.0".to_string(),
            inputs: Some("{broken".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            model.to_api(true).unwrap_err(),
            ProviderError::Validation(_)
        ));
    }
}
