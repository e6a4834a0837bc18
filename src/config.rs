//! Provider configuration: block attributes plus environment overrides.
//!
//! Each of the three services gets its own settings block. Environment
//! variables (`ELASTICSEARCH_*`, `KIBANA_*`, `FLEET_*`) take precedence over
//! block values, so credentials can stay out of checked-in configuration.
//! Kibana and Fleet fall back to the Elasticsearch credentials when they have
//! none of their own.

use serde::Deserialize;
use serde_json::Value;

/// Connection settings for one remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceSettings {
    /// Base URL of the service API.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Basic-auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// API key, used instead of basic auth when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,
}

impl ServiceSettings {
    fn from_block(value: Option<&Value>) -> Self {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn apply_env(&mut self, prefix: &str, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(endpoint) = env(&format!("{prefix}_ENDPOINT")) {
            self.endpoint = Some(endpoint);
        }
        if let Some(username) = env(&format!("{prefix}_USERNAME")) {
            self.username = Some(username);
        }
        if let Some(password) = env(&format!("{prefix}_PASSWORD")) {
            self.password = Some(password);
        }
        if let Some(api_key) = env(&format!("{prefix}_API_KEY")) {
            self.api_key = Some(api_key);
        }
        if let Some(insecure) = env(&format!("{prefix}_INSECURE")) {
            self.insecure = matches!(insecure.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    fn inherit_credentials(&mut self, from: &ServiceSettings) {
        let has_own = self.username.is_some() || self.password.is_some() || self.api_key.is_some();
        if !has_own {
            self.username = from.username.clone();
            self.password = from.password.clone();
            self.api_key = from.api_key.clone();
        }
    }

    /// True when an endpoint is configured.
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

/// Resolved configuration for all three services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Elasticsearch connection settings.
    pub elasticsearch: ServiceSettings,
    /// Kibana connection settings.
    pub kibana: ServiceSettings,
    /// Fleet connection settings.
    pub fleet: ServiceSettings,
}

impl ProviderConfig {
    /// Resolve from the provider configuration block and the process
    /// environment.
    pub fn resolve(config: &Value) -> Self {
        Self::resolve_with(config, &|name| std::env::var(name).ok())
    }

    /// Resolve with an injected environment lookup. Environment values win
    /// over block values.
    pub fn resolve_with(config: &Value, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let mut elasticsearch = ServiceSettings::from_block(config.get("elasticsearch"));
        let mut kibana = ServiceSettings::from_block(config.get("kibana"));
        let mut fleet = ServiceSettings::from_block(config.get("fleet"));

        elasticsearch.apply_env("ELASTICSEARCH", env);
        kibana.apply_env("KIBANA", env);
        fleet.apply_env("FLEET", env);

        kibana.inherit_credentials(&elasticsearch);
        fleet.inherit_credentials(&elasticsearch);

        Self {
            elasticsearch,
            kibana,
            fleet,
        }
    }
}
