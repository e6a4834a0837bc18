//! HTTP clients for the Elasticsearch, Kibana and Fleet APIs.

pub mod elasticsearch;
pub mod fleet;
pub mod kibana;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::ServiceSettings;
use crate::error::ProviderError;

pub use elasticsearch::ElasticsearchClient;
pub use fleet::FleetClient;
pub use kibana::KibanaClient;

/// Authentication scheme derived from service settings. An API key takes
/// precedence over basic credentials when both are present.
#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
}

impl Auth {
    fn from_settings(settings: &ServiceSettings) -> Self {
        if let Some(key) = &settings.api_key {
            return Auth::ApiKey(key.clone());
        }
        match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Auth::None,
        }
    }

    fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Basic { username, password } => {
                let encoded = BASE64.encode(format!("{username}:{password}"));
                Some(format!("Basic {encoded}"))
            }
            Auth::ApiKey(key) => Some(format!("ApiKey {key}")),
        }
    }
}

/// Thin wrapper over `reqwest` shared by the three service clients.
///
/// Kibana and Fleet require the `kbn-xsrf` header on mutating requests;
/// sending it unconditionally is harmless, so `xsrf` clients attach it to
/// every request.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: Option<String>,
    xsrf: bool,
}

impl HttpClient {
    /// Build a client for the Elasticsearch API.
    pub fn elasticsearch(settings: &ServiceSettings) -> Result<Self, ProviderError> {
        Self::build(settings, false)
    }

    /// Build a client for a Kibana-hosted API (Kibana itself or Fleet).
    pub fn kibana(settings: &ServiceSettings) -> Result<Self, ProviderError> {
        Self::build(settings, true)
    }

    fn build(settings: &ServiceSettings, xsrf: bool) -> Result<Self, ProviderError> {
        let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
            ProviderError::Configuration("service endpoint is not set".to_string())
        })?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.insecure)
            .build()?;
        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            auth_header: Auth::from_settings(settings).header_value(),
            xsrf,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "sending request");

        let mut request = self.http.request(method, &url);
        if let Some(header) = &self.auth_header {
            request = request.header("Authorization", header);
        }
        if self.xsrf {
            request = request.header("kbn-xsrf", "true");
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn expect_success(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }

    /// GET returning the response body, or `None` when the resource does not
    /// exist.
    pub async fn get_json(&self, path: &str) -> Result<Option<Value>, ProviderError> {
        let response = self.send(Method::GET, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response).await?;
        Ok(Some(response.json().await?))
    }

    /// PUT with a JSON body, returning the response body.
    pub async fn put_json(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    /// POST with a JSON body, returning the response body.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    /// POST without a body, ignoring the response payload.
    pub async fn post_empty(&self, path: &str) -> Result<(), ProviderError> {
        let response = self.send(Method::POST, path, None).await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// DELETE. A 404 counts as success: the resource is already gone.
    pub async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let response = self.send(Method::DELETE, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "resource already absent on delete");
            return Ok(());
        }
        Self::expect_success(response).await?;
        Ok(())
    }
}

/// Configured service clients, built once during provider configuration.
/// Each service is optional; resources error out when the service they need
/// was never configured.
#[derive(Debug, Default)]
pub struct Clients {
    pub elasticsearch: Option<ElasticsearchClient>,
    pub kibana: Option<KibanaClient>,
    pub fleet: Option<FleetClient>,
}

impl Clients {
    pub fn elasticsearch(&self) -> Result<&ElasticsearchClient, ProviderError> {
        self.elasticsearch.as_ref().ok_or_else(|| {
            ProviderError::Configuration(
                "the elasticsearch endpoint is not configured".to_string(),
            )
        })
    }

    pub fn kibana(&self) -> Result<&KibanaClient, ProviderError> {
        self.kibana.as_ref().ok_or_else(|| {
            ProviderError::Configuration("the kibana endpoint is not configured".to_string())
        })
    }

    pub fn fleet(&self) -> Result<&FleetClient, ProviderError> {
        self.fleet.as_ref().ok_or_else(|| {
            ProviderError::Configuration("the fleet endpoint is not configured".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: Option<&str>, username: Option<&str>) -> ServiceSettings {
        ServiceSettings {
            endpoint: Some("https://example:9200/".to_string()),
            username: username.map(str::to_string),
            password: username.map(|_| "secret".to_string()),
            api_key: api_key.map(str::to_string),
            insecure: false,
        }
    }

    #[test]
    fn api_key_takes_precedence_over_basic_auth() {
        let auth = Auth::from_settings(&settings(Some("abc123"), Some("elastic")));
        assert_eq!(auth.header_value().as_deref(), Some("ApiKey abc123"));
    }

    #[test]
    fn basic_auth_header_is_base64_encoded() {
        let auth = Auth::from_settings(&settings(None, Some("elastic")));
        // base64("elastic:secret")
        assert_eq!(
            auth.header_value().as_deref(),
            Some("Basic ZWxhc3RpYzpzZWNyZXQ=")
        );
    }

    #[test]
    fn no_credentials_means_no_header() {
        let auth = Auth::from_settings(&settings(None, None));
        assert!(auth.header_value().is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = HttpClient::elasticsearch(&settings(None, None)).unwrap();
        assert_eq!(client.base_url, "https://example:9200");
    }

    #[test]
    fn missing_endpoint_is_a_configuration_error() {
        let err = HttpClient::elasticsearch(&ServiceSettings::default()).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn unconfigured_clients_error_on_access() {
        let clients = Clients::default();
        assert!(matches!(
            clients.elasticsearch().unwrap_err(),
            ProviderError::Configuration(_)
        ));
        assert!(matches!(
            clients.fleet().unwrap_err(),
            ProviderError::Configuration(_)
        ));
    }
}
