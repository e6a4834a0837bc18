//! Elasticsearch API client: indices and ILM policies.

use serde_json::{json, Value};

use super::HttpClient;
use crate::config::ServiceSettings;
use crate::error::ProviderError;

/// Client for the Elasticsearch REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    http: HttpClient,
}

impl ElasticsearchClient {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpClient::elasticsearch(settings)?,
        })
    }

    /// `PUT /{index}` with optional settings and mappings.
    pub async fn create_index(&self, name: &str, body: &Value) -> Result<(), ProviderError> {
        self.http.put_json(&format!("/{name}"), body).await?;
        Ok(())
    }

    /// `GET /{index}`. The API keys the response by index name; this returns
    /// the inner definition (settings, mappings, aliases) or `None` when the
    /// index does not exist.
    pub async fn get_index(&self, name: &str) -> Result<Option<Value>, ProviderError> {
        let response = self.http.get_json(&format!("/{name}")).await?;
        Ok(response.and_then(|mut body| {
            body.as_object_mut().and_then(|map| map.remove(name))
        }))
    }

    pub async fn delete_index(&self, name: &str) -> Result<(), ProviderError> {
        self.http.delete(&format!("/{name}")).await
    }

    /// `PUT /{index}/_settings` with the dynamic settings to change.
    pub async fn put_settings(&self, name: &str, settings: &Value) -> Result<(), ProviderError> {
        self.http
            .put_json(&format!("/{name}/_settings"), settings)
            .await?;
        Ok(())
    }

    /// `PUT /{index}/_mapping` with new or updated mapping properties.
    pub async fn put_mapping(&self, name: &str, mappings: &Value) -> Result<(), ProviderError> {
        self.http
            .put_json(&format!("/{name}/_mapping"), mappings)
            .await?;
        Ok(())
    }

    /// `PUT /_ilm/policy/{name}`. The API wraps the phases in a `policy`
    /// envelope.
    pub async fn put_ilm_policy(&self, name: &str, policy: &Value) -> Result<(), ProviderError> {
        self.http
            .put_json(&format!("/_ilm/policy/{name}"), &json!({ "policy": policy }))
            .await?;
        Ok(())
    }

    /// `GET /_ilm/policy/{name}`, unwrapping the name key and `policy`
    /// envelope from the response.
    pub async fn get_ilm_policy(&self, name: &str) -> Result<Option<Value>, ProviderError> {
        let response = self.http.get_json(&format!("/_ilm/policy/{name}")).await?;
        Ok(response.and_then(|mut body| {
            body.as_object_mut()
                .and_then(|map| map.remove(name))
                .and_then(|mut entry| {
                    entry.as_object_mut().and_then(|map| map.remove("policy"))
                })
        }))
    }

    pub async fn delete_ilm_policy(&self, name: &str) -> Result<(), ProviderError> {
        self.http.delete(&format!("/_ilm/policy/{name}")).await
    }
}
