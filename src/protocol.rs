//! Wire messages for the plugin protocol.
//!
//! The host connects to the address announced in the handshake and exchanges
//! line-delimited JSON frames: one request per line, one response per line,
//! correlated by `id`. The method catalog mirrors the provider protocol
//! (GetMetadata, GetSchema, Validate*, Configure, Stop, UpgradeResourceState,
//! Plan, Create/Read/Update/Delete, ImportResourceState, ReadDataSource).
//!
//! Transport failures aside, every response carries its outcome in-band as
//! `diagnostics`; a lifecycle failure never tears down the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::types::{AttributeChange, ServerCapabilities};
use std::collections::HashMap;

/// One request line sent by the plugin host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id echoed back in the response frame.
    pub id: u64,
    /// The RPC being invoked.
    #[serde(flatten)]
    pub call: Call,
}

/// One response line written by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Correlation id of the request this answers.
    pub id: u64,
    /// The RPC-specific response payload.
    pub result: Value,
}

/// The provider RPC catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    /// Resource/data-source names and capabilities.
    GetMetadata,
    /// Full provider, resource, and data source schemas.
    GetSchema,
    /// Validate the provider configuration block.
    ValidateProviderConfig {
        /// The provider configuration.
        config: Value,
    },
    /// Configure the provider with credentials and endpoints.
    Configure {
        /// The provider configuration.
        config: Value,
    },
    /// Graceful shutdown.
    Stop,
    /// Validate a resource configuration.
    ValidateResourceConfig {
        /// The resource type name.
        resource_type: String,
        /// The resource configuration.
        config: Value,
    },
    /// Migrate state written by an older schema version.
    UpgradeResourceState {
        /// The resource type name.
        resource_type: String,
        /// The schema version the state was written with.
        version: i64,
        /// The raw prior state.
        state: Value,
    },
    /// Compute the changes an apply would make.
    Plan {
        /// The resource type name.
        resource_type: String,
        /// Prior state, absent on create.
        #[serde(default)]
        prior_state: Option<Value>,
        /// The state proposed by the host.
        proposed_state: Value,
        /// The resource configuration.
        config: Value,
    },
    /// Create a new resource.
    Create {
        /// The resource type name.
        resource_type: String,
        /// The state produced by plan.
        planned_state: Value,
    },
    /// Refresh the state of an existing resource.
    Read {
        /// The resource type name.
        resource_type: String,
        /// The state currently recorded by the host.
        current_state: Value,
    },
    /// Update an existing resource in place.
    Update {
        /// The resource type name.
        resource_type: String,
        /// The state before the update.
        prior_state: Value,
        /// The state produced by plan.
        planned_state: Value,
    },
    /// Delete a resource.
    Delete {
        /// The resource type name.
        resource_type: String,
        /// The state currently recorded by the host.
        current_state: Value,
    },
    /// Bring existing infrastructure under management.
    ImportResourceState {
        /// The resource type name.
        resource_type: String,
        /// The remote identifier to import.
        id: String,
    },
    /// Validate a data source configuration.
    ValidateDataSourceConfig {
        /// The data source type name.
        data_source_type: String,
        /// The data source configuration.
        config: Value,
    },
    /// Read a data source.
    ReadDataSource {
        /// The data source type name.
        data_source_type: String,
        /// The data source configuration.
        config: Value,
    },
}

impl Call {
    /// The method name, as logged for each dispatched frame.
    pub fn method(&self) -> &'static str {
        match self {
            Call::GetMetadata => "get_metadata",
            Call::GetSchema => "get_schema",
            Call::ValidateProviderConfig { .. } => "validate_provider_config",
            Call::Configure { .. } => "configure",
            Call::Stop => "stop",
            Call::ValidateResourceConfig { .. } => "validate_resource_config",
            Call::UpgradeResourceState { .. } => "upgrade_resource_state",
            Call::Plan { .. } => "plan",
            Call::Create { .. } => "create",
            Call::Read { .. } => "read",
            Call::Update { .. } => "update",
            Call::Delete { .. } => "delete",
            Call::ImportResourceState { .. } => "import_resource_state",
            Call::ValidateDataSourceConfig { .. } => "validate_data_source_config",
            Call::ReadDataSource { .. } => "read_data_source",
        }
    }
}

/// Response to `GetMetadata`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetMetadataResponse {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Data source type names.
    pub data_sources: Vec<String>,
    /// Server capability flags.
    pub server_capabilities: ServerCapabilities,
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response to `GetSchema`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetSchemaResponse {
    /// Schema of the provider configuration block.
    pub provider: Schema,
    /// Schemas keyed by resource type name.
    pub resources: HashMap<String, Schema>,
    /// Schemas keyed by data source type name.
    pub data_sources: HashMap<String, Schema>,
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

impl From<ProviderSchema> for GetSchemaResponse {
    fn from(schema: ProviderSchema) -> Self {
        Self {
            provider: schema.provider,
            resources: schema.resources,
            data_sources: schema.data_sources,
            diagnostics: Vec::new(),
        }
    }
}

/// Response carrying only diagnostics (validate and configure RPCs).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiagnosticsResponse {
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response to `Stop`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StopResponse {
    /// Non-empty when shutdown failed.
    pub error: String,
}

/// Response to `UpgradeResourceState`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpgradeResourceStateResponse {
    /// State rewritten for the current schema version.
    pub upgraded_state: Value,
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response to `Plan`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanResponse {
    /// The state the apply is expected to converge on.
    pub planned_state: Value,
    /// The attribute changes between prior and planned state.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource must be destroyed and recreated.
    pub requires_replace: bool,
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response to `Create`, `Read`, `Update`, and `ReadDataSource`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateResponse {
    /// The resulting state. Null from `Read` means the resource is gone.
    pub state: Value,
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response to `ImportResourceState`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportResourceStateResponse {
    /// The imported resources.
    pub imported: Vec<crate::types::ImportedResource>,
    /// Diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frame_round_trip() {
        let line = r#"{"id":7,"method":"read","params":{"resource_type":"elasticstack_kibana_space","current_state":{"space_id":"eng"}}}"#;
        let frame: RequestFrame = serde_json::from_str(line).unwrap();
        assert_eq!(frame.id, 7);
        match &frame.call {
            Call::Read {
                resource_type,
                current_state,
            } => {
                assert_eq!(resource_type, "elasticstack_kibana_space");
                assert_eq!(current_state["space_id"], "eng");
            }
            other => panic!("unexpected call: {other:?}"),
        }

        let encoded = serde_json::to_string(&frame).unwrap();
        let back: RequestFrame = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back.call.method(), "read");
    }

    #[test]
    fn unit_methods_need_no_params() {
        let frame: RequestFrame =
            serde_json::from_str(r#"{"id":1,"method":"get_metadata"}"#).unwrap();
        assert!(matches!(frame.call, Call::GetMetadata));

        let frame: RequestFrame = serde_json::from_str(r#"{"id":2,"method":"stop"}"#).unwrap();
        assert!(matches!(frame.call, Call::Stop));
    }

    #[test]
    fn plan_prior_state_defaults_to_none() {
        let line = r#"{"id":3,"method":"plan","params":{"resource_type":"t","proposed_state":{},"config":{}}}"#;
        let frame: RequestFrame = serde_json::from_str(line).unwrap();
        match frame.call {
            Call::Plan { prior_state, .. } => assert!(prior_state.is_none()),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result =
            serde_json::from_str::<RequestFrame>(r#"{"id":4,"method":"explode","params":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn response_frame_serializes_result_payload() {
        let frame = ResponseFrame {
            id: 9,
            result: serde_json::to_value(StateResponse {
                state: json!({"id": "idx-1"}),
                diagnostics: vec![],
            })
            .unwrap(),
        };
        let line = serde_json::to_string(&frame).unwrap();
        assert!(line.contains("\"id\":9"));
        assert!(line.contains("\"idx-1\""));
    }
}
