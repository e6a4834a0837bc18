//! Hemmer provider for the Elastic stack.
//!
//! Exposes CRUD resources and data sources for an Elasticsearch search/index
//! engine, a Kibana dashboarding/alerting control plane, and a Fleet
//! agent-management service over their HTTPS/JSON REST APIs.
//!
//! # Resources
//!
//! - `elasticstack_elasticsearch_index`: indices with settings/mappings
//!   drift reconciliation
//! - `elasticstack_elasticsearch_index_lifecycle`: ILM policies
//! - `elasticstack_kibana_space`: Kibana spaces
//! - `elasticstack_kibana_alerting_rule`: alerting rules
//! - `elasticstack_fleet_agent_policy`: Fleet agent policies
//! - `elasticstack_fleet_integration_policy`: Fleet integration policies with
//!   secret-reference handling
//!
//! # Data sources
//!
//! - `elasticstack_elasticsearch_index`
//! - `elasticstack_kibana_space`
//! - `elasticstack_fleet_enrollment_tokens`
//!
//! # Configuration
//!
//! Each service gets an `elasticsearch`, `kibana` or `fleet` block with
//! `endpoint`, `username`, `password`, `api_key` and `insecure` attributes.
//! The matching `ELASTICSEARCH_*`, `KIBANA_*` and `FLEET_*` environment
//! variables take precedence over block values. Kibana and Fleet fall back to
//! the Elasticsearch credentials when they have none of their own.
//!
//! # Handshake protocol
//!
//! When started via [`serve`], the provider binds a local port and prints a
//! handshake line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! The host connects to that address and exchanges line-delimited JSON
//! request/response frames; see [`protocol`].

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod util;
pub mod validation;

pub mod elasticsearch;
pub mod fleet;
pub mod kibana;

// Re-export main types at crate root
pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging};
pub use provider::{DataSourceHandler, ElasticstackProvider, ResourceHandler};
pub use schema::ProviderSchema;
pub use server::{serve, serve_on, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
