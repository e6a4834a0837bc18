//! Elasticsearch resources: indices and ILM policies.

pub mod ilm;
pub mod index;
