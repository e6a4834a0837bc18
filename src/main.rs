//! Provider plugin entry point.
//!
//! Logs go to stderr; stdout carries only the handshake line.

use hemmer_provider_elasticstack::{init_logging, serve, ElasticstackProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    serve(ElasticstackProvider::new()).await
}
