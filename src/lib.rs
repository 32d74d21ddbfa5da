pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod server;

pub use config::Config;
pub use error::{ChatbotError, Result};
pub use pipeline::{QueryPipeline, QueryRequest, QueryResponse};

use db::PgGateway;
use llm::LlmClient;
use std::sync::Arc;

/// Wires the OpenAI client and the PostgreSQL gateway into a pipeline.
pub fn build_pipeline(config: &Config) -> Result<QueryPipeline> {
    let llm = LlmClient::from_config(&config.llm)?;
    let gateway = PgGateway::from_config(&config.database);
    Ok(QueryPipeline::new(Arc::new(llm), Arc::new(gateway)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_build_pipeline_from_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert!(build_pipeline(&config).is_ok());
    }
}
