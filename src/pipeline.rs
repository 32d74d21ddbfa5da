//! Request pipeline: generate SQL, run it, explain the rows.

use crate::db::{DatabaseGateway, Record};
use crate::error::PipelineError;
use crate::llm::LanguageModel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, warn};

/// Body of a `/query` request. Any JSON is accepted; the input is checked
/// by [`QueryRequest::user_input`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "userInput", default)]
    pub user_input: Option<Value>,
}

impl QueryRequest {
    /// The question as text. Empty-ish values (null, false, 0, "", [] and {})
    /// count as missing; other non-string values are passed on as JSON text.
    pub fn user_input(&self) -> Option<Cow<'_, str>> {
        match self.user_input.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            Value::Array(items) if items.is_empty() => None,
            Value::Object(fields) if fields.is_empty() => None,
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

/// Successful `/query` response.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub data: Vec<Record>,
    pub enhanced_response: Option<String>,
}

#[derive(Clone)]
pub struct QueryPipeline {
    model: Arc<dyn LanguageModel>,
    gateway: Arc<dyn DatabaseGateway>,
}

impl QueryPipeline {
    pub fn new(model: Arc<dyn LanguageModel>, gateway: Arc<dyn DatabaseGateway>) -> Self {
        Self { model, gateway }
    }

    pub async fn run(&self, request: &QueryRequest) -> Result<QueryResponse, PipelineError> {
        let user_input = request.user_input().ok_or(PipelineError::MissingInput)?;

        let sql = self
            .model
            .generate_sql(&user_input)
            .await?
            .ok_or(PipelineError::GenerationFailed)?;
        info!("Generated SQL query:\n{}", sql);

        let data = self.gateway.execute(&sql).await?;
        info!("Query returned {} rows", data.len());

        // An explanation failure leaves the rows intact.
        let enhanced_response = match self.model.explain(&data).await {
            Ok(explanation) => explanation,
            Err(e) => {
                warn!("Failed to explain query results: {}", e);
                None
            }
        };

        Ok(QueryResponse {
            data,
            enhanced_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CellValue;
    use crate::error::{DbError, LlmError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeModel {
        sql: Option<String>,
        explain_calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn generate_sql(&self, _user_input: &str) -> Result<Option<String>, LlmError> {
            Ok(self.sql.clone())
        }

        async fn explain(&self, rows: &[Record]) -> Result<Option<String>, LlmError> {
            self.explain_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("{} users found", rows.len())))
        }
    }

    struct FakeGateway {
        result: Result<Vec<Record>, DbError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DatabaseGateway for FakeGateway {
        async fn execute(&self, _sql: &str) -> Result<Vec<Record>, DbError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn request(json: &str) -> QueryRequest {
        serde_json::from_str(json).unwrap()
    }

    fn user(id: i64) -> Record {
        let mut record = Record::new();
        record.push("id", CellValue::Integer(id));
        record.push("nombre", CellValue::Text(format!("user{}", id)));
        record
    }

    fn input_of(json: &str) -> Option<String> {
        request(json).user_input().map(|s| s.into_owned())
    }

    #[test]
    fn test_user_input_validation() {
        assert_eq!(input_of(r#"{"userInput":"hi"}"#).as_deref(), Some("hi"));
        assert_eq!(input_of(r#"{"userInput":"   "}"#).as_deref(), Some("   "));
        assert_eq!(input_of(r#"{"userInput":42}"#).as_deref(), Some("42"));
        assert_eq!(input_of(r#"{"userInput":true}"#).as_deref(), Some("true"));
        assert_eq!(input_of(r#"{"userInput":["a"]}"#).as_deref(), Some(r#"["a"]"#));

        for missing in [
            r#"{}"#,
            r#"{"userInput":null}"#,
            r#"{"userInput":""}"#,
            r#"{"userInput":false}"#,
            r#"{"userInput":0}"#,
            r#"{"userInput":0.0}"#,
            r#"{"userInput":[]}"#,
            r#"{"userInput":{}}"#,
        ] {
            assert_eq!(input_of(missing), None, "body: {}", missing);
        }
    }

    #[tokio::test]
    async fn test_successful_run() {
        let model = Arc::new(FakeModel {
            sql: Some("SELECT id, nombre FROM usuarios;".to_string()),
            explain_calls: AtomicUsize::new(0),
        });
        let gateway = Arc::new(FakeGateway {
            result: Ok(vec![user(1), user(2)]),
            calls: AtomicUsize::new(0),
        });
        let pipeline = QueryPipeline::new(model.clone(), gateway.clone());

        let response = pipeline.run(&request(r#"{"userInput":"all users"}"#)).await.unwrap();

        assert_eq!(response.data.len(), 2);
        assert_eq!(response.enhanced_response.as_deref(), Some("2 users found"));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.explain_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_input_skips_everything() {
        let model = Arc::new(FakeModel {
            sql: Some("SELECT 1;".to_string()),
            explain_calls: AtomicUsize::new(0),
        });
        let gateway = Arc::new(FakeGateway {
            result: Ok(vec![]),
            calls: AtomicUsize::new(0),
        });
        let pipeline = QueryPipeline::new(model, gateway.clone());

        let err = pipeline.run(&request("{}")).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_sql_skips_database() {
        let model = Arc::new(FakeModel {
            sql: None,
            explain_calls: AtomicUsize::new(0),
        });
        let gateway = Arc::new(FakeGateway {
            result: Ok(vec![user(1)]),
            calls: AtomicUsize::new(0),
        });
        let pipeline = QueryPipeline::new(model, gateway.clone());

        let err = pipeline.run(&request(r#"{"userInput":"x"}"#)).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed));
        assert_eq!(err.status_code(), 500);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_database_error_skips_explainer() {
        let model = Arc::new(FakeModel {
            sql: Some("DROP TABLE nope;".to_string()),
            explain_calls: AtomicUsize::new(0),
        });
        let db_error = DbError::Query("table \"nope\" does not exist".to_string());
        let gateway = Arc::new(FakeGateway {
            result: Err(db_error.clone()),
            calls: AtomicUsize::new(0),
        });
        let pipeline = QueryPipeline::new(model.clone(), gateway);

        let err = pipeline.run(&request(r#"{"userInput":"x"}"#)).await.unwrap_err();
        assert_eq!(err.to_string(), db_error.to_string());
        assert_eq!(model.explain_calls.load(Ordering::SeqCst), 0);
    }
}
