use crate::config::LlmConfig;
use crate::db::Record;
use crate::error::LlmError;
use crate::prompts;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SQL_MAX_TOKENS: u32 = 100;
const EXPLANATION_MAX_TOKENS: u32 = 200;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?i)```(?:sql)?").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// The two language-model operations a `/query` request needs.
///
/// `Ok(None)` means the provider answered but gave nothing usable
/// (non-success status, or an empty reply).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Turns a natural-language request into a SQL string.
    async fn generate_sql(&self, user_input: &str) -> Result<Option<String>, LlmError>;

    /// Summarises query rows in natural language.
    async fn explain(&self, rows: &[Record]) -> Result<Option<String>, LlmError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    /// Sends one chat completion and returns the first choice's content.
    pub async fn chat(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("No content in LLM response".to_string()))
    }

    /// Like [`chat`](Self::chat), but a non-success status becomes `Ok(None)`.
    async fn chat_or_none(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Option<String>, LlmError> {
        match self.chat(messages, max_tokens).await {
            Ok(content) => Ok(Some(content)),
            Err(LlmError::Status { status, body }) => {
                warn!("LLM API error (status {}): {}", status, body);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate_sql(&self, user_input: &str) -> Result<Option<String>, LlmError> {
        let messages = [
            ChatMessage::system(prompts::sql_generation_system_prompt()),
            ChatMessage::user(prompts::sql_generation_user_prompt(user_input)),
        ];

        let reply = self.chat_or_none(&messages, SQL_MAX_TOKENS).await?;
        Ok(reply
            .map(|content| strip_code_fences(&content))
            .filter(|sql| !sql.is_empty()))
    }

    async fn explain(&self, rows: &[Record]) -> Result<Option<String>, LlmError> {
        let rows_json =
            serde_json::to_string(rows).map_err(|e| LlmError::Serialization(e.to_string()))?;
        debug!("Explaining {} rows", rows.len());

        let messages = [
            ChatMessage::system(prompts::EXPLANATION_SYSTEM_PROMPT),
            ChatMessage::user(prompts::explanation_user_prompt(&rows_json)),
        ];

        self.chat_or_none(&messages, EXPLANATION_MAX_TOKENS).await
    }
}

/// Removes markdown code-fence markers and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text.trim(), "").trim().to_string()
}
