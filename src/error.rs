use thiserror::Error;

/// Failures talking to the chat-completion provider.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API call failed: {0}")]
    Transport(String),

    #[error("LLM API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("Failed to serialize LLM request: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Failures reported by the database gateway. The display text is what
/// the caller sees in the `error` field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("could not connect to the database: {0}")]
    Connect(String),

    #[error("database error: {0}")]
    Query(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Outcome of a failed `/query` request, one variant per error category.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing parameter")]
    MissingInput,

    #[error("invalid JSON body")]
    InvalidBody,

    #[error("could not generate the SQL query")]
    GenerationFailed,

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("general error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::MissingInput | PipelineError::InvalidBody => 400,
            PipelineError::GenerationFailed
            | PipelineError::Database(_)
            | PipelineError::Unexpected(_) => 500,
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        PipelineError::Unexpected(err.to_string())
    }
}

/// Startup and serving failures surfaced to `main`.
#[derive(Error, Debug)]
pub enum ChatbotError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatbotError>;
