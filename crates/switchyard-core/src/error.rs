use thiserror::Error;

/// Failure surfaced by a node or by one of the collaborators it calls.
#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Model errors
    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model response parse error: {0}")]
    ModelParse(String),

    #[error("Model provider not supported: {0}")]
    UnsupportedProvider(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool input validation failed: {tool}: {message}")]
    ToolValidation { tool: String, message: String },

    // Feed errors
    #[error("Feed error: {0}")]
    Feed(String),

    // Node errors
    #[error("Node failed: {0}")]
    Node(String),

    #[error("Cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Shorthand for a node-local failure with a free-form message.
    pub fn node(message: impl Into<String>) -> Self {
        Self::Node(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
