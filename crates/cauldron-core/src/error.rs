use thiserror::Error;

use crate::types::Message;

/// Shown for any transport-level failure of a workflow run.
pub const WORKFLOW_ERROR_TEXT: &str =
    "Sorry, I encountered an error executing the workflow. Please try again.";

/// Shown when the swarm answered but no assistant message was present.
pub const NO_RESPONSE_TEXT: &str = "No response received from the assistant.";

/// Shown for any transport-level failure of a single assistant message.
pub const MESSAGE_ERROR_TEXT: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// Shown when a run was cancelled through its cancellation token.
pub const CANCELLED_TEXT: &str = "The workflow was cancelled.";

#[derive(Debug, Error)]
pub enum SwarmError {
    // Transport errors
    #[error("Swarm request failed: {0}")]
    Request(String),

    #[error("Swarm API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Swarm response parse error: {0}")]
    Parse(String),

    #[error("No assistant message in swarm response")]
    EmptyResponse,

    // Workflow errors
    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Workflow timed out after {0}s")]
    TimedOut(u64),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwarmError {
    /// Whether a retry of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SwarmError::Request(_) => true,
            SwarmError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Text shown to the user when this error ends a workflow run.
    pub fn user_text(&self) -> String {
        self.user_text_or(WORKFLOW_ERROR_TEXT)
    }

    /// Like [`user_text`](Self::user_text), with `apology` standing in for
    /// transport failures.
    pub fn user_text_or(&self, apology: &str) -> String {
        match self {
            SwarmError::EmptyResponse => NO_RESPONSE_TEXT.to_string(),
            SwarmError::Cancelled => CANCELLED_TEXT.to_string(),
            SwarmError::TimedOut(secs) => {
                format!("The workflow timed out after {} seconds.", secs)
            }
            SwarmError::InvalidGraph(reason) => {
                format!("The workflow graph is invalid: {}", reason)
            }
            _ => apology.to_string(),
        }
    }

    /// Convert into the uniform error message returned by the engine.
    pub fn into_message(self) -> Message {
        Message::error(self.user_text())
    }
}

impl From<SwarmError> for Message {
    fn from(err: SwarmError) -> Self {
        err.into_message()
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
