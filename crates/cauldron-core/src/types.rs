use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form variables sent alongside every request of a run.
pub type ContextVars = serde_json::Map<String, serde_json::Value>;

/// Context flag that routes a linear workflow through the graph endpoint.
pub const USE_LANGGRAPH_KEY: &str = "useLanggraph";

/// Merge caller-supplied context over workflow defaults (caller wins).
pub fn merge_context(defaults: &ContextVars, overrides: &ContextVars) -> ContextVars {
    let mut merged = defaults.clone();
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Whether the context asks for graph-mode execution.
pub fn wants_langgraph(context: &ContextVars) -> bool {
    context
        .get(USE_LANGGRAPH_KEY)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Rendering tag carried by every message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Markdown,
    Code,
    Error,
}

/// Classify response content: anything with a code fence renders as markdown.
pub fn classify(content: &str) -> MessageType {
    if content.contains("```") {
        MessageType::Markdown
    } else {
        MessageType::Text
    }
}

/// The engine's output message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "isStreaming", default)]
    pub is_streaming: bool,
}

fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

impl Message {
    /// An assistant reply, typed by [`classify`].
    pub fn assistant(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: fresh_id("assistant"),
            role: Role::Assistant,
            kind: classify(&content),
            content,
            timestamp: Utc::now(),
            is_streaming: false,
        }
    }

    /// The result of a workflow that ran no steps.
    pub fn empty_workflow() -> Self {
        Self {
            id: fresh_id("workflow"),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            kind: MessageType::Text,
            is_streaming: false,
        }
    }

    /// Placeholder for a reply that is still being streamed.
    pub fn streaming() -> Self {
        Self {
            id: fresh_id("assistant"),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            kind: MessageType::Text,
            is_streaming: true,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            id: fresh_id("error"),
            role: Role::Assistant,
            content: text.into(),
            timestamp: Utc::now(),
            kind: MessageType::Error,
            is_streaming: false,
        }
    }

    /// Whether this message carries the error tag.
    pub fn is_error(&self) -> bool {
        self.kind == MessageType::Error
    }
}

/// Event forwarded to a streaming caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start,
    /// The remote side moved to another graph node.
    NodeTransition {
        node: serde_json::Value,
        node_id: Option<String>,
    },
    /// A text delta plus everything received so far.
    Content {
        delta: String,
        accumulated: String,
        node_id: Option<String>,
    },
    ToolCalls {
        tool_calls: serde_json::Value,
        node_id: Option<String>,
    },
    End,
}
