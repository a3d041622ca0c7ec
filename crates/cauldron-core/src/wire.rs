//! JSON shapes exchanged with the swarm endpoints.

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::{Result, SwarmError};
use crate::graph::WorkflowGraph;
use crate::types::{ContextVars, Message};

/// A message as the swarm sends and receives it.
///
/// Roles are kept as strings because the swarm also returns `tool` and
/// `function` turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// One agent invocation against the swarm endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub messages: Vec<WireMessage>,
    pub context_variables: ContextVars,
    pub agent: Agent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

/// The workflow block of a graph request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphPayload {
    pub name: String,
    pub description: String,
    pub graph: WorkflowGraph,
}

/// A whole graph run delegated to the langgraph endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRequest {
    pub workflow: GraphPayload,
    pub input: String,
    pub messages: Vec<WireMessage>,
    pub context_variables: ContextVars,
    pub stream: bool,
}

/// Either request kind; the transport routes on the variant.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SwarmRequest {
    Agent(AgentRequest),
    Graph(GraphRequest),
}

impl SwarmRequest {
    pub fn is_stream(&self) -> bool {
        match self {
            SwarmRequest::Agent(r) => r.stream,
            SwarmRequest::Graph(r) => r.stream,
        }
    }

    /// Same request with the `stream` flag set.
    pub fn streaming(mut self, stream: bool) -> Self {
        match &mut self {
            SwarmRequest::Agent(r) => r.stream = stream,
            SwarmRequest::Graph(r) => r.stream = stream,
        }
        self
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SwarmRequest::Agent(_) => "agent",
            SwarmRequest::Graph(_) => "graph",
        }
    }
}

/// Buffered swarm response. Missing fields default so partial bodies parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwarmResponse {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub agent: Option<Agent>,
    #[serde(default)]
    pub context_variables: ContextVars,
}

impl SwarmResponse {
    /// A response holding a single assistant turn.
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            messages: vec![WireMessage::assistant(content)],
            ..Default::default()
        }
    }

    /// Wrap the last assistant turn in a fresh [`Message`].
    pub fn last_assistant_message(&self) -> Result<Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| Message::assistant(m.content.clone().unwrap_or_default()))
            .ok_or(SwarmError::EmptyResponse)
    }
}

/// One decoded piece of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Start,
    End,
    NodeTransition {
        node: serde_json::Value,
        node_id: Option<String>,
    },
    Content {
        text: String,
        node_id: Option<String>,
    },
    ToolCalls {
        tool_calls: serde_json::Value,
        node_id: Option<String>,
    },
    /// Final response; ends the stream.
    Response(SwarmResponse),
}
