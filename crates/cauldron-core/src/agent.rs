use serde::{Deserialize, Serialize};

/// Model identifiers served by Groq.
pub mod models {
    pub const LLAMA3_8B: &str = "llama3-8b-8192";
    pub const LLAMA3_70B: &str = "llama3-70b-8192";
    pub const GEMMA2_9B: &str = "gemma2-9b-it";
    pub const MIXTRAL: &str = "mixtral-8x7b-32768";
    pub const QWEN: &str = "qwen-qwq-32b";
    pub const DEEPSEEK: &str = "deepseek-r1-distill-llama-70b";

    /// Model used when an agent does not name one.
    pub const DEFAULT: &str = LLAMA3_70B;
}

/// A named role the swarm runs: system prompt, model and callable functions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub name: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<SwarmFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: None,
            functions: vec![],
            tool_choice: None,
            parallel_tool_calls: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_function(mut self, function: SwarmFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = Some(parallel);
        self
    }

    /// Copy of this agent with `model` filled in when unset.
    pub fn or_model(&self, model: &str) -> Self {
        let mut agent = self.clone();
        if agent.model.as_deref().map_or(true, str::is_empty) {
            agent.model = Some(model.to_string());
        }
        agent
    }
}

/// A function declaration the agent may call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmFunction {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

/// JSON-Schema style parameter block of a [`SwarmFunction`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionParameters {
    #[serde(rename = "type", default = "default_parameters_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn default_parameters_type() -> String {
    "object".to_string()
}

impl Default for FunctionParameters {
    fn default() -> Self {
        Self {
            kind: default_parameters_type(),
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }
}

/// Tool-choice policy: a named mode (`"auto"`, `"none"`, …) or a raw object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Object(serde_json::Map<String, serde_json::Value>),
}
