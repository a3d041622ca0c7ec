use serde::{Deserialize, Serialize};

use cauldron_core::agent::Agent;
use cauldron_core::types::{wants_langgraph, ContextVars};

/// Placeholder replaced with the previous step's output.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// One agent invocation in a linear workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub agent: Agent,
    #[serde(default = "default_input")]
    pub input: String,
    /// Describes the step's output. Never sent to the swarm.
    #[serde(default)]
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_input() -> String { INPUT_PLACEHOLDER.to_string() }

impl Step {
    /// A step that forwards its input unchanged.
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            input: default_input(),
            expected_output: String::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_input(mut self, template: impl Into<String>) -> Self {
        self.input = template.into();
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = expected.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Substitute `current` for the first `{input}` in the template.
    pub fn render(&self, current: &str) -> String {
        self.input.replacen(INPUT_PLACEHOLDER, current, 1)
    }
}

/// An ordered sequence of steps, each fed the previous step's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub context_variables: ContextVars,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context_variables.insert(key.into(), value);
        self
    }

    /// Whether the workflow's own defaults ask for graph execution.
    pub fn is_graph_backed(&self) -> bool {
        wants_langgraph(&self.context_variables)
    }
}
