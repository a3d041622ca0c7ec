use serde::{Deserialize, Serialize};

use cauldron_core::error::Result;
use cauldron_core::graph::{GraphNode, WorkflowGraph};
use cauldron_core::wire::GraphPayload;

use crate::workflow::{Step, Workflow};

/// A linear workflow paired with the graph the swarm traverses.
///
/// The steps mirror the nodes, so the same value can also run linearly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphWorkflow {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub graph: WorkflowGraph,
}

impl GraphWorkflow {
    pub fn new(workflow: Workflow, graph: WorkflowGraph) -> Self {
        Self { workflow, graph }
    }

    pub fn name(&self) -> &str {
        &self.workflow.name
    }

    /// Parse a workflow document, deriving steps from nodes when none are given.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut parsed: GraphWorkflow = serde_json::from_str(json)?;
        if parsed.workflow.steps.is_empty() {
            parsed.workflow.steps = steps_for_nodes(&parsed.graph.nodes);
        }
        Ok(parsed)
    }

    /// Structural check run before anything is sent.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()
    }

    /// The `workflow` block of a graph request.
    pub fn payload(&self) -> GraphPayload {
        GraphPayload {
            name: self.workflow.name.clone(),
            description: self.workflow.description.clone(),
            graph: self.graph.clone(),
        }
    }
}

/// One pass-through step per node, documented by the node description.
pub fn steps_for_nodes(nodes: &[GraphNode]) -> Vec<Step> {
    nodes
        .iter()
        .map(|node| Step::new(node.agent.clone()).with_expected_output(node.description.clone()))
        .collect()
}
