//! Workflows, the canned factories that build them, the page-aware
//! assistant, and the engine that runs them against a swarm transport.

pub mod assistant;
pub mod engine;
pub mod factory;
pub mod graph;
pub mod workflow;

pub use assistant::{create_assistant_agent, Page};
pub use engine::{RunState, StepDefaults, SwarmEngine};
pub use factory::{
    create_branching_workflow, create_custom_workflow, create_linear_workflow,
    create_reasoning_workflow, create_research_graph, create_research_workflow,
    create_research_workflow_with_graph, create_workflow, create_workflow_with_graph,
};
pub use graph::GraphWorkflow;
pub use workflow::{Step, Workflow, INPUT_PLACEHOLDER};
