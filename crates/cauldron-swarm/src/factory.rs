//! Canned workflows and the constructors they are built from.
//!
//! Every canned agent runs on [`models::DEFAULT`] and forwards its input
//! unchanged (`"{input}"`); only the instructions mention the task.

use serde_json::Value;

use cauldron_core::agent::{models, Agent};
use cauldron_core::graph::{GraphEdge, GraphNode, WorkflowGraph};
use cauldron_core::types::{ContextVars, USE_LANGGRAPH_KEY};

use crate::graph::{steps_for_nodes, GraphWorkflow};
use crate::workflow::{Step, Workflow};

fn canned_agent(name: &str, instructions: String) -> Agent {
    Agent::new(name, instructions).with_model(models::DEFAULT)
}

/// Plan, execute, review.
pub fn create_workflow(name: &str, description: &str, task: &str) -> Workflow {
    let planner = canned_agent(
        "Planner",
        format!(
            "You are a planning agent. Your job is to analyze the user's request and create a \
             detailed plan for how to accomplish it. Break down complex tasks into smaller steps.\n\
             \n\
             Current task: {task}\n\
             \n\
             Your output should be a markdown-formatted plan with:\n\
             1. A clear understanding of what the user is asking for\n\
             2. A step-by-step breakdown of how to accomplish it\n\
             3. Any clarifying questions that might be needed\n\
             4. Identification of potential challenges"
        ),
    );
    let executor = canned_agent(
        "Executor",
        "You are an execution agent. Your job is to carry out the plan provided to you and \
         generate the requested content or solution.\n\
         \n\
         The plan you need to execute is:\n\
         \n\
         {input}\n\
         \n\
         Follow the plan step by step and generate the requested output. Be thorough and \
         detailed in your work."
            .to_string(),
    );
    let reviewer = canned_agent(
        "Reviewer",
        format!(
            "You are a review agent. Your job is to review the output provided and ensure it \
             meets the user's requirements. Provide a final, polished response.\n\
             \n\
             The output to review is:\n\
             \n\
             {{input}}\n\
             \n\
             {}",
            REVIEW_CRITERIA
        ),
    );

    Workflow::new(name, description)
        .with_step(
            Step::new(planner)
                .with_expected_output("A detailed plan for accomplishing the task")
                .with_temperature(0.3),
        )
        .with_step(
            Step::new(executor)
                .with_expected_output("The executed result of the plan")
                .with_temperature(0.7),
        )
        .with_step(
            Step::new(reviewer)
                .with_expected_output("A final, polished response")
                .with_temperature(0.3),
        )
}

const REVIEW_CRITERIA: &str = "Evaluate this output for:\n\
    1. Completeness - Does it fully address the user's request?\n\
    2. Accuracy - Is the information correct?\n\
    3. Clarity - Is it easy to understand?\n\
    4. Formatting - Is it well-structured and properly formatted?\n\
    \n\
    Provide a final, polished response that addresses any issues you find.";

/// Wrap caller-built steps. Zero steps is allowed.
pub fn create_custom_workflow(
    name: &str,
    description: &str,
    steps: Vec<Step>,
    context_variables: ContextVars,
) -> Workflow {
    Workflow {
        name: name.to_string(),
        description: description.to_string(),
        steps,
        context_variables,
    }
}

// Research agents are shared by the linear and graph variants.

fn question_analyzer(topic: &str) -> Agent {
    canned_agent(
        "Question Analyzer",
        format!(
            "You are a research question analyzer. Your job is to analyze the research topic \
             and break it down into key components.\n\
             \n\
             Research topic: {topic}\n\
             \n\
             Your output should include:\n\
             1. A clear restatement of the research topic\n\
             2. Key questions that need to be answered\n\
             3. Scope and limitations of the research\n\
             4. Key terms that need to be defined or explored"
        ),
    )
}

fn information_gatherer() -> Agent {
    canned_agent(
        "Information Gatherer",
        "You are an information gatherer. Your job is to gather relevant information on the \
         research topic.\n\
         \n\
         Based on the question analysis, gather information that addresses the key questions. \
         Include:\n\
         1. Key facts and data points\n\
         2. Different perspectives on the topic\n\
         3. Relevant theories or frameworks\n\
         4. Historical context if applicable"
            .to_string(),
    )
}

fn information_analyzer() -> Agent {
    canned_agent(
        "Information Analyzer",
        "You are an information analyzer. Your job is to critically analyze the gathered \
         information.\n\
         \n\
         Analyze the information for:\n\
         1. Patterns and trends\n\
         2. Contradictions or inconsistencies\n\
         3. Strengths and weaknesses of different perspectives\n\
         4. Gaps in the information"
            .to_string(),
    )
}

fn information_synthesizer() -> Agent {
    canned_agent(
        "Information Synthesizer",
        "You are an information synthesizer. Your job is to synthesize the analyzed information \
         into a coherent whole.\n\
         \n\
         Create a synthesis that:\n\
         1. Integrates different perspectives\n\
         2. Resolves contradictions where possible\n\
         3. Addresses the key questions identified earlier\n\
         4. Presents a unified understanding of the topic"
            .to_string(),
    )
}

fn conclusion_drawer() -> Agent {
    canned_agent(
        "Conclusion Drawer",
        "You are a conclusion drawer. Your job is to draw conclusions from the research and \
         present a final response.\n\
         \n\
         Your conclusion should:\n\
         1. Directly address the original research topic\n\
         2. Summarize key findings\n\
         3. Highlight implications or applications\n\
         4. Identify areas for further research\n\
         5. Present a well-structured, comprehensive response to the original question"
            .to_string(),
    )
}

/// Five-step research pipeline run linearly.
pub fn create_research_workflow(topic: &str) -> Workflow {
    Workflow::new("Research Workflow", format!("A research workflow for {topic}"))
        .with_step(
            Step::new(question_analyzer(topic))
                .with_expected_output("Analysis of the research question")
                .with_temperature(0.3),
        )
        .with_step(
            Step::new(information_gatherer())
                .with_expected_output("Gathered information")
                .with_temperature(0.7),
        )
        .with_step(
            Step::new(information_analyzer())
                .with_expected_output("Analysis of the information")
                .with_temperature(0.5),
        )
        .with_step(
            Step::new(information_synthesizer())
                .with_expected_output("Synthesis of the information")
                .with_temperature(0.5),
        )
        .with_step(
            Step::new(conclusion_drawer())
                .with_expected_output("Final research conclusions")
                .with_temperature(0.3),
        )
}

/// The reasoning graph projected to a linear workflow flagged for graph mode.
pub fn create_workflow_with_graph(task: &str) -> Workflow {
    flagged_for_graph(create_reasoning_workflow(task))
}

/// The research graph projected to a linear workflow flagged for graph mode.
pub fn create_research_workflow_with_graph(topic: &str) -> Workflow {
    flagged_for_graph(create_research_graph(topic))
}

fn flagged_for_graph(graph_workflow: GraphWorkflow) -> Workflow {
    let mut workflow = graph_workflow.workflow;
    workflow
        .context_variables
        .insert(USE_LANGGRAPH_KEY.to_string(), Value::Bool(true));
    workflow
}

/// Chain nodes in the given order with unconditional edges.
fn chain(nodes: &[GraphNode]) -> Vec<GraphEdge> {
    nodes
        .windows(2)
        .map(|pair| GraphEdge::always(pair[0].id.clone(), pair[1].id.clone()))
        .collect()
}

/// Understanding, planning, execution, review.
pub fn create_reasoning_workflow(task: &str) -> GraphWorkflow {
    let nodes = vec![
        GraphNode::new(
            "understanding",
            "Understanding",
            "Understand the task and requirements",
            canned_agent(
                "Understanding Agent",
                format!(
                    "You are an understanding agent. Your job is to analyze the user's request \
                     and ensure you fully understand what they're asking for.\n\
                     \n\
                     Current task: {task}\n\
                     \n\
                     Your output should include:\n\
                     1. A clear restatement of what the user is asking for\n\
                     2. Any clarifying questions you might have\n\
                     3. Identification of key requirements and constraints"
                ),
            ),
        ),
        GraphNode::new(
            "planning",
            "Planning",
            "Create a plan to accomplish the task",
            canned_agent(
                "Planning Agent",
                format!(
                    "You are a planning agent. Your job is to create a detailed plan for how to \
                     accomplish the task.\n\
                     \n\
                     Current task: {task}\n\
                     \n\
                     Your output should be a markdown-formatted plan with:\n\
                     1. A step-by-step breakdown of how to accomplish the task\n\
                     2. Identification of potential challenges\n\
                     3. Resources or information needed"
                ),
            ),
        ),
        GraphNode::new(
            "execution",
            "Execution",
            "Execute the plan and generate the solution",
            canned_agent(
                "Execution Agent",
                "You are an execution agent. Your job is to carry out the plan and generate the \
                 requested content or solution.\n\
                 \n\
                 Follow the plan step by step and generate the requested output. Be thorough \
                 and detailed in your work."
                    .to_string(),
            ),
        ),
        GraphNode::new(
            "review",
            "Review",
            "Review the solution and provide a final response",
            canned_agent(
                "Review Agent",
                format!(
                    "You are a review agent. Your job is to review the output and ensure it \
                     meets the user's requirements.\n\
                     \n\
                     {}",
                    REVIEW_CRITERIA
                ),
            ),
        ),
    ];
    let edges = chain(&nodes);

    create_branching_workflow(
        "Reasoning Workflow",
        &format!("A workflow for {task}"),
        nodes,
        edges,
        "understanding",
        "review",
        ContextVars::new(),
    )
}

/// The research pipeline as a graph.
pub fn create_research_graph(topic: &str) -> GraphWorkflow {
    let nodes = vec![
        GraphNode::new(
            "question_analysis",
            "Question Analysis",
            "Analyze the research question",
            question_analyzer(topic),
        ),
        GraphNode::new(
            "information_gathering",
            "Information Gathering",
            "Gather information on the topic",
            information_gatherer(),
        ),
        GraphNode::new(
            "analysis",
            "Analysis",
            "Analyze the gathered information",
            information_analyzer(),
        ),
        GraphNode::new(
            "synthesis",
            "Synthesis",
            "Synthesize the analyzed information",
            information_synthesizer(),
        ),
        GraphNode::new(
            "conclusion",
            "Conclusion",
            "Draw conclusions from the research",
            conclusion_drawer(),
        ),
    ];
    let edges = chain(&nodes);

    create_branching_workflow(
        "Research Workflow",
        &format!("A research workflow for {topic}"),
        nodes,
        edges,
        "question_analysis",
        "conclusion",
        ContextVars::new(),
    )
}

/// Arbitrary topology. One step is derived per node.
pub fn create_branching_workflow(
    name: &str,
    description: &str,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    entry_node: &str,
    exit_node: &str,
    context_variables: ContextVars,
) -> GraphWorkflow {
    let steps = steps_for_nodes(&nodes);
    GraphWorkflow::new(
        create_custom_workflow(name, description, steps, context_variables),
        WorkflowGraph {
            nodes,
            edges,
            entry_node: entry_node.to_string(),
            exit_node: exit_node.to_string(),
        },
    )
}

/// One node per step (`step_0`, `step_1`, …) chained in order.
///
/// With no steps the graph is empty and entry/exit are `""`; validation
/// rejects it at execution time.
pub fn create_linear_workflow(
    name: &str,
    description: &str,
    steps: Vec<Step>,
    context_variables: ContextVars,
) -> GraphWorkflow {
    let nodes: Vec<GraphNode> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let fallback = format!("Step {}", i + 1);
            let name = non_empty_or(&step.agent.name, &fallback);
            let description = non_empty_or(&step.expected_output, &fallback);
            GraphNode::new(format!("step_{i}"), name, description, step.agent.clone())
        })
        .collect();
    let edges = chain(&nodes);
    let entry_node = nodes.first().map(|n| n.id.clone()).unwrap_or_default();
    let exit_node = nodes.last().map(|n| n.id.clone()).unwrap_or_default();

    GraphWorkflow::new(
        create_custom_workflow(name, description, steps, context_variables),
        WorkflowGraph {
            nodes,
            edges,
            entry_node,
            exit_node,
        },
    )
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
