use std::io::Write;

use tempfile::NamedTempFile;

use cauldron_core::agent::Agent;
use cauldron_core::graph::{GraphEdge, GraphNode, WorkflowGraph};

/// Write `contents` to a temporary `.toml` file that lives as long as the handle.
pub fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

/// `draft -> review`, entry `draft`, exit `review`.
pub fn two_node_graph() -> WorkflowGraph {
    WorkflowGraph {
        nodes: vec![
            GraphNode::new(
                "draft",
                "Draft",
                "Produce a first draft",
                Agent::new("Drafter", "Write a first draft."),
            )
            .with_next(vec!["review".into()]),
            GraphNode::new(
                "review",
                "Review",
                "Tighten the draft",
                Agent::new("Reviewer", "Tighten the draft."),
            ),
        ],
        edges: vec![GraphEdge::always("draft", "review")],
        entry_node: "draft".into(),
        exit_node: "review".into(),
    }
}
