use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::{Result, SwarmError};

/// A node in a workflow graph.
///
/// The node's agent runs remotely; `condition` is passed through untouched
/// and interpreted by the swarm service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent: Agent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        agent: Agent,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            agent,
            next: None,
            condition: None,
        }
    }

    pub fn with_next(mut self, next: Vec<String>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A directed edge between two graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl GraphEdge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Create an edge guarded by a remote-evaluated condition.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition.into()),
        }
    }
}

/// Nodes, edges and the designated entry and exit of a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub entry_node: String,
    pub exit_node: String,
}

impl WorkflowGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of `id`, in declaration order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Check the structure before handing the graph to the swarm.
    ///
    /// Rejects empty graphs, duplicate ids, entry/exit ids that name no node,
    /// and edges or `next` lists that point at unknown nodes. Unreachable
    /// nodes are logged but allowed.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(SwarmError::InvalidGraph("graph has no nodes".into()));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(SwarmError::InvalidGraph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        if !ids.contains(self.entry_node.as_str()) {
            return Err(SwarmError::InvalidGraph(format!(
                "entry node '{}' not found",
                self.entry_node
            )));
        }
        if !ids.contains(self.exit_node.as_str()) {
            return Err(SwarmError::InvalidGraph(format!(
                "exit node '{}' not found",
                self.exit_node
            )));
        }

        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !ids.contains(end.as_str()) {
                    return Err(SwarmError::InvalidGraph(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
        }

        for node in &self.nodes {
            for next in node.next.iter().flatten() {
                if !ids.contains(next.as_str()) {
                    return Err(SwarmError::InvalidGraph(format!(
                        "node '{}' lists unknown successor '{}'",
                        node.id, next
                    )));
                }
            }
        }

        let unreachable = self.unreachable_nodes();
        if !unreachable.is_empty() {
            tracing::warn!(nodes = ?unreachable, "Graph has nodes unreachable from the entry");
        }

        Ok(())
    }

    /// Ids of nodes not reachable from the entry via edges or `next` lists.
    pub fn unreachable_nodes(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![self.entry_node.as_str()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.outgoing(id).map(|e| e.to.as_str()));
            if let Some(node) = self.node(id) {
                stack.extend(node.next.iter().flatten().map(String::as_str));
            }
        }

        self.nodes
            .iter()
            .filter(|n| !seen.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect()
    }
}
