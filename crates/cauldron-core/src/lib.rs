pub mod agent;
pub mod config;
pub mod error;
pub mod graph;
pub mod traits;
pub mod types;
pub mod wire;

pub use agent::{models, Agent, FunctionParameters, SwarmFunction, ToolChoice};
pub use config::{AppConfig, RetryConfig, SwarmConfig};
pub use error::{Result, SwarmError};
pub use graph::{GraphEdge, GraphNode, WorkflowGraph};
pub use traits::{ChunkStream, SwarmTransport};
pub use types::*;
pub use wire::{
    AgentRequest, GraphPayload, GraphRequest, StreamChunk, SwarmRequest, SwarmResponse,
    WireMessage,
};
