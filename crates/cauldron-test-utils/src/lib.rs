//! Test doubles and fixtures shared by the Cauldron crates.

pub mod fixtures;
pub mod mock_transport;

pub use fixtures::{config_file, two_node_graph};
pub use mock_transport::{MockReply, MockTransport};
