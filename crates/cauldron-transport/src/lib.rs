pub mod http;
pub mod retry;
pub mod streaming;

use cauldron_core::config::SwarmConfig;
use cauldron_core::traits::SwarmTransport;

pub use http::HttpTransport;
pub use retry::RetryingTransport;
pub use streaming::{parse_line, NdjsonParser, NdjsonStream};

/// Create the transport described by the config, wrapped in retries when
/// a `[swarm.retry]` section is present.
pub fn create_transport(config: &SwarmConfig) -> Box<dyn SwarmTransport> {
    let http = HttpTransport::from_config(config);
    match &config.retry {
        Some(retry) => Box::new(RetryingTransport::new(Box::new(http), retry.clone())),
        None => Box::new(http),
    }
}
