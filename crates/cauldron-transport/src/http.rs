use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

use cauldron_core::config::SwarmConfig;
use cauldron_core::error::{Result, SwarmError};
use cauldron_core::traits::{ChunkStream, SwarmTransport};
use cauldron_core::wire::{SwarmRequest, SwarmResponse};

use crate::streaming::NdjsonStream;

/// Talks to the swarm service over HTTP.
///
/// Agent requests go to the swarm endpoint, graph requests to the
/// langgraph endpoint.
pub struct HttpTransport {
    http: Client,
    swarm_url: String,
    langgraph_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(swarm_url: impl Into<String>, langgraph_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            swarm_url: swarm_url.into(),
            langgraph_url: langgraph_url.into(),
            api_key: None,
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Self {
        let mut transport = Self::new(config.swarm_url(), config.langgraph_url());
        transport.api_key = config.api_key.clone();
        transport
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url_for(&self, request: &SwarmRequest) -> &str {
        match request {
            SwarmRequest::Agent(_) => &self.swarm_url,
            SwarmRequest::Graph(_) => &self.langgraph_url,
        }
    }

    async fn send(&self, request: &SwarmRequest) -> Result<reqwest::Response> {
        let url = self.url_for(request);
        debug!(url = %url, kind = request.kind(), stream = request.is_stream(), "Sending swarm request");

        let mut req = self.http.post(url).json(request);
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| SwarmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(SwarmError::Status { status, body });
        }

        Ok(response)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl SwarmTransport for HttpTransport {
    fn complete(&self, request: SwarmRequest) -> BoxFuture<'_, Result<SwarmResponse>> {
        Box::pin(async move {
            let request = request.streaming(false);
            let response = self.send(&request).await?;
            let body = response
                .text()
                .await
                .map_err(|e| SwarmError::Request(e.to_string()))?;
            serde_json::from_str(&body).map_err(|e| SwarmError::Parse(e.to_string()))
        })
    }

    fn stream(&self, request: SwarmRequest) -> BoxFuture<'_, Result<ChunkStream<'_>>> {
        Box::pin(async move {
            let request = request.streaming(true);
            let response = self.send(&request).await?;
            let chunks = NdjsonStream::new(response.bytes_stream());
            Ok(chunks.boxed())
        })
    }
}
