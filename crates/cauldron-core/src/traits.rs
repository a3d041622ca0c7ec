use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::wire::{StreamChunk, SwarmRequest, SwarmResponse};

/// Stream of decoded chunks from a streaming swarm call.
pub type ChunkStream<'a> = BoxStream<'a, Result<StreamChunk>>;

/// One network call to the swarm service.
pub trait SwarmTransport: Send + Sync + 'static {
    /// Send a request and wait for the whole response.
    fn complete(&self, request: SwarmRequest) -> BoxFuture<'_, Result<SwarmResponse>>;

    /// Send a request and receive the response as a chunk stream.
    ///
    /// Malformed chunks are dropped by the implementation; an `Err` item
    /// means the connection itself failed.
    fn stream(&self, request: SwarmRequest) -> BoxFuture<'_, Result<ChunkStream<'_>>>;
}
