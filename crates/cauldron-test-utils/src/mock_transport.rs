use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::StreamExt;

use cauldron_core::error::{Result, SwarmError};
use cauldron_core::traits::{ChunkStream, SwarmTransport};
use cauldron_core::wire::{StreamChunk, SwarmRequest, SwarmResponse};

/// One scripted answer, consumed in order.
#[derive(Debug)]
pub enum MockReply {
    Response(SwarmResponse),
    Error(SwarmError),
    Stream(Vec<Result<StreamChunk>>),
    /// Yield these chunks, then never finish.
    StreamThenHang(Vec<Result<StreamChunk>>),
    /// The call itself never resolves.
    Hang,
}

/// A scripted [`SwarmTransport`] that records every request it receives.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other. With no scripted reply left, an agent request is
/// answered with `"{agent}: {last message}"` and a graph request with
/// `"graph: {input}"`.
#[derive(Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<SwarmRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let mock = Self::new();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_response(&self, response: SwarmResponse) {
        self.push_reply(MockReply::Response(response));
    }

    pub fn push_error(&self, error: SwarmError) {
        self.push_reply(MockReply::Error(error));
    }

    pub fn push_stream(&self, chunks: Vec<Result<StreamChunk>>) {
        self.push_reply(MockReply::Stream(chunks));
    }

    pub fn push_hang(&self) {
        self.push_reply(MockReply::Hang);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<SwarmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self, request: &SwarmRequest) -> MockReply {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Response(echo(request)))
    }
}

fn echo(request: &SwarmRequest) -> SwarmResponse {
    match request {
        SwarmRequest::Agent(r) => {
            let last = r
                .messages
                .last()
                .and_then(|m| m.content.clone())
                .unwrap_or_default();
            SwarmResponse::reply(format!("{}: {}", r.agent.name, last))
        }
        SwarmRequest::Graph(r) => SwarmResponse::reply(format!("graph: {}", r.input)),
    }
}

impl SwarmTransport for MockTransport {
    fn complete(&self, request: SwarmRequest) -> BoxFuture<'_, Result<SwarmResponse>> {
        let reply = self.next_reply(&request);
        Box::pin(async move {
            match reply {
                MockReply::Response(resp) => Ok(resp),
                MockReply::Error(e) => Err(e),
                MockReply::Hang => futures::future::pending().await,
                MockReply::Stream(_) | MockReply::StreamThenHang(_) => Err(SwarmError::Request(
                    "mock: stream reply scripted for a buffered call".into(),
                )),
            }
        })
    }

    fn stream(&self, request: SwarmRequest) -> BoxFuture<'_, Result<ChunkStream<'_>>> {
        let reply = self.next_reply(&request);
        Box::pin(async move {
            match reply {
                MockReply::Response(resp) => {
                    Ok(futures::stream::iter(vec![Ok(StreamChunk::Response(resp))]).boxed())
                }
                MockReply::Error(e) => Err(e),
                MockReply::Hang => futures::future::pending().await,
                MockReply::Stream(chunks) => Ok(futures::stream::iter(chunks).boxed()),
                MockReply::StreamThenHang(chunks) => Ok(futures::stream::iter(chunks)
                    .chain(futures::stream::pending())
                    .boxed()),
            }
        })
    }
}
