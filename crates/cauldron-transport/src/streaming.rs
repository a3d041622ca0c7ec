use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use serde_json::Value;
use tracing::warn;

use cauldron_core::error::{Result, SwarmError};
use cauldron_core::wire::{StreamChunk, SwarmResponse};

/// Split a raw byte stream into newline-delimited lines.
///
/// Bytes are buffered until a full line arrives, so multi-byte UTF-8
/// sequences split across network reads decode correctly.
#[derive(Default)]
pub struct NdjsonParser {
    buffer: Vec<u8>,
}

impl NdjsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and extract complete lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Decode one line into stream chunks.
///
/// A line may carry several fields at once (`{"delim":"end","response":…}`),
/// so this yields them in order: start, node transition, content, tool calls,
/// end, response. Lines that are not JSON objects are logged and dropped.
pub fn parse_line(line: &str) -> Vec<StreamChunk> {
    let line = line.trim();
    // Tolerate SSE framing from proxies that re-wrap the stream
    let data = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if data.is_empty() || data == "[DONE]" {
        return vec![];
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!(data = %data, error = %e, "Failed to parse swarm stream chunk");
            return vec![];
        }
    };
    let Some(obj) = value.as_object() else {
        warn!(data = %data, "Swarm stream chunk is not a JSON object");
        return vec![];
    };

    let node_id = obj
        .get("node_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let delim = obj.get("delim").and_then(|v| v.as_str());
    let mut chunks = Vec::new();

    if delim == Some("start") {
        chunks.push(StreamChunk::Start);
    }

    if let Some(node) = obj.get("node").filter(|v| !v.is_null()) {
        chunks.push(StreamChunk::NodeTransition {
            node: node.clone(),
            node_id: node_id.clone(),
        });
    }

    if let Some(text) = obj.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            chunks.push(StreamChunk::Content {
                text: text.to_string(),
                node_id: node_id.clone(),
            });
        }
    }

    if let Some(calls) = obj.get("tool_calls").filter(|v| !v.is_null()) {
        chunks.push(StreamChunk::ToolCalls {
            tool_calls: calls.clone(),
            node_id: node_id.clone(),
        });
    }

    if delim == Some("end") {
        chunks.push(StreamChunk::End);
    }

    if let Some(response) = obj.get("response").filter(|v| !v.is_null()) {
        match serde_json::from_value::<SwarmResponse>(response.clone()) {
            Ok(resp) => chunks.push(StreamChunk::Response(resp)),
            Err(e) => warn!(error = %e, "Failed to parse final swarm response chunk"),
        }
    }

    chunks
}

/// A stream of decoded chunks from raw response bytes.
pub struct NdjsonStream<S> {
    inner: S,
    parser: NdjsonParser,
    pending: VecDeque<StreamChunk>,
    done: bool,
}

impl<S> NdjsonStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: NdjsonParser::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for NdjsonStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<StreamChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            // Return pending chunks first
            if let Some(chunk) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    for line in this.parser.feed(&bytes) {
                        this.pending.extend(parse_line(&line));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(SwarmError::Request(format!(
                        "stream read failed: {}",
                        e
                    )))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    if let Some(line) = this.parser.finish() {
                        this.pending.extend(parse_line(&line));
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
