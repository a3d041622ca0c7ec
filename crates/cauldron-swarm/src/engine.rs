use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use cauldron_core::agent::models;
use cauldron_core::config::SwarmConfig;
use cauldron_core::error::{Result, SwarmError, MESSAGE_ERROR_TEXT, WORKFLOW_ERROR_TEXT};
use cauldron_core::traits::{ChunkStream, SwarmTransport};
use cauldron_core::types::{classify, merge_context, wants_langgraph, ContextVars, Message, StreamEvent};
use cauldron_core::wire::{
    AgentRequest, GraphRequest, StreamChunk, SwarmRequest, SwarmResponse, WireMessage,
};

use crate::assistant::create_assistant_agent;
use crate::factory::create_linear_workflow;
use crate::graph::GraphWorkflow;
use crate::workflow::{Step, Workflow};

/// Where a run is. Reported through tracing at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { step: usize },
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running { step } => write!(f, "running({})", step),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Values filled into a step request when the step leaves them unset.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            model: models::DEFAULT.to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

impl From<&SwarmConfig> for StepDefaults {
    fn from(config: &SwarmConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            max_tokens: config.default_max_tokens,
            temperature: config.default_temperature,
        }
    }
}

/// Runs workflows against a swarm transport.
///
/// Holds no per-run state, so one engine can serve concurrent runs. Every
/// `execute_*` and `send_*` method resolves to a [`Message`]: failures come
/// back as an error-typed message, never as `Err` or a panic.
///
/// Runs on an engine are not cancellable. To cancel a run, start it on a
/// handle from [`cancellable`](Self::cancellable).
#[derive(Clone)]
pub struct SwarmEngine {
    transport: Arc<dyn SwarmTransport>,
    defaults: StepDefaults,
    cancel: CancellationToken,
}

impl SwarmEngine {
    pub fn new(transport: Arc<dyn SwarmTransport>) -> Self {
        Self {
            transport,
            defaults: StepDefaults::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: StepDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// A handle sharing this engine's transport and defaults whose runs stop
    /// when `token` fires. In-flight requests are dropped.
    ///
    /// Cancelling `token` affects only runs started on the returned handle;
    /// `self` and other handles keep working.
    pub fn cancellable(&self, token: CancellationToken) -> SwarmEngine {
        SwarmEngine {
            transport: self.transport.clone(),
            defaults: self.defaults.clone(),
            cancel: token,
        }
    }

    /// Ask the context-aware assistant a single question.
    ///
    /// The agent is built from `currentPage`, `userRole` and `workspaceName`
    /// in `context` and sent without step defaults.
    pub async fn send_message(&self, text: &str, context: &ContextVars) -> Message {
        let start = Instant::now();
        let request = assistant_request(text, context, false);
        let result = async {
            self.check_cancelled()?;
            let response = self.guarded(self.transport.complete(request)).await?;
            response.last_assistant_message()
        }
        .await;
        self.finish(ASSISTANT_RUN, result, start, MESSAGE_ERROR_TEXT)
    }

    /// Streaming variant of [`send_message`](Self::send_message).
    ///
    /// Content deltas win over a final `response` chunk; the response is used
    /// only when no content was streamed.
    pub async fn send_message_streaming<F>(
        &self,
        text: &str,
        context: &ContextVars,
        on_event: F,
    ) -> Message
    where
        F: FnMut(StreamEvent) + Send,
    {
        let start = Instant::now();
        let mut on_event = on_event;
        let request = assistant_request(text, context, true);
        let result = async {
            self.check_cancelled()?;
            let stream = self.guarded(self.transport.stream(request)).await?;
            let outcome = self.drain(stream, &mut on_event).await?;
            match outcome.response {
                Some(response) if outcome.accumulated.is_empty() => {
                    response.last_assistant_message()
                }
                _ => Ok(streamed_message(outcome.accumulated)),
            }
        }
        .await;
        self.finish(ASSISTANT_RUN, result, start, MESSAGE_ERROR_TEXT)
    }

    /// Run the steps in order, each fed the previous step's output.
    ///
    /// When the merged context has `useLanggraph: true` the whole workflow is
    /// handed to the graph endpoint instead.
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        input: &str,
        context: &ContextVars,
    ) -> Message {
        let merged = merge_context(&workflow.context_variables, context);
        if wants_langgraph(&merged) {
            let graph = as_linear_graph(workflow);
            return self.execute_graph(&graph, input, context).await;
        }

        let start = Instant::now();
        info!(
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            state = %RunState::Idle,
            "Starting workflow"
        );
        let result = self.run_steps(workflow, input, &merged).await;
        self.finish(&workflow.name, result, start, WORKFLOW_ERROR_TEXT)
    }

    /// Streaming variant of [`execute_workflow`](Self::execute_workflow).
    ///
    /// Graph-backed runs stream for real. Linear runs emit `Start`, then one
    /// `Content` event holding the whole result, then `End`.
    pub async fn execute_workflow_streaming<F>(
        &self,
        workflow: &Workflow,
        input: &str,
        context: &ContextVars,
        on_event: F,
    ) -> Message
    where
        F: FnMut(StreamEvent) + Send,
    {
        if wants_langgraph(&merge_context(&workflow.context_variables, context)) {
            let graph = as_linear_graph(workflow);
            return self
                .execute_graph_streaming(&graph, input, context, on_event)
                .await;
        }

        let mut on_event = on_event;
        on_event(StreamEvent::Start);
        let message = self.execute_workflow(workflow, input, context).await;
        on_event(StreamEvent::Content {
            delta: message.content.clone(),
            accumulated: message.content.clone(),
            node_id: None,
        });
        on_event(StreamEvent::End);
        message
    }

    /// Delegate the whole graph to the swarm in one buffered request.
    pub async fn execute_graph(
        &self,
        workflow: &GraphWorkflow,
        input: &str,
        context: &ContextVars,
    ) -> Message {
        let start = Instant::now();
        let result = self.run_graph(workflow, input, context).await;
        self.finish(workflow.name(), result, start, WORKFLOW_ERROR_TEXT)
    }

    /// Delegate the whole graph and forward stream events as they arrive.
    pub async fn execute_graph_streaming<F>(
        &self,
        workflow: &GraphWorkflow,
        input: &str,
        context: &ContextVars,
        on_event: F,
    ) -> Message
    where
        F: FnMut(StreamEvent) + Send,
    {
        let start = Instant::now();
        let mut on_event = on_event;
        let result = self
            .run_graph_stream(workflow, input, context, &mut on_event)
            .await;
        self.finish(workflow.name(), result, start, WORKFLOW_ERROR_TEXT)
    }

    async fn run_steps(
        &self,
        workflow: &Workflow,
        input: &str,
        context: &ContextVars,
    ) -> Result<Message> {
        let mut current = input.to_string();
        let mut last = None;

        for (index, step) in workflow.steps.iter().enumerate() {
            self.check_cancelled()?;
            debug!(
                workflow = %workflow.name,
                state = %RunState::Running { step: index },
                agent = %step.agent.name,
                "Running step"
            );

            let request = self.step_request(step, &current, context);
            let response = self.guarded(self.transport.complete(request)).await?;
            let message = response.last_assistant_message()?;
            current = message.content.clone();
            last = Some(message);
        }

        Ok(last.unwrap_or_else(Message::empty_workflow))
    }

    fn step_request(&self, step: &Step, current: &str, context: &ContextVars) -> SwarmRequest {
        SwarmRequest::Agent(AgentRequest {
            messages: vec![WireMessage::user(step.render(current))],
            context_variables: context.clone(),
            agent: step.agent.or_model(&self.defaults.model),
            max_tokens: Some(step.max_tokens.unwrap_or(self.defaults.max_tokens)),
            temperature: Some(step.temperature.unwrap_or(self.defaults.temperature)),
            stream: false,
        })
    }

    fn graph_request(
        &self,
        workflow: &GraphWorkflow,
        input: &str,
        context: &ContextVars,
        stream: bool,
    ) -> SwarmRequest {
        SwarmRequest::Graph(GraphRequest {
            workflow: workflow.payload(),
            input: input.to_string(),
            messages: vec![WireMessage::user(input)],
            context_variables: merge_context(&workflow.workflow.context_variables, context),
            stream,
        })
    }

    async fn run_graph(
        &self,
        workflow: &GraphWorkflow,
        input: &str,
        context: &ContextVars,
    ) -> Result<Message> {
        workflow.validate()?;
        self.check_cancelled()?;
        info!(
            workflow = %workflow.name(),
            nodes = workflow.graph.nodes.len(),
            state = %RunState::Running { step: 0 },
            "Delegating graph"
        );

        let request = self.graph_request(workflow, input, context, false);
        let response = self.guarded(self.transport.complete(request)).await?;
        response.last_assistant_message()
    }

    async fn run_graph_stream(
        &self,
        workflow: &GraphWorkflow,
        input: &str,
        context: &ContextVars,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<Message> {
        workflow.validate()?;
        self.check_cancelled()?;
        info!(
            workflow = %workflow.name(),
            nodes = workflow.graph.nodes.len(),
            state = %RunState::Running { step: 0 },
            "Streaming graph"
        );

        let request = self.graph_request(workflow, input, context, true);
        let stream = self.guarded(self.transport.stream(request)).await?;
        let outcome = self.drain(stream, on_event).await?;
        match outcome.response {
            Some(response) => response.last_assistant_message(),
            None => Ok(streamed_message(outcome.accumulated)),
        }
    }

    /// Forward chunks as events until the stream ends or a `response` chunk
    /// arrives, accumulating content deltas on the way.
    async fn drain(
        &self,
        mut stream: ChunkStream<'_>,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<StreamOutcome> {
        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                chunk = stream.next() => chunk,
                _ = self.cancel.cancelled() => return Err(SwarmError::Cancelled),
            };
            let Some(chunk) = next else { break };

            match chunk? {
                StreamChunk::Start => on_event(StreamEvent::Start),
                StreamChunk::End => on_event(StreamEvent::End),
                StreamChunk::NodeTransition { node, node_id } => {
                    debug!(node_id = ?node_id, "Graph node transition");
                    on_event(StreamEvent::NodeTransition { node, node_id });
                }
                StreamChunk::Content { text, node_id } => {
                    accumulated.push_str(&text);
                    on_event(StreamEvent::Content {
                        delta: text,
                        accumulated: accumulated.clone(),
                        node_id,
                    });
                }
                StreamChunk::ToolCalls {
                    tool_calls,
                    node_id,
                } => on_event(StreamEvent::ToolCalls {
                    tool_calls,
                    node_id,
                }),
                StreamChunk::Response(response) => {
                    return Ok(StreamOutcome {
                        accumulated,
                        response: Some(response),
                    })
                }
            }
        }

        Ok(StreamOutcome {
            accumulated,
            response: None,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SwarmError::Cancelled);
        }
        Ok(())
    }

    /// Race a transport call against cancellation.
    async fn guarded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            result = call => result,
            _ = self.cancel.cancelled() => Err(SwarmError::Cancelled),
        }
    }

    fn finish(
        &self,
        workflow: &str,
        result: Result<Message>,
        start: Instant,
        apology: &str,
    ) -> Message {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(message) => {
                info!(
                    workflow = %workflow,
                    state = %RunState::Done,
                    elapsed_ms,
                    "Workflow complete"
                );
                message
            }
            Err(e) => {
                error!(
                    workflow = %workflow,
                    state = %RunState::Failed,
                    elapsed_ms,
                    error = %e,
                    "Workflow failed"
                );
                Message::error(e.user_text_or(apology))
            }
        }
    }
}

const ASSISTANT_RUN: &str = "assistant";

/// What a drained stream left behind.
struct StreamOutcome {
    accumulated: String,
    response: Option<SwarmResponse>,
}

/// Final message of a stream that carried only deltas.
fn streamed_message(accumulated: String) -> Message {
    let mut message = Message::streaming();
    message.kind = classify(&accumulated);
    message.content = accumulated;
    message.is_streaming = false;
    message
}

fn assistant_request(text: &str, context: &ContextVars, stream: bool) -> SwarmRequest {
    SwarmRequest::Agent(AgentRequest {
        messages: vec![WireMessage::user(text)],
        context_variables: context.clone(),
        agent: create_assistant_agent(context),
        max_tokens: None,
        temperature: None,
        stream,
    })
}

fn as_linear_graph(workflow: &Workflow) -> GraphWorkflow {
    create_linear_workflow(
        &workflow.name,
        &workflow.description,
        workflow.steps.clone(),
        workflow.context_variables.clone(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use cauldron_core::agent::Agent;
    use cauldron_core::error::{CANCELLED_TEXT, NO_RESPONSE_TEXT};
    use cauldron_core::types::{MessageType, Role};
    use cauldron_core::wire::{AgentRequest, SwarmResponse};
    use cauldron_test_utils::{two_node_graph, MockReply, MockTransport};
    use serde_json::json;

    use crate::factory::{create_custom_workflow, create_workflow};

    fn engine(mock: &MockTransport) -> SwarmEngine {
        SwarmEngine::new(Arc::new(mock.clone()))
    }

    fn agent_request(request: &SwarmRequest) -> &AgentRequest {
        match request {
            SwarmRequest::Agent(r) => r,
            SwarmRequest::Graph(_) => panic!("expected an agent request"),
        }
    }

    fn graph_request(request: &SwarmRequest) -> &GraphRequest {
        match request {
            SwarmRequest::Graph(r) => r,
            SwarmRequest::Agent(_) => panic!("expected a graph request"),
        }
    }

    fn user_text(request: &SwarmRequest) -> String {
        agent_request(request).messages[0]
            .content
            .clone()
            .unwrap_or_default()
    }

    fn three_steps() -> Workflow {
        create_custom_workflow(
            "Chain",
            "three templated steps",
            vec![
                Step::new(Agent::new("A", "first")).with_input("Start from: {input}"),
                Step::new(Agent::new("B", "second")).with_input("Refine {input} carefully"),
                Step::new(Agent::new("C", "third")),
            ],
            ContextVars::new(),
        )
    }

    fn collect_events() -> (Arc<Mutex<Vec<StreamEvent>>>, impl FnMut(StreamEvent) + Send) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |event| sink.lock().unwrap().push(event))
    }

    #[tokio::test]
    async fn test_outputs_chain_through_templates() {
        let mock = MockTransport::with_replies([
            MockReply::Response(SwarmResponse::reply("out-1")),
            MockReply::Response(SwarmResponse::reply("out-2")),
            MockReply::Response(SwarmResponse::reply("out-3")),
        ]);
        let result = engine(&mock)
            .execute_workflow(&three_steps(), "seed", &ContextVars::new())
            .await;

        assert_eq!(result.content, "out-3");
        assert_eq!(result.role, Role::Assistant);
        assert!(result.id.starts_with("assistant-"));
        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(user_text(&requests[0]), "Start from: seed");
        assert_eq!(user_text(&requests[1]), "Refine out-1 carefully");
        assert_eq!(user_text(&requests[2]), "out-2");
        assert!(requests.iter().all(|r| !r.is_stream()));
    }

    #[tokio::test]
    async fn test_zero_steps_returns_empty_message() {
        let mock = MockTransport::new();
        let wf = create_custom_workflow("Nothing", "no steps", vec![], ContextVars::new());
        let result = engine(&mock)
            .execute_workflow(&wf, "ignored", &ContextVars::new())
            .await;

        assert_eq!(result.content, "");
        assert_eq!(result.kind, MessageType::Text);
        assert!(result.id.starts_with("workflow-"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fenced_output_is_markdown() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::reply("```sql\nSELECT 1;\n```"));
        let wf = create_custom_workflow(
            "One",
            "d",
            vec![Step::new(Agent::new("Coder", "Write SQL."))],
            ContextVars::new(),
        );
        let result = engine(&mock)
            .execute_workflow(&wf, "query", &ContextVars::new())
            .await;
        assert_eq!(result.kind, MessageType::Markdown);
    }

    #[tokio::test]
    async fn test_failure_at_any_step_yields_error_message() {
        for failing in 0..3 {
            let mock = MockTransport::new();
            for _ in 0..failing {
                mock.push_response(SwarmResponse::reply("fine"));
            }
            mock.push_error(SwarmError::Status {
                status: 500,
                body: "boom".into(),
            });

            let result = engine(&mock)
                .execute_workflow(&three_steps(), "seed", &ContextVars::new())
                .await;
            assert_eq!(result.kind, MessageType::Error, "failing step {failing}");
            assert_eq!(result.content, WORKFLOW_ERROR_TEXT);
            assert!(result.id.starts_with("error-"));
            assert_eq!(mock.request_count(), failing + 1);
        }
    }

    #[tokio::test]
    async fn test_missing_assistant_reply_is_no_response() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::default());
        let result = engine(&mock)
            .execute_workflow(&three_steps(), "seed", &ContextVars::new())
            .await;
        assert!(result.is_error());
        assert_eq!(result.content, NO_RESPONSE_TEXT);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_summarize_scenario() {
        let mock = MockTransport::with_replies([
            MockReply::Response(SwarmResponse::reply("PLAN")),
            MockReply::Response(SwarmResponse::reply("EXEC")),
            MockReply::Response(SwarmResponse::reply("FINAL")),
        ]);
        let wf = create_workflow("Sales", "Quarterly summary", "Summarize Q1 sales");
        let result = engine(&mock)
            .execute_workflow(&wf, "Summarize Q1 sales", &ContextVars::new())
            .await;

        assert_eq!(result.content, "FINAL");
        assert_eq!(result.kind, MessageType::Text);

        let requests = mock.requests();
        let first = agent_request(&requests[0]);
        assert_eq!(first.messages[0].content.as_deref(), Some("Summarize Q1 sales"));
        assert_eq!(first.max_tokens, Some(2048));
        assert_eq!(first.temperature, Some(0.3));
        assert_eq!(first.agent.model.as_deref(), Some("llama3-70b-8192"));
        assert_eq!(user_text(&requests[1]), "PLAN");
        assert_eq!(agent_request(&requests[1]).temperature, Some(0.7));
        assert_eq!(user_text(&requests[2]), "EXEC");
    }

    #[tokio::test]
    async fn test_defaults_and_merged_context() {
        let mock = MockTransport::new();
        let wf = create_custom_workflow(
            "Bare",
            "d",
            vec![Step::new(Agent::new("Bare", "b"))],
            ContextVars::from_iter([
                ("tone".to_string(), json!("formal")),
                ("lang".to_string(), json!("en")),
            ]),
        );
        let defaults = StepDefaults {
            model: "mixtral-8x7b-32768".into(),
            max_tokens: 512,
            temperature: 0.2,
        };
        let context = ContextVars::from_iter([("lang".to_string(), json!("fr"))]);
        let result = engine(&mock)
            .with_defaults(defaults)
            .execute_workflow(&wf, "bonjour", &context)
            .await;

        assert_eq!(result.content, "Bare: bonjour");
        let requests = mock.requests();
        let sent = agent_request(&requests[0]);
        assert_eq!(sent.agent.model.as_deref(), Some("mixtral-8x7b-32768"));
        assert_eq!(sent.max_tokens, Some(512));
        assert_eq!(sent.temperature, Some(0.2));
        assert_eq!(sent.context_variables["tone"], "formal");
        assert_eq!(sent.context_variables["lang"], "fr");
    }

    #[tokio::test]
    async fn test_use_langgraph_routes_to_graph() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::reply("graph answer"));
        let context = ContextVars::from_iter([("useLanggraph".to_string(), json!(true))]);
        let result = engine(&mock)
            .execute_workflow(&three_steps(), "seed", &context)
            .await;

        assert_eq!(result.content, "graph answer");
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let sent = graph_request(&requests[0]);
        assert_eq!(sent.input, "seed");
        assert_eq!(sent.workflow.graph.entry_node, "step_0");
        assert_eq!(sent.workflow.graph.exit_node, "step_2");
        assert_eq!(sent.context_variables["useLanggraph"], true);
        assert!(!sent.stream);
    }

    #[tokio::test]
    async fn test_workflow_flag_routes_to_graph() {
        let mock = MockTransport::new();
        let wf = crate::factory::create_workflow_with_graph("plan a launch");
        let result = engine(&mock)
            .execute_workflow(&wf, "plan a launch", &ContextVars::new())
            .await;

        assert_eq!(result.content, "graph: plan a launch");
        let requests = mock.requests();
        let sent = graph_request(&requests[0]);
        assert_eq!(sent.workflow.graph.nodes.len(), 4);
        assert_eq!(sent.workflow.name, "Reasoning Workflow");
    }

    #[tokio::test]
    async fn test_caller_can_turn_graph_mode_off() {
        let mock = MockTransport::new();
        let wf = crate::factory::create_workflow_with_graph("plan a launch");
        let context = ContextVars::from_iter([("useLanggraph".to_string(), json!(false))]);
        let result = engine(&mock).execute_workflow(&wf, "go", &context).await;

        assert!(!result.is_error());
        assert_eq!(mock.request_count(), 4);
        assert!(mock
            .requests()
            .iter()
            .all(|r| matches!(r, SwarmRequest::Agent(_))));
    }

    #[tokio::test]
    async fn test_graph_request_shape() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::reply("reviewed"));
        let wf = GraphWorkflow::new(Workflow::new("Draft", "two nodes"), two_node_graph());
        let result = engine(&mock)
            .execute_graph(&wf, "write a memo", &ContextVars::new())
            .await;

        assert_eq!(result.content, "reviewed");
        let requests = mock.requests();
        let sent = graph_request(&requests[0]);
        assert_eq!(sent.workflow.name, "Draft");
        assert_eq!(sent.messages.len(), 1);
        assert_eq!(sent.messages[0].role, "user");
        assert_eq!(sent.messages[0].content.as_deref(), Some("write a memo"));
    }

    #[tokio::test]
    async fn test_invalid_graph_sends_nothing() {
        let mock = MockTransport::new();
        let mut graph = two_node_graph();
        graph.exit_node = "missing".into();
        let wf = GraphWorkflow::new(Workflow::new("Broken", "d"), graph);
        let result = engine(&mock)
            .execute_graph(&wf, "go", &ContextVars::new())
            .await;

        assert!(result.is_error());
        assert!(result.content.starts_with("The workflow graph is invalid"));
        assert!(result.content.contains("missing"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_linear_graph_is_invalid() {
        let mock = MockTransport::new();
        let wf = create_custom_workflow("Empty", "d", vec![], ContextVars::new());
        let context = ContextVars::from_iter([("useLanggraph".to_string(), json!(true))]);
        let result = engine(&mock).execute_workflow(&wf, "go", &context).await;
        assert!(result.is_error());
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_streaming_hello_scenario() {
        let mock = MockTransport::new();
        mock.push_stream(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Content { text: "Hel".into(), node_id: None }),
            Ok(StreamChunk::Content { text: "lo".into(), node_id: None }),
            Ok(StreamChunk::End),
        ]);
        let wf = GraphWorkflow::new(Workflow::new("Greeting", "d"), two_node_graph());
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_graph_streaming(&wf, "say hello", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, "Hello");
        assert!(!result.is_streaming);
        assert_eq!(result.kind, MessageType::Text);
        let events = events.lock().unwrap();
        assert_eq!(*events, vec![
            StreamEvent::Start,
            StreamEvent::Content {
                delta: "Hel".into(),
                accumulated: "Hel".into(),
                node_id: None,
            },
            StreamEvent::Content {
                delta: "lo".into(),
                accumulated: "Hello".into(),
                node_id: None,
            },
            StreamEvent::End,
        ]);
        assert!(mock.requests()[0].is_stream());
    }

    #[tokio::test]
    async fn test_stream_accumulates_across_nodes() {
        let deltas = ["Plan: ", "gather data. ", "```md\n# Report\n```"];
        let mut chunks = vec![Ok(StreamChunk::Start)];
        for (i, delta) in deltas.iter().enumerate() {
            chunks.push(Ok(StreamChunk::NodeTransition {
                node: json!(format!("node{i}")),
                node_id: Some(format!("node{i}")),
            }));
            chunks.push(Ok(StreamChunk::Content {
                text: delta.to_string(),
                node_id: Some(format!("node{i}")),
            }));
        }
        chunks.push(Ok(StreamChunk::ToolCalls {
            tool_calls: json!([{"id": "call_1"}]),
            node_id: Some("node2".into()),
        }));
        chunks.push(Ok(StreamChunk::End));

        let mock = MockTransport::new();
        mock.push_stream(chunks);
        let wf = GraphWorkflow::new(Workflow::new("Report", "d"), two_node_graph());
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_graph_streaming(&wf, "report", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, deltas.concat());
        assert_eq!(result.kind, MessageType::Markdown);
        let events = events.lock().unwrap();
        let transitions = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::NodeTransition { .. }))
            .count();
        assert_eq!(transitions, 3);
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCalls { .. })));
        match events.iter().rev().find(|e| matches!(e, StreamEvent::Content { .. })) {
            Some(StreamEvent::Content { accumulated, .. }) => {
                assert_eq!(accumulated, &deltas.concat())
            }
            other => panic!("expected content event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_response_chunk_finalizes_stream() {
        let mock = MockTransport::new();
        mock.push_stream(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Content { text: "partial".into(), node_id: None }),
            Ok(StreamChunk::End),
            Ok(StreamChunk::Response(SwarmResponse::reply("complete answer"))),
            Ok(StreamChunk::Content { text: "ignored".into(), node_id: None }),
        ]);
        let wf = GraphWorkflow::new(Workflow::new("Final", "d"), two_node_graph());
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_graph_streaming(&wf, "go", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, "complete answer");
        assert!(!result.is_streaming);
        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_error_message() {
        let mock = MockTransport::new();
        mock.push_error(SwarmError::Status { status: 502, body: String::new() });
        let wf = GraphWorkflow::new(Workflow::new("Down", "d"), two_node_graph());
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_graph_streaming(&wf, "go", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, WORKFLOW_ERROR_TEXT);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_linear_streaming_wraps_buffered_run() {
        let mock = MockTransport::with_replies([
            MockReply::Response(SwarmResponse::reply("one")),
            MockReply::Response(SwarmResponse::reply("two")),
            MockReply::Response(SwarmResponse::reply("three")),
        ]);
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_workflow_streaming(&three_steps(), "seed", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, "three");
        assert_eq!(*events.lock().unwrap(), vec![
            StreamEvent::Start,
            StreamEvent::Content {
                delta: "three".into(),
                accumulated: "three".into(),
                node_id: None,
            },
            StreamEvent::End,
        ]);
    }

    #[tokio::test]
    async fn test_graph_backed_workflow_streams_through_graph() {
        let mock = MockTransport::new();
        mock.push_stream(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Content { text: "graph".into(), node_id: Some("step_0".into()) }),
            Ok(StreamChunk::End),
        ]);
        let context = ContextVars::from_iter([("useLanggraph".to_string(), json!(true))]);
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_workflow_streaming(&three_steps(), "seed", &context, sink)
            .await;

        assert_eq!(result.content, "graph");
        assert_eq!(events.lock().unwrap().len(), 3);
        assert!(graph_request(&mock.requests()[0]).stream);
    }

    #[tokio::test]
    async fn test_cancel_during_request() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::reply("first"));
        mock.push_hang();
        let token = CancellationToken::new();
        let engine = engine(&mock).cancellable(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let result = engine
            .execute_workflow(&three_steps(), "seed", &ContextVars::new())
            .await;
        canceller.await.unwrap();

        assert!(result.is_error());
        assert_eq!(result.content, CANCELLED_TEXT);
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_nothing() {
        let mock = MockTransport::new();
        let token = CancellationToken::new();
        token.cancel();
        let engine = engine(&mock).cancellable(token);

        let result = engine
            .execute_workflow(&three_steps(), "seed", &ContextVars::new())
            .await;
        assert_eq!(result.content, CANCELLED_TEXT);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream() {
        let mock = MockTransport::new();
        mock.push_reply(MockReply::StreamThenHang(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Content { text: "so far".into(), node_id: None }),
        ]));
        let token = CancellationToken::new();
        let engine = engine(&mock).cancellable(token.clone());
        let wf = GraphWorkflow::new(Workflow::new("Slow", "d"), two_node_graph());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let (events, sink) = collect_events();
        let result = engine
            .execute_graph_streaming(&wf, "go", &ContextVars::new(), sink)
            .await;
        canceller.await.unwrap();

        assert_eq!(result.content, CANCELLED_TEXT);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    async fn wait_for_requests(mock: &MockTransport, count: usize) {
        while mock.request_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_engine_usable() {
        let mock = MockTransport::new();
        mock.push_hang();
        mock.push_response(SwarmResponse::reply("fresh"));
        let engine = Arc::new(engine(&mock));
        let wf = create_custom_workflow(
            "One",
            "d",
            vec![Step::new(Agent::new("Solo", "s"))],
            ContextVars::new(),
        );

        let token = CancellationToken::new();
        let first = tokio::spawn({
            let engine = engine.clone();
            let wf = wf.clone();
            let token = token.clone();
            async move {
                engine
                    .cancellable(token)
                    .execute_workflow(&wf, "first", &ContextVars::new())
                    .await
            }
        });
        wait_for_requests(&mock, 1).await;
        token.cancel();
        assert_eq!(first.await.unwrap().content, CANCELLED_TEXT);

        let later = engine
            .execute_workflow(&wf, "second", &ContextVars::new())
            .await;
        assert_eq!(later.content, "fresh");
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_runs_cancel_independently() {
        let mock = MockTransport::new();
        mock.push_hang();
        let engine = Arc::new(engine(&mock));
        let wf = GraphWorkflow::new(Workflow::new("Pair", "d"), two_node_graph());

        let doomed = CancellationToken::new();
        let hung = tokio::spawn({
            let engine = engine.cancellable(doomed.clone());
            let wf = wf.clone();
            async move { engine.execute_graph(&wf, "stuck", &ContextVars::new()).await }
        });
        wait_for_requests(&mock, 1).await;

        let survivor = engine
            .cancellable(CancellationToken::new())
            .execute_graph(&wf, "alive", &ContextVars::new())
            .await;
        doomed.cancel();

        assert_eq!(survivor.content, "graph: alive");
        assert_eq!(hung.await.unwrap().content, CANCELLED_TEXT);
    }

    #[tokio::test]
    async fn test_graph_reply_without_assistant_is_no_response() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::default());
        let wf = GraphWorkflow::new(Workflow::new("Silent", "d"), two_node_graph());
        let result = engine(&mock)
            .execute_graph(&wf, "go", &ContextVars::new())
            .await;

        assert!(result.is_error());
        assert_eq!(result.content, NO_RESPONSE_TEXT);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_response_without_assistant_is_no_response() {
        let mock = MockTransport::new();
        mock.push_stream(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Content { text: "partial".into(), node_id: None }),
            Ok(StreamChunk::Response(SwarmResponse::default())),
        ]);
        let wf = GraphWorkflow::new(Workflow::new("Silent", "d"), two_node_graph());
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .execute_graph_streaming(&wf, "go", &ContextVars::new(), sink)
            .await;

        assert!(result.is_error());
        assert_eq!(result.content, NO_RESPONSE_TEXT);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    fn dashboard() -> ContextVars {
        ContextVars::from_iter([
            ("currentPage".to_string(), json!("Dashboard")),
            ("userRole".to_string(), json!("Admin")),
        ])
    }

    #[tokio::test]
    async fn test_send_message_builds_assistant_request() {
        let mock = MockTransport::new();
        mock.push_response(SwarmResponse::reply("Active users rose 12%."));
        let result = engine(&mock)
            .with_defaults(StepDefaults {
                model: "gemma2-9b-it".into(),
                max_tokens: 128,
                temperature: 0.1,
            })
            .send_message("How are we doing?", &dashboard())
            .await;

        assert_eq!(result.content, "Active users rose 12%.");
        assert_eq!(result.kind, MessageType::Text);
        let requests = mock.requests();
        let sent = agent_request(&requests[0]);
        assert_eq!(sent.agent.name, "CauldronOS Assistant");
        assert_eq!(sent.agent.model.as_deref(), Some("llama3-70b-8192"));
        assert_eq!(sent.agent.functions.len(), 2);
        assert!(sent.agent.instructions.contains("- User role: Admin"));
        assert_eq!(sent.messages[0].content.as_deref(), Some("How are we doing?"));
        assert_eq!(sent.context_variables["currentPage"], "Dashboard");
        assert_eq!(sent.max_tokens, None);
        assert_eq!(sent.temperature, None);
        assert!(!sent.stream);
    }

    #[tokio::test]
    async fn test_send_message_failure_uses_request_apology() {
        let mock = MockTransport::new();
        mock.push_error(SwarmError::Status { status: 500, body: "down".into() });
        let result = engine(&mock).send_message("hi", &ContextVars::new()).await;

        assert!(result.is_error());
        assert_eq!(result.content, MESSAGE_ERROR_TEXT);

        mock.push_response(SwarmResponse::default());
        let result = engine(&mock).send_message("hi", &ContextVars::new()).await;
        assert_eq!(result.content, NO_RESPONSE_TEXT);
    }

    #[tokio::test]
    async fn test_send_message_streaming_prefers_deltas() {
        let mock = MockTransport::new();
        mock.push_stream(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Content { text: "Use the ".into(), node_id: None }),
            Ok(StreamChunk::ToolCalls {
                tool_calls: json!([{"function": {"name": "analyze_metrics"}}]),
                node_id: None,
            }),
            Ok(StreamChunk::Content { text: "metrics tab.".into(), node_id: None }),
            Ok(StreamChunk::End),
            Ok(StreamChunk::Response(SwarmResponse::reply("server copy"))),
        ]);
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .send_message_streaming("Where do I look?", &dashboard(), sink)
            .await;

        assert_eq!(result.content, "Use the metrics tab.");
        assert!(!result.is_streaming);
        assert_eq!(events.lock().unwrap().len(), 5);
        let requests = mock.requests();
        let sent = agent_request(&requests[0]);
        assert!(sent.stream);
        assert_eq!(sent.agent.name, "CauldronOS Assistant");
    }

    #[tokio::test]
    async fn test_send_message_streaming_falls_back_to_response() {
        let mock = MockTransport::new();
        mock.push_stream(vec![
            Ok(StreamChunk::Start),
            Ok(StreamChunk::Response(SwarmResponse::reply("```\nls\n```"))),
        ]);
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .send_message_streaming("list files", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, "```\nls\n```");
        assert_eq!(result.kind, MessageType::Markdown);
        assert_eq!(*events.lock().unwrap(), vec![StreamEvent::Start]);
    }

    #[tokio::test]
    async fn test_send_message_streaming_open_failure() {
        let mock = MockTransport::new();
        mock.push_error(SwarmError::Request("refused".into()));
        let (events, sink) = collect_events();
        let result = engine(&mock)
            .send_message_streaming("hi", &ContextVars::new(), sink)
            .await;

        assert_eq!(result.content, MESSAGE_ERROR_TEXT);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Running { step: 2 }.to_string(), "running(2)");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_step_defaults_from_config() {
        let config = SwarmConfig {
            default_model: "gemma2-9b-it".into(),
            default_max_tokens: 1024,
            ..SwarmConfig::default()
        };
        let defaults = StepDefaults::from(&config);
        assert_eq!(defaults.model, "gemma2-9b-it");
        assert_eq!(defaults.max_tokens, 1024);
        assert!((defaults.temperature - 0.7).abs() < f32::EPSILON);
    }
}
