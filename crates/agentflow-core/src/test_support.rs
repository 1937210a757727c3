//! Scripted fakes shared by the unit tests in this crate.
//!
//! Each fake implements the same trait as its production counterpart and
//! records what it was asked to do.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use agentflow_types::config::RoutingConfig;
use agentflow_types::graph::{Node, NodeKind};
use agentflow_types::llm::{ChatMessage, ChatRequest, ChatResponse, LlmError};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::handler::{
    HandlerError, HandlerFuture, HandlerInput, HandlerOutcome, NodeHandler, NodeOutput,
};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::LlmProvider;
use crate::llm::router::ProviderRouter;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::workflow::context::{Credentials, ExecutionContext};
use crate::workflow::resolver::resolve_value;

// ---------------------------------------------------------------------------
// Graph helpers
// ---------------------------------------------------------------------------

pub fn node(id: &str, node_type: &str, config: Value) -> Node {
    Node {
        id: id.to_string(),
        node_type: node_type.to_string(),
        subtype: None,
        label: None,
        config,
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

pub fn default_map() -> BTreeMap<String, String> {
    RoutingConfig::default().provider_map
}

pub fn request(model: Option<&str>) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user("hi")],
        model: model.map(str::to_string),
        tools: vec![],
        temperature: 0.7,
        max_tokens: 64,
    }
}

/// Provider that answers from a script. An exhausted script replies "ok".
#[derive(Clone)]
pub struct ScriptedProvider {
    name: String,
    script: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    calls: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn boxed(&self) -> BoxLlmProvider {
        BoxLlmProvider::new(self.clone())
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "scripted-default"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.calls.lock().unwrap().push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()));
        let content = next?;
        Ok(ChatResponse {
            content,
            tool_calls: vec![],
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model().to_string()),
            provider: self.name.clone(),
            input_tokens: 10,
            output_tokens: 5,
            cost: 0.0015,
        })
    }
}

/// A router over the given scripted providers with the default routing table.
pub fn router(providers: &[&ScriptedProvider]) -> ProviderRouter {
    let routing = RoutingConfig::default();
    ProviderRouter::new(
        providers.iter().map(|p| p.boxed()).collect(),
        &routing.fallback_order,
        routing.provider_map,
    )
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Transport for code paths that must not send anything.
pub struct NullTransport;

impl HttpTransport for NullTransport {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>,
    > {
        Box::pin(async move {
            Err(TransportError::Other(format!(
                "unexpected request to {}",
                request.url
            )))
        })
    }
}

/// Transport that records requests and answers from a script. An exhausted
/// script answers `200 {}`.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    script: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: BTreeMap::from([("content-type".to_string(), "text/plain".to_string())]),
            body: body.to_string(),
        }));
        self
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for RecordingTransport {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(HttpResponse {
                    status: 200,
                    headers: BTreeMap::new(),
                    body: "{}".to_string(),
                })
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Run-scoped state a handler needs, built without an orchestrator.
pub struct HandlerHarness {
    pub context: ExecutionContext,
    pub router: ProviderRouter,
    pub step_id: Uuid,
    credentials: Credentials,
}

impl HandlerHarness {
    pub fn new(trigger_data: Value) -> Self {
        Self::with_providers(trigger_data, vec![])
    }

    pub fn with_providers(trigger_data: Value, providers: Vec<&ScriptedProvider>) -> Self {
        Self {
            context: ExecutionContext::new(Uuid::now_v7(), trigger_data, Credentials::new()),
            router: router(&providers),
            step_id: Uuid::now_v7(),
            credentials: Credentials::new(),
        }
    }

    /// Add integration credentials, keeping recorded outputs.
    pub fn credential(mut self, provider: &str, value: Value) -> Self {
        self.credentials.insert(provider.to_string(), value);
        self.context = ExecutionContext::restore(
            self.context.execution_id(),
            self.context.snapshot(),
            self.credentials.clone(),
        );
        self
    }
}

/// Resolve `config` against the harness context and run `handler` on it.
pub async fn run_handler(
    handler: &dyn NodeHandler,
    harness: &HandlerHarness,
    node_type: &str,
    subtype: Option<&str>,
    config: Value,
) -> Result<HandlerOutcome, HandlerError> {
    let mut node = node("under_test", node_type, config);
    node.subtype = subtype.map(str::to_string);
    let resolved = resolve_value(&node.config, &harness.context.as_value());
    let input = HandlerInput {
        node: &node,
        config: &resolved,
        step_id: harness.step_id,
        context: &harness.context,
        router: &harness.router,
    };
    handler.execute(&input).await
}

/// Handler that plays back a script of results and records which nodes it ran.
/// An exhausted script completes with `{"node": <id>}`.
#[derive(Clone)]
pub struct ScriptedHandler {
    kind: NodeKind,
    script: Arc<Mutex<VecDeque<Result<NodeOutput, HandlerError>>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHandler {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            script: Arc::default(),
            seen: Arc::default(),
        }
    }

    pub fn then_fail(self, error: HandlerError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn then_output(self, output: NodeOutput) -> Self {
        self.script.lock().unwrap().push_back(Ok(output));
        self
    }

    /// Node ids in invocation order, one entry per attempt.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl NodeHandler for ScriptedHandler {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(input.node.id.clone());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result.map(HandlerOutcome::Completed),
                None => Ok(HandlerOutcome::Completed(NodeOutput::data(
                    json!({ "node": input.node.id }),
                ))),
            }
        })
    }
}
