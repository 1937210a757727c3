//! OpenTelemetry GenAI Semantic Convention attribute constants.
//!
//! The AI node handler in `agentflow-core` records these names on its
//! `gen_ai.chat` span; consumers that post-process exported spans can match
//! on them here instead of repeating the literals.
//!
//! Span naming convention: `"gen_ai.{operation}"` (e.g., `"gen_ai.chat"`)

// --- Required attributes ---

/// The name of the operation being performed (always "chat" for AI nodes).
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The provider that answered (e.g., "anthropic", "ollama").
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

// --- Recommended attributes ---

/// The model requested by the node, or the provider default.
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

/// The model reported by the provider response.
pub const GEN_AI_RESPONSE_MODEL: &str = "gen_ai.response.model";

pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

// --- Engine attributes ---

/// Cost of the call in USD, from the price table.
pub const AGENTFLOW_COST_USD: &str = "agentflow.cost_usd";

/// The graph node that issued the call.
pub const AGENTFLOW_NODE_ID: &str = "agentflow.node.id";

// --- Operation name values ---

/// Standard chat completion operation.
pub const OP_CHAT: &str = "chat";

/// Span name for AI node calls.
pub const SPAN_CHAT: &str = "gen_ai.chat";
