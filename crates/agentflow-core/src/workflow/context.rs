//! Run-scoped execution context.
//!
//! `ExecutionContext` is the mutable key-value store that flows through one
//! run. It holds each executed node's output under the node's key
//! (`{key: {"output": ...}}`) next to two reserved entries: `trigger`
//! (`{"data": <payload>}`) and `execution_id`. Credentials are held beside
//! the store rather than in it, so templates can never interpolate them.
//!
//! A context is created per run and discarded when the run ends; it is never
//! shared between runs. Execution within a run is sequential, so no
//! synchronization is needed.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Integration credentials keyed by provider name (e.g. `"slack"`).
pub type Credentials = BTreeMap<String, Value>;

/// Reserved key holding `{"data": <trigger payload>}`.
pub const TRIGGER_KEY: &str = "trigger";

/// Reserved key holding the run id as a string.
pub const EXECUTION_ID_KEY: &str = "execution_id";

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    execution_id: Uuid,
    values: Map<String, Value>,
    credentials: Credentials,
}

impl ExecutionContext {
    /// A fresh context seeded with the trigger payload.
    pub fn new(execution_id: Uuid, trigger_data: Value, credentials: Credentials) -> Self {
        let mut values = Map::new();
        values.insert(TRIGGER_KEY.to_string(), json!({ "data": trigger_data }));
        values.insert(
            EXECUTION_ID_KEY.to_string(),
            Value::String(execution_id.to_string()),
        );
        Self {
            execution_id,
            values,
            credentials,
        }
    }

    /// Rebuild a context from a snapshot taken with [`ExecutionContext::snapshot`].
    ///
    /// Non-object snapshots yield an empty store (reserved keys included).
    pub fn restore(execution_id: Uuid, snapshot: Value, credentials: Credentials) -> Self {
        let mut context = Self::new(execution_id, Value::Null, credentials);
        if let Value::Object(map) = snapshot {
            context.values.extend(map);
        }
        context
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// The triggering payload (`trigger.data`).
    pub fn trigger_data(&self) -> &Value {
        self.values
            .get(TRIGGER_KEY)
            .and_then(|t| t.get("data"))
            .unwrap_or(&Value::Null)
    }

    /// Record a node's output under `key`.
    pub fn set_output(&mut self, key: &str, output: Value) {
        if key == TRIGGER_KEY || key == EXECUTION_ID_KEY {
            tracing::warn!(key, "node key shadows a reserved context entry");
        }
        self.values
            .insert(key.to_string(), json!({ "output": output }));
    }

    /// A previously recorded node output.
    pub fn output(&self, key: &str) -> Option<&Value> {
        self.values.get(key).and_then(|entry| entry.get("output"))
    }

    /// Credentials for one integration provider.
    pub fn credentials(&self, provider: &str) -> Option<&Value> {
        self.credentials.get(provider)
    }

    /// The template-visible store, for variable resolution.
    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// A serializable copy of the store (credentials excluded).
    pub fn snapshot(&self) -> Value {
        self.as_value()
    }
}
