//! Trigger nodes: run entry points.
//!
//! A trigger performs no I/O. It forwards the payload the orchestrator
//! already placed in the context, tagged with the declared trigger type.

use agentflow_types::graph::NodeKind;
use serde_json::json;

use super::{HandlerFuture, HandlerInput, HandlerOutcome, NodeHandler, NodeOutput};

pub struct TriggerHandler;

impl NodeHandler for TriggerHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Trigger
    }

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let trigger_type = input.selector("trigger_type", "manual");
            Ok(HandlerOutcome::Completed(NodeOutput::data(json!({
                "trigger_type": trigger_type,
                "payload": input.context.trigger_data(),
            }))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_handler, HandlerHarness};

    #[tokio::test]
    async fn test_forwards_payload_with_default_type() {
        let harness = HandlerHarness::new(json!({"order_id": 7}));
        let outcome = run_handler(&TriggerHandler, &harness, "trigger", None, json!({})).await;
        let HandlerOutcome::Completed(output) = outcome.unwrap() else {
            panic!("trigger should complete");
        };
        assert_eq!(output.data["trigger_type"], "manual");
        assert_eq!(output.data["payload"]["order_id"], 7);
        assert_eq!(output.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_declared_type_comes_from_config_or_subtype() {
        let harness = HandlerHarness::new(json!({}));
        let outcome = run_handler(
            &TriggerHandler,
            &harness,
            "trigger",
            Some("webhook"),
            json!({}),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Completed(ref o) if o.data["trigger_type"] == "webhook"));

        let outcome = run_handler(
            &TriggerHandler,
            &harness,
            "trigger",
            Some("webhook"),
            json!({"trigger_type": "schedule"}),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Completed(ref o) if o.data["trigger_type"] == "schedule"));
    }
}
