//! Human checkpoint nodes.
//!
//! A human node never completes on its own: it always asks for approval,
//! which pauses the run at this step.

use agentflow_types::graph::NodeKind;

use super::{ApprovalRequest, HandlerFuture, HandlerInput, HandlerOutcome, NodeHandler};

pub const DEFAULT_APPROVAL_MESSAGE: &str = "Approval required";

pub struct HumanHandler;

impl NodeHandler for HumanHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Human
    }

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let message = input
                .str_field("message")
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_APPROVAL_MESSAGE)
                .to_string();
            Ok(HandlerOutcome::ApprovalRequired(ApprovalRequest {
                step_id: input.step_id,
                message,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_handler, HandlerHarness};
    use serde_json::json;

    #[tokio::test]
    async fn test_always_requests_approval_with_step_id() {
        let harness = HandlerHarness::new(json!({}));
        let outcome = run_handler(&HumanHandler, &harness, "human", None, json!({}))
            .await
            .unwrap();
        match outcome {
            HandlerOutcome::ApprovalRequired(req) => {
                assert_eq!(req.step_id, harness.step_id);
                assert_eq!(req.message, DEFAULT_APPROVAL_MESSAGE);
            }
            other => panic!("expected approval request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_uses_configured_message() {
        let harness = HandlerHarness::new(json!({}));
        let outcome = run_handler(
            &HumanHandler,
            &harness,
            "human",
            None,
            json!({"message": "Check the refund"}),
        )
        .await
        .unwrap();
        assert!(matches!(
            outcome,
            HandlerOutcome::ApprovalRequired(ApprovalRequest { ref message, .. }) if message == "Check the refund"
        ));
    }
}
