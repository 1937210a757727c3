//! Logic nodes: if/else, switch, and loop.
//!
//! Every variant reports a `branch` (or list) in its output; the scheduler
//! reads `branch` to decide which labeled outgoing edges are followed.

use agentflow_types::graph::NodeKind;
use serde_json::{json, Value};

use super::{HandlerError, HandlerFuture, HandlerInput, HandlerOutcome, NodeHandler, NodeOutput};

pub struct LogicHandler;

impl NodeHandler for LogicHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Logic
    }

    fn execute<'a>(&'a self, input: &'a HandlerInput<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let data = match input.selector("logic_type", "if_else").as_str() {
                "if_else" => if_else(input.config)?,
                "switch" => switch(input.config),
                "loop" => loop_items(input.config),
                other => {
                    return Err(HandlerError::validation(format!(
                        "unknown logic type: {other}"
                    )));
                }
            };
            Ok(HandlerOutcome::Completed(NodeOutput::data(data)))
        })
    }
}

fn if_else(config: &Value) -> Result<Value, HandlerError> {
    let empty = json!({});
    let condition = config.get("condition").unwrap_or(&empty);
    let blank = Value::String(String::new());
    let left = condition.get("left").unwrap_or(&blank);
    let right = condition.get("right").unwrap_or(&blank);
    let op = condition
        .get("operator")
        .and_then(Value::as_str)
        .unwrap_or("eq");

    let operator = Operator::parse(op)?;
    let branch = if operator.evaluate(left, right) {
        "true"
    } else {
        "false"
    };
    Ok(json!({ "branch": branch }))
}

fn switch(config: &Value) -> Value {
    let key = match config.get("value") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let branch = config
        .get("cases")
        .and_then(|cases| cases.get(&key))
        .cloned()
        .or_else(|| config.get("default").cloned())
        .unwrap_or_else(|| Value::String("default".to_string()));

    json!({ "branch": branch })
}

fn loop_items(config: &Value) -> Value {
    let items = config
        .get("items_expression")
        .or_else(|| config.get("items"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    json!({ "count": items.len(), "items": items })
}

// ---------------------------------------------------------------------------
// Comparison operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
}

impl Operator {
    fn parse(op: &str) -> Result<Self, HandlerError> {
        Ok(match op {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            other => return Err(HandlerError::validation(format!("unknown operator: {other}"))),
        })
    }

    /// Incomparable operands evaluate to `false`.
    fn evaluate(self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering;

        match self {
            Operator::Eq => loosely_equal(left, right),
            Operator::Ne => !loosely_equal(left, right),
            Operator::Gt => compare(left, right) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare(left, right) == Some(Ordering::Less),
            Operator::Lte => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
            Operator::Contains => {
                if is_falsy(left) {
                    false
                } else {
                    contains(left, right).unwrap_or(false)
                }
            }
            Operator::NotContains => {
                if is_falsy(left) {
                    true
                } else {
                    contains(left, right).map(|c| !c).unwrap_or(false)
                }
            }
        }
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => a == b,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// `None` when membership is undefined for the operand types.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)),
        Value::Array(items) => Some(items.iter().any(|item| loosely_equal(item, needle))),
        Value::Object(map) => needle.as_str().map(|key| map.contains_key(key)),
        _ => None,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_handler, HandlerHarness};

    async fn run(config: Value) -> Result<Value, HandlerError> {
        let mut harness = HandlerHarness::new(json!({"amount": 250, "tier": "gold", "tags": ["vip", "eu"]}));
        harness.context.set_output("score", json!({"value": 0.8, "items": [1, 2, 3]}));
        match run_handler(&LogicHandler, &harness, "logic", None, config).await? {
            HandlerOutcome::Completed(output) => Ok(output.data),
            other => panic!("logic should complete, got {other:?}"),
        }
    }

    fn condition(left: Value, operator: &str, right: Value) -> Value {
        json!({"logic_type": "if_else", "condition": {"left": left, "operator": operator, "right": right}})
    }

    #[tokio::test]
    async fn test_if_else_numeric_comparisons() {
        let cases = [
            ("gt", 100, "true"),
            ("gt", 250, "false"),
            ("gte", 250, "true"),
            ("lt", 300, "true"),
            ("lte", 249, "false"),
            ("eq", 250, "true"),
            ("ne", 250, "false"),
        ];
        for (op, right, expected) in cases {
            let out = run(condition(json!("{{trigger.data.amount}}"), op, json!(right)))
                .await
                .unwrap();
            assert_eq!(out["branch"], expected, "operator {op} against {right}");
        }
    }

    #[tokio::test]
    async fn test_if_else_float_against_integer() {
        let out = run(condition(json!("{{score.output.value}}"), "gte", json!(0.5))).await.unwrap();
        assert_eq!(out["branch"], "true");
        let out = run(condition(json!(1), "eq", json!(1.0))).await.unwrap();
        assert_eq!(out["branch"], "true");
    }

    #[tokio::test]
    async fn test_if_else_string_and_membership() {
        let out = run(condition(json!("{{trigger.data.tier}}"), "eq", json!("gold"))).await.unwrap();
        assert_eq!(out["branch"], "true");

        let out = run(condition(json!("{{trigger.data.tags}}"), "contains", json!("vip"))).await.unwrap();
        assert_eq!(out["branch"], "true");

        let out = run(condition(json!("hello world"), "contains", json!("xyz"))).await.unwrap();
        assert_eq!(out["branch"], "false");

        let out = run(condition(json!("hello world"), "not_contains", json!("xyz"))).await.unwrap();
        assert_eq!(out["branch"], "true");
    }

    #[tokio::test]
    async fn test_falsy_left_operand_membership() {
        let out = run(condition(json!(""), "contains", json!("a"))).await.unwrap();
        assert_eq!(out["branch"], "false");
        let out = run(condition(json!([]), "not_contains", json!("a"))).await.unwrap();
        assert_eq!(out["branch"], "true");
    }

    #[tokio::test]
    async fn test_incomparable_operands_are_false() {
        let out = run(condition(json!("abc"), "gt", json!(3))).await.unwrap();
        assert_eq!(out["branch"], "false");
        let out = run(condition(json!(42), "contains", json!(4))).await.unwrap();
        assert_eq!(out["branch"], "false");
        let out = run(condition(json!(42), "not_contains", json!(4))).await.unwrap();
        assert_eq!(out["branch"], "false");
    }

    #[tokio::test]
    async fn test_unknown_operator_is_validation_error() {
        let err = run(condition(json!(1), "approximately", json!(1))).await.unwrap_err();
        assert!(matches!(err, HandlerError::Validation(ref m) if m.contains("approximately")));
    }

    #[tokio::test]
    async fn test_unknown_logic_type_is_validation_error() {
        let err = run(json!({"logic_type": "goto"})).await.unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_switch_maps_value_to_branch() {
        let config = json!({
            "logic_type": "switch",
            "value": "{{trigger.data.tier}}",
            "cases": {"gold": "priority", "silver": "standard"},
            "default": "basic"
        });
        assert_eq!(run(config).await.unwrap()["branch"], "priority");

        let config = json!({"logic_type": "switch", "value": "bronze", "cases": {"gold": "priority"}, "default": "basic"});
        assert_eq!(run(config).await.unwrap()["branch"], "basic");

        let config = json!({"logic_type": "switch", "value": 2, "cases": {"2": "two"}});
        assert_eq!(run(config).await.unwrap()["branch"], "two");

        let config = json!({"logic_type": "switch", "value": "x", "cases": {}});
        assert_eq!(run(config).await.unwrap()["branch"], "default");
    }

    #[tokio::test]
    async fn test_loop_resolves_list_or_empty() {
        let config = json!({"logic_type": "loop", "items_expression": "{{score.output.items}}"});
        let out = run(config).await.unwrap();
        assert_eq!(out["items"], json!([1, 2, 3]));
        assert_eq!(out["count"], 3);

        let config = json!({"logic_type": "loop", "items_expression": "{{trigger.data.amount}}"});
        let out = run(config).await.unwrap();
        assert_eq!(out["items"], json!([]));
        assert_eq!(out["count"], 0);
    }
}
