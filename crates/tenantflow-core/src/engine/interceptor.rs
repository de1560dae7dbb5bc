//! Node interception contract between the engine and this crate
//!
//! The engine calls [`NodeInterceptor::prepare_node`] for every node
//! configuration it instantiates and [`NodeInterceptor::on_input`] for every
//! message delivered to that node.

use serde_json::{json, Value};

use crate::domain::FlowRecord;

const CALL_CONTEXT: &str = "callContext";

pub trait NodeInterceptor: Send + Sync {
    /// Node configuration handed to the engine for `record`
    fn prepare_node(&self, record: &FlowRecord) -> Value;

    /// Adjust an inbound message before the node sees it
    fn on_input(&self, config: &Value, msg: &mut Value);
}

/// Carries the owning scope of a node into every message it handles
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageContextInjector;

impl NodeInterceptor for MessageContextInjector {
    fn prepare_node(&self, record: &FlowRecord) -> Value {
        let mut node = record.node.clone();
        if let (Some(scope), Value::Object(fields)) = (&record.scope, &mut node) {
            fields
                .entry(CALL_CONTEXT)
                .or_insert_with(|| json!({ "scope": scope }));
        }
        node
    }

    fn on_input(&self, config: &Value, msg: &mut Value) {
        let Value::Object(fields) = msg else {
            return;
        };
        match config.get(CALL_CONTEXT) {
            Some(ctx) => {
                fields.insert(CALL_CONTEXT.to_string(), ctx.clone());
            }
            None => {
                fields.remove(CALL_CONTEXT);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Scope;

    #[test]
    fn test_prepare_node_adds_scope_once() {
        let injector = MessageContextInjector;
        let scoped = FlowRecord::new("n1", Some(Scope::new("A").unwrap()), json!({"id": "n1"}));
        assert_eq!(
            injector.prepare_node(&scoped),
            json!({"id": "n1", "callContext": {"scope": "A"}})
        );

        let explicit = FlowRecord::new(
            "n2",
            Some(Scope::new("A").unwrap()),
            json!({"id": "n2", "callContext": {"tenantId": "t"}}),
        );
        assert_eq!(injector.prepare_node(&explicit)["callContext"], json!({"tenantId": "t"}));

        let unscoped = FlowRecord::new("n3", None, json!({"id": "n3"}));
        assert_eq!(injector.prepare_node(&unscoped), json!({"id": "n3"}));
    }

    #[test]
    fn test_on_input_overrides_message_context() {
        let injector = MessageContextInjector;
        let config = json!({"id": "n1", "callContext": {"scope": "A"}});

        let mut msg = json!({"payload": 1, "callContext": {"scope": "B"}});
        injector.on_input(&config, &mut msg);
        assert_eq!(msg["callContext"], json!({"scope": "A"}));

        let mut msg = json!({"payload": 1, "callContext": {"scope": "B"}});
        injector.on_input(&json!({"id": "n3"}), &mut msg);
        assert!(msg.get("callContext").is_none());
    }
}
