//! Argument trees: node-reference discovery, escaping, and resolution.
//!
//! Arguments to a node are arbitrary nested structures that may embed
//! references to other nodes. Three visitors share the tree shape:
//! - [`collect_node_refs`] finds the referenced nodes (dependency inference),
//! - [`escape`] produces a transmissible copy with value placeholders,
//! - [`resolve`] swaps placeholders for stored references or materialized
//!   values at dispatch time.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::TaskError;

/// Object key marking a value placeholder for a node reference.
pub const NODE_REF_KEY: &str = "__taskgraph_node_ref__";

/// Object key marking an opaque stored-reference to a node's result.
pub const STORED_REF_KEY: &str = "__taskgraph_stored_ref__";

/// One argument value: a JSON leaf, a node reference, or a container.
///
/// Containers hold `Arc`ed children so user code can share subtrees; the
/// visitors memoize by `Arc` identity and therefore visit a shared subtree
/// exactly once. Only `List` and `Map` are descended into: a `Data` leaf is
/// never inspected, even if it happens to contain a placeholder-shaped
/// object.
#[derive(Debug, Clone)]
pub enum ArgValue {
    /// Opaque JSON payload, passed through untouched.
    Data(Value),
    /// Reference to another node's output.
    NodeRef(Uuid),
    /// Ordered sequence of child arguments.
    List(Vec<Arc<ArgValue>>),
    /// Keyed mapping in insertion order. Order is preserved so dependency
    /// discovery (and the parent-failure tie-break built on it) stays
    /// deterministic.
    Map(Vec<(String, Arc<ArgValue>)>),
}

impl ArgValue {
    pub fn data(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(ArgValue::Data(value.into()))
    }

    pub fn node(id: Uuid) -> Arc<Self> {
        Arc::new(ArgValue::NodeRef(id))
    }

    pub fn list(items: impl IntoIterator<Item = Arc<ArgValue>>) -> Arc<Self> {
        Arc::new(ArgValue::List(items.into_iter().collect()))
    }

    pub fn map(entries: impl IntoIterator<Item = (String, Arc<ArgValue>)>) -> Arc<Self> {
        Arc::new(ArgValue::Map(entries.into_iter().collect()))
    }
}

/// Collect every node referenced anywhere in `root`, in first-seen order.
///
/// The traversal uses an explicit worklist with an identity-keyed visited
/// set, so a subtree referenced from two places is scanned once and cyclic
/// sharing cannot loop.
pub fn collect_node_refs(root: &Arc<ArgValue>) -> Vec<Uuid> {
    let mut visited: HashSet<*const ArgValue> = HashSet::new();
    let mut seen_ids: HashSet<Uuid> = HashSet::new();
    let mut found = Vec::new();
    let mut stack: Vec<Arc<ArgValue>> = vec![Arc::clone(root)];

    while let Some(current) = stack.pop() {
        if !visited.insert(Arc::as_ptr(&current)) {
            continue;
        }
        match current.as_ref() {
            ArgValue::Data(_) => {}
            ArgValue::NodeRef(id) => {
                if seen_ids.insert(*id) {
                    found.push(*id);
                }
            }
            ArgValue::List(items) => {
                // Reverse so the LIFO stack yields children in list order.
                for item in items.iter().rev() {
                    stack.push(Arc::clone(item));
                }
            }
            ArgValue::Map(entries) => {
                for (_, value) in entries.iter().rev() {
                    stack.push(Arc::clone(value));
                }
            }
        }
    }

    found
}

/// Serialize an argument tree, replacing each node reference with a value
/// placeholder carrying the node identity. The input is never mutated.
pub fn escape(root: &Arc<ArgValue>) -> Value {
    match root.as_ref() {
        ArgValue::Data(value) => value.clone(),
        ArgValue::NodeRef(id) => node_ref_placeholder(*id),
        ArgValue::List(items) => Value::Array(items.iter().map(escape).collect()),
        ArgValue::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(key.clone(), escape(value));
            }
            Value::Object(map)
        }
    }
}

/// How a parent's output is delivered to a dependent call.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Pass the opaque stored reference; the remote side fetches the value.
    Stored(String),
    /// Inline the materialized value.
    Materialized(Value),
}

/// Substitute every value placeholder in an escaped template.
///
/// `lookup` maps a referenced node id to its delivery form. A placeholder
/// whose node is unknown to the lookup is an internal error: readiness
/// evaluation guarantees every referenced parent finished first.
pub fn resolve(
    template: &Value,
    lookup: &dyn Fn(Uuid) -> Option<Resolution>,
) -> Result<Value, TaskError> {
    match template {
        Value::Object(map) => {
            if let Some(id) = placeholder_id(map) {
                return match lookup(id) {
                    Some(Resolution::Stored(reference)) => Ok(stored_ref_placeholder(&reference)),
                    Some(Resolution::Materialized(value)) => Ok(value),
                    None => Err(TaskError::Internal(format!(
                        "argument references node {id} with no available result"
                    ))),
                };
            }
            let mut resolved = Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve(value, lookup)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve(item, lookup)?);
            }
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Collect node ids referenced by placeholders in an escaped template.
/// Used by the compiled-graph runner, which only sees the document form.
pub fn template_node_refs(template: &Value) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    template_refs_inner(template, &mut seen, &mut found);
    found
}

fn template_refs_inner(template: &Value, seen: &mut HashSet<Uuid>, found: &mut Vec<Uuid>) {
    match template {
        Value::Object(map) => {
            if let Some(id) = placeholder_id(map) {
                if seen.insert(id) {
                    found.push(id);
                }
                return;
            }
            for value in map.values() {
                template_refs_inner(value, seen, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                template_refs_inner(item, seen, found);
            }
        }
        _ => {}
    }
}

fn placeholder_id(map: &Map<String, Value>) -> Option<Uuid> {
    if map.len() != 1 {
        return None;
    }
    map.get(NODE_REF_KEY)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn node_ref_placeholder(id: Uuid) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(NODE_REF_KEY.to_string(), Value::String(id.to_string()));
    Value::Object(map)
}

fn stored_ref_placeholder(reference: &str) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(
        STORED_REF_KEY.to_string(),
        Value::String(reference.to_string()),
    );
    Value::Object(map)
}

/// Extract the stored reference from a placeholder object, if present.
pub fn as_stored_ref(value: &Value) -> Option<&str> {
    value
        .as_object()
        .filter(|map| map.len() == 1)
        .and_then(|map| map.get(STORED_REF_KEY))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_refs_in_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let args = ArgValue::list([
            ArgValue::data(1),
            ArgValue::node(a),
            ArgValue::map([
                ("x".to_string(), ArgValue::node(b)),
                ("y".to_string(), ArgValue::node(a)),
            ]),
        ]);

        assert_eq!(collect_node_refs(&args), vec![a, b]);
    }

    #[test]
    fn shared_subtree_scanned_once() {
        let a = Uuid::new_v4();
        let shared = ArgValue::list([ArgValue::node(a), ArgValue::data("payload")]);
        let args = ArgValue::list([Arc::clone(&shared), Arc::clone(&shared), shared]);

        assert_eq!(collect_node_refs(&args), vec![a]);
    }

    #[test]
    fn data_leaves_are_not_descended() {
        let id = Uuid::new_v4();
        // A raw JSON object that merely looks like a placeholder is a leaf.
        let args = ArgValue::data(json!({ NODE_REF_KEY: id.to_string() }));
        assert!(collect_node_refs(&args).is_empty());
    }

    #[test]
    fn escape_replaces_refs_and_preserves_shape() {
        let a = Uuid::new_v4();
        let args = ArgValue::map([
            ("n".to_string(), ArgValue::data(5)),
            ("parent".to_string(), ArgValue::node(a)),
        ]);
        let escaped = escape(&args);
        assert_eq!(
            escaped,
            json!({ "n": 5, "parent": { NODE_REF_KEY: a.to_string() } })
        );
        assert_eq!(template_node_refs(&escaped), vec![a]);
    }

    #[test]
    fn resolve_materializes_and_passes_stored_refs() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let template = json!([
            { NODE_REF_KEY: a.to_string() },
            { NODE_REF_KEY: b.to_string() },
            42,
        ]);

        let resolved = resolve(&template, &|id| {
            if id == a {
                Some(Resolution::Materialized(json!(10)))
            } else {
                Some(Resolution::Stored("ref-b".to_string()))
            }
        })
        .unwrap();

        assert_eq!(
            resolved,
            json!([10, { STORED_REF_KEY: "ref-b" }, 42])
        );
        assert_eq!(as_stored_ref(&resolved[1]), Some("ref-b"));
    }

    #[test]
    fn resolve_errors_on_unknown_node() {
        let template = json!({ NODE_REF_KEY: Uuid::new_v4().to_string() });
        let result = resolve(&template, &|_| None);
        assert!(matches!(result, Err(TaskError::Internal(_))));
    }
}
