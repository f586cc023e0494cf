//! Declarative compiled-graph document.
//!
//! The document is the only persisted/transmitted representation of a
//! compiled graph: an ordered list of node records sufficient for the
//! compiled-graph runner (or a remote scheduler) to execute without the
//! originating builder.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TaskError;
use crate::node::NodePayload;

/// One node record: stable identity, kind-specific payload, escaped
/// argument template, and parent identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub payload: NodePayload,
    pub args: Value,
    pub parents: Vec<Uuid>,
}

/// A compiled graph: node records in execution (topological) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDoc {
    pub id: Uuid,
    pub name: String,
    pub nodes: Vec<NodeRecord>,
}

impl GraphDoc {
    pub fn to_json(&self) -> Result<String, TaskError> {
        serde_json::to_string(self).map_err(|err| TaskError::Codec(err.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, TaskError> {
        serde_json::from_str(raw).map_err(|err| TaskError::Codec(err.to_string()))
    }

    pub fn node(&self, id: Uuid) -> Option<&NodeRecord> {
        self.nodes.iter().find(|record| record.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_round_trips_through_json() {
        let parent = Uuid::new_v4();
        let doc = GraphDoc {
            id: Uuid::new_v4(),
            name: "demo".into(),
            nodes: vec![
                NodeRecord {
                    id: parent,
                    name: "input-a".into(),
                    payload: NodePayload::Input {
                        default: Some(json!(5)),
                    },
                    args: Value::Null,
                    parents: Vec::new(),
                },
                NodeRecord {
                    id: Uuid::new_v4(),
                    name: "call-b".into(),
                    payload: NodePayload::RemoteCall {
                        function: Some("double".into()),
                    },
                    args: json!([{ crate::args::NODE_REF_KEY: parent.to_string() }]),
                    parents: vec![parent],
                },
            ],
        };

        let raw = doc.to_json().unwrap();
        let back = GraphDoc::from_json(&raw).unwrap();
        assert_eq!(back.nodes.len(), 2);
        assert_eq!(back.nodes[1].parents, vec![parent]);
        assert!(matches!(
            back.nodes[0].payload,
            NodePayload::Input { default: Some(_) }
        ));
        assert!(back.node(parent).is_some());
    }
}
