//! Graph construction: node registration, dependency inference, naming,
//! and compilation into the declarative document form.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::args::{self, ArgValue};
use crate::config::EngineConfig;
use crate::doc::{GraphDoc, NodeRecord};
use crate::error::TaskError;
use crate::executor::TaskGraph;
use crate::graph::DependencyGraph;
use crate::node::{NodePayload, TaskNode, Work};

/// Per-node construction options.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// Explicit display name; must be unique within the builder.
    pub name: Option<String>,
    /// Whether calls for this node may receive parent outputs as stored
    /// references instead of materialized values.
    pub accepts_stored_refs: bool,
}

impl NodeOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_stored_refs(mut self) -> Self {
        self.accepts_stored_refs = true;
        self
    }
}

/// Accumulates nodes and the dependency edges implied by their arguments.
pub struct GraphBuilder {
    pub id: Uuid,
    pub name: String,
    config: EngineConfig,
    nodes: HashMap<Uuid, TaskNode>,
    names: HashSet<String>,
    deps: DependencyGraph,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, EngineConfig::from_env())
    }

    pub fn with_config(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config,
            nodes: HashMap::new(),
            names: HashSet::new(),
            deps: DependencyGraph::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_name(&self, id: Uuid) -> Option<&str> {
        self.nodes.get(&id).map(|node| node.name.as_str())
    }

    /// Create an Input node. Its value is supplied at execution time or
    /// falls back to `default`; running with neither fails `MissingInput`.
    pub fn input(
        &mut self,
        name: impl Into<String>,
        default: Option<Value>,
    ) -> Result<Uuid, TaskError> {
        let payload = NodePayload::Input { default };
        self.register(payload, None, Value::Null, Vec::new(), NodeOptions::named(name))
    }

    /// Create a RemoteCall node from inline work or a registered function.
    pub fn remote_call(
        &mut self,
        work: Work,
        call_args: &Arc<ArgValue>,
        options: NodeOptions,
    ) -> Result<Uuid, TaskError> {
        let (payload, inline) = match work {
            Work::Inline(function) => (NodePayload::RemoteCall { function: None }, Some(function)),
            Work::Registered(name) => (
                NodePayload::RemoteCall {
                    function: Some(name),
                },
                None,
            ),
        };
        let parents = args::collect_node_refs(call_args);
        let template = args::escape(call_args);
        self.register(payload, inline, template, parents, options)
    }

    /// Create a DataQuery node; queries always require the remote source.
    pub fn data_query(
        &mut self,
        source: impl Into<String>,
        params: &Arc<ArgValue>,
        options: NodeOptions,
    ) -> Result<Uuid, TaskError> {
        let parents = args::collect_node_refs(params);
        let template = args::escape(params);
        let payload = NodePayload::DataQuery {
            source: source.into(),
        };
        self.register(payload, None, template, parents, options)
    }

    /// Create a StructuredQuery node; same shape as `data_query`.
    pub fn structured_query(
        &mut self,
        query: impl Into<String>,
        params: &Arc<ArgValue>,
        options: NodeOptions,
    ) -> Result<Uuid, TaskError> {
        let parents = args::collect_node_refs(params);
        let template = args::escape(params);
        let payload = NodePayload::StructuredQuery {
            query: query.into(),
        };
        self.register(payload, None, template, parents, options)
    }

    /// Manual ordering edge between two registered nodes, without a data
    /// dependency.
    pub fn add_dependency(&mut self, parent: Uuid, child: Uuid) -> Result<(), TaskError> {
        if !self.nodes.contains_key(&parent) {
            return Err(TaskError::UnknownNode(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(TaskError::UnknownNode(child));
        }
        self.deps.add_edge(parent, child);
        Ok(())
    }

    fn register(
        &mut self,
        payload: NodePayload,
        inline: Option<crate::node::InlineFn>,
        template: Value,
        parents: Vec<Uuid>,
        options: NodeOptions,
    ) -> Result<Uuid, TaskError> {
        for parent in &parents {
            if !self.nodes.contains_key(parent) {
                return Err(TaskError::UnknownNode(*parent));
            }
        }

        let id = Uuid::new_v4();
        self.deps.add_node(id, &parents)?;

        // Name resolution happens after edges exist; a clash unwinds the
        // partial registration.
        let name = match self.claim_name(id, payload.kind().label(), options.name) {
            Ok(name) => name,
            Err(err) => {
                self.deps.remove(id);
                return Err(err);
            }
        };

        debug!(node = %name, kind = ?payload.kind(), parents = parents.len(), "registered node");

        let mut node = TaskNode::new(id, name, payload, template, parents);
        if let Some(function) = inline {
            node = node.with_inline(function);
        }
        node.accepts_stored_refs = options.accepts_stored_refs;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Reserve a display name: explicit names must be free, synthesized
    /// names append an increasingly specific id suffix. The suffix is
    /// bounded by the id's hex representation; exhausting it mints a fresh
    /// id and restarts, which terminates because ids are effectively
    /// unique.
    fn claim_name(
        &mut self,
        id: Uuid,
        label: &str,
        explicit: Option<String>,
    ) -> Result<String, TaskError> {
        if let Some(name) = explicit {
            if !self.names.insert(name.clone()) {
                return Err(TaskError::DuplicateName(name));
            }
            return Ok(name);
        }

        let mut hex = id.simple().to_string();
        loop {
            let start = self.config.name_prefix_len.min(hex.len());
            for len in start..=hex.len() {
                let candidate = format!("{label}-{}", &hex[..len]);
                if self.names.insert(candidate.clone()) {
                    return Ok(candidate);
                }
            }
            hex = Uuid::new_v4().simple().to_string();
        }
    }

    /// Topologically sort all registered nodes and emit the declarative
    /// document. Inline work cannot cross the process boundary and fails
    /// compilation.
    pub fn compile(&self, name_override: Option<&str>) -> Result<GraphDoc, TaskError> {
        let order = self.deps.topo_sort()?;
        let mut records = Vec::with_capacity(order.len());
        for id in order {
            let node = self
                .nodes
                .get(&id)
                .ok_or(TaskError::UnknownNode(id))?;
            if node.inline.is_some() {
                return Err(TaskError::InlineWork {
                    node: node.name.clone(),
                });
            }
            records.push(NodeRecord {
                id,
                name: node.name.clone(),
                payload: node.payload.clone(),
                args: node.args_template.clone(),
                parents: self.deps.parents_of(id).to_vec(),
            });
        }
        Ok(GraphDoc {
            id: self.id,
            name: name_override.unwrap_or(&self.name).to_string(),
            nodes: records,
        })
    }

    /// Freeze into a runnable [`TaskGraph`] bound to a remote executor
    /// and codec. Equivalent to [`TaskGraph::from_builder`].
    pub fn build(
        self,
        executor: Arc<dyn crate::remote::RemoteExecutor>,
        codec: Arc<dyn crate::remote::Codec>,
    ) -> Result<TaskGraph, TaskError> {
        TaskGraph::from_builder(self, executor, codec)
    }

    /// Freeze the builder into its immutable execution parts. Cycle
    /// detection happens here, before anything runs.
    pub(crate) fn freeze(
        self,
    ) -> Result<(HashMap<Uuid, Arc<TaskNode>>, DependencyGraph, EngineConfig, String), TaskError>
    {
        self.deps.topo_sort()?;
        let nodes = self
            .nodes
            .into_iter()
            .map(|(id, node)| (id, Arc::new(node)))
            .collect();
        Ok((nodes, self.deps, self.config, self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use serde_json::json;

    fn noop() -> Work {
        Work::Registered("noop".into())
    }

    #[test]
    fn infers_dependencies_from_arguments() {
        let mut builder = GraphBuilder::new("demo");
        let a = builder.input("a", Some(json!(1))).unwrap();
        let b = builder
            .remote_call(
                noop(),
                &ArgValue::list([ArgValue::node(a), ArgValue::data(2)]),
                NodeOptions::default(),
            )
            .unwrap();

        let doc = builder.compile(None).unwrap();
        let record = doc.node(b).unwrap();
        assert_eq!(record.parents, vec![a]);
        assert_eq!(doc.nodes[0].id, a);
    }

    #[test]
    fn duplicate_name_unwinds_registration() {
        let mut builder = GraphBuilder::new("demo");
        let a = builder.input("a", None).unwrap();
        let err = builder.remote_call(
            noop(),
            &ArgValue::list([ArgValue::node(a)]),
            NodeOptions::named("a"),
        );
        assert!(matches!(err, Err(TaskError::DuplicateName(name)) if name == "a"));
        // The failed registration left no trace.
        assert_eq!(builder.len(), 1);
        let doc = builder.compile(None).unwrap();
        assert_eq!(doc.nodes.len(), 1);
    }

    #[test]
    fn synthesized_names_are_collision_free() {
        let mut builder = GraphBuilder::new("demo");
        let args = ArgValue::list([]);
        let a = builder
            .remote_call(noop(), &args, NodeOptions::default())
            .unwrap();
        let b = builder
            .remote_call(noop(), &args, NodeOptions::default())
            .unwrap();
        let name_a = builder.node_name(a).unwrap().to_string();
        let name_b = builder.node_name(b).unwrap().to_string();
        assert_ne!(name_a, name_b);
        assert!(name_a.starts_with(NodeKind::RemoteCall.label()));
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut builder = GraphBuilder::new("demo");
        let ghost = Uuid::new_v4();
        let err = builder.remote_call(
            noop(),
            &ArgValue::list([ArgValue::node(ghost)]),
            NodeOptions::default(),
        );
        assert!(matches!(err, Err(TaskError::UnknownNode(id)) if id == ghost));
    }

    #[test]
    fn inline_work_cannot_compile() {
        let mut builder = GraphBuilder::new("demo");
        builder
            .remote_call(
                Work::Inline(Arc::new(|_| Ok(json!(1)))),
                &ArgValue::list([]),
                NodeOptions::named("inline-1"),
            )
            .unwrap();
        let err = builder.compile(None);
        assert!(matches!(err, Err(TaskError::InlineWork { node }) if node == "inline-1"));
    }

    #[test]
    fn manual_dependency_orders_without_data_flow() {
        let mut builder = GraphBuilder::new("demo");
        let a = builder.input("a", Some(json!(1))).unwrap();
        let b = builder
            .remote_call(noop(), &ArgValue::list([]), NodeOptions::named("b"))
            .unwrap();
        builder.add_dependency(a, b).unwrap();

        let doc = builder.compile(None).unwrap();
        assert_eq!(doc.node(b).unwrap().parents, vec![a]);
    }
}
