//! Compiled-graph runner: execute a [`GraphDoc`] without its builder.
//!
//! Where the immediate executor dispatches as the caller wires nodes up,
//! the compiled runner takes the frozen document form, re-instantiates the
//! node set, and runs it through the same engine. Compiled runs hand
//! results between nodes as stored references whenever the executor
//! produces them, materializing only on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::doc::GraphDoc;
use crate::error::TaskError;
use crate::executor::{GraphStatus, TaskGraph};
use crate::graph::DependencyGraph;
use crate::node::TaskNode;
use crate::remote::{Codec, RemoteExecutor};

/// Runs compiled graph documents against a remote executor.
///
/// Registered documents are kept by graph identity so a caller can
/// re-submit by id without shipping the document again.
pub struct CompiledRunner {
    executor: Arc<dyn RemoteExecutor>,
    codec: Arc<dyn Codec>,
    config: EngineConfig,
    registry: Mutex<HashMap<Uuid, GraphDoc>>,
}

impl CompiledRunner {
    pub fn new(executor: Arc<dyn RemoteExecutor>, codec: Arc<dyn Codec>) -> Self {
        Self::with_config(executor, codec, EngineConfig::default())
    }

    pub fn with_config(
        executor: Arc<dyn RemoteExecutor>,
        codec: Arc<dyn Codec>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor,
            codec,
            config,
            registry: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, GraphDoc>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a document for later execution by id. Re-registering the
    /// same graph id replaces the stored document.
    pub fn register(&self, doc: GraphDoc) -> Uuid {
        let id = doc.id;
        debug!(graph = %doc.name, %id, nodes = doc.nodes.len(), "registering compiled graph");
        self.registry().insert(id, doc);
        id
    }

    pub fn registered(&self, id: Uuid) -> Option<GraphDoc> {
        self.registry().get(&id).cloned()
    }

    /// Instantiate a registered document and start it.
    pub fn start_registered(
        &self,
        id: Uuid,
        inputs: HashMap<String, Value>,
    ) -> Result<TaskGraph, TaskError> {
        let doc = self.registered(id).ok_or(TaskError::UnknownNode(id))?;
        self.start(&doc, inputs)
    }

    /// Instantiate the document into a live graph and start it.
    ///
    /// Every node is rebuilt from its record with stored-reference
    /// acceptance on: compiled calls receive parents as references when
    /// the executor produced them, and the engine falls back to a single
    /// materialized re-submission if a call rejects them.
    pub fn start(
        &self,
        doc: &GraphDoc,
        inputs: HashMap<String, Value>,
    ) -> Result<TaskGraph, TaskError> {
        let graph = self.instantiate(doc)?;
        graph.run(inputs)?;
        Ok(graph)
    }

    /// Run a document to completion.
    pub async fn execute(
        &self,
        doc: &GraphDoc,
        inputs: HashMap<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<TaskGraph, TaskError> {
        let graph = self.start(doc, inputs)?;
        match graph.wait(timeout).await? {
            GraphStatus::Completed | GraphStatus::Cancelled => Ok(graph),
            status => Err(TaskError::Internal(format!(
                "graph '{}' stopped in non-terminal status {status:?}",
                doc.name
            ))),
        }
    }

    /// Rebuild the node set and dependency graph from the document.
    pub fn instantiate(&self, doc: &GraphDoc) -> Result<TaskGraph, TaskError> {
        let mut nodes: HashMap<Uuid, Arc<TaskNode>> = HashMap::with_capacity(doc.nodes.len());
        let mut deps = DependencyGraph::new();

        for record in &doc.nodes {
            deps.add_node(record.id, &[])?;
            let node = TaskNode::new(
                record.id,
                record.name.clone(),
                record.payload.clone(),
                record.args.clone(),
                record.parents.clone(),
            )
            .with_stored_refs(true);
            nodes.insert(record.id, Arc::new(node));
        }
        for record in &doc.nodes {
            for parent in &record.parents {
                if !deps.contains(*parent) {
                    return Err(TaskError::UnknownNode(*parent));
                }
                deps.add_edge(*parent, record.id);
            }
        }
        // Documents are emitted in execution order, but a hand-written or
        // tampered one can still carry a cycle.
        deps.topo_sort()?;

        Ok(TaskGraph::new(
            doc.name.clone(),
            nodes,
            deps,
            self.config.clone(),
            Arc::clone(&self.executor),
            Arc::clone(&self.codec),
        ))
    }
}
