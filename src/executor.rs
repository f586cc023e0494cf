//! Execution engine: bounded dispatch, completion fan-out, aggregate status.
//!
//! A `TaskGraph` is the frozen, runnable form of a builder. Node work runs
//! on tokio tasks gated by a semaphore budget; every terminal transition is
//! funneled through a single completion loop which updates the status
//! buckets, re-evaluates child readiness, and invokes callbacks. Running
//! start checks on the loop task keeps a node's completion from recursively
//! starting children on the same call stack.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::args::{self, Resolution};
use crate::config::EngineConfig;
use crate::error::TaskError;
use crate::graph::DependencyGraph;
use crate::node::{DoneCallback, NodePayload, NodeState, TaskNode};
use crate::remote::{
    ArgEncoding, Codec, RemoteExecutor, StoredRef, SubmitError, SubmitRequest, SubmitResult,
};

/// Aggregate graph status, derived from the node buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl GraphStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GraphStatus::Completed | GraphStatus::Failed | GraphStatus::Cancelled
        )
    }
}

enum EngineEvent {
    /// Seed root nodes after `run()`.
    Start,
    /// A node reached a terminal state; callbacks ride along so they run
    /// on the loop, never on the completing worker's stack.
    NodeDone {
        id: Uuid,
        callbacks: Vec<DoneCallback>,
    },
    /// A node was reset by retry and needs readiness re-evaluation.
    Retried(Uuid),
    Cancel,
    Shutdown,
}

/// Per-status node buckets; always partition the node set exactly once.
#[derive(Debug, Default)]
struct Buckets {
    not_started: HashSet<Uuid>,
    running: HashSet<Uuid>,
    completed: HashSet<Uuid>,
    failed: HashSet<Uuid>,
    cancelled: HashSet<Uuid>,
}

impl Buckets {
    fn place(&mut self, id: Uuid, state: NodeState) {
        self.not_started.remove(&id);
        self.running.remove(&id);
        self.completed.remove(&id);
        self.failed.remove(&id);
        self.cancelled.remove(&id);
        match state {
            NodeState::Waiting | NodeState::Ready => self.not_started.insert(id),
            NodeState::Running => self.running.insert(id),
            NodeState::Succeeded => self.completed.insert(id),
            NodeState::Failed | NodeState::ParentFailed => self.failed.insert(id),
            NodeState::Cancelled => self.cancelled.insert(id),
        };
    }
}

struct GraphCore {
    buckets: Buckets,
    started: bool,
    cancel_requested: bool,
    /// First `Failed` node's error, re-raised by graph `wait()`.
    first_failure: Option<TaskError>,
    inputs: HashMap<String, Value>,
}

pub(crate) struct GraphShared {
    pub name: String,
    nodes: HashMap<Uuid, Arc<TaskNode>>,
    deps: DependencyGraph,
    executor: Arc<dyn RemoteExecutor>,
    codec: Arc<dyn Codec>,
    semaphore: Arc<Semaphore>,
    core: Mutex<GraphCore>,
    status_tx: watch::Sender<GraphStatus>,
}

impl GraphShared {
    fn core(&self) -> MutexGuard<'_, GraphCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn node(&self, id: Uuid) -> Option<Arc<TaskNode>> {
        self.nodes.get(&id).cloned()
    }

    /// Recompute the aggregate from the buckets and publish it if changed.
    /// The final terminal transition therefore fires exactly once, after
    /// every contributing node transition has been applied.
    fn publish_status(&self, core: &GraphCore) {
        let status = if !core.started && !core.cancel_requested {
            GraphStatus::NotStarted
        } else if !core.buckets.not_started.is_empty() || !core.buckets.running.is_empty() {
            GraphStatus::Running
        } else if !core.buckets.failed.is_empty() {
            GraphStatus::Failed
        } else if !core.buckets.cancelled.is_empty() {
            GraphStatus::Cancelled
        } else {
            GraphStatus::Completed
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// A runnable task graph (immediate executor).
///
/// Nodes start as soon as their parents finish; there is no compilation
/// step. Dropping the graph shuts the completion loop down; in-flight work
/// is left to finish on the runtime.
pub struct TaskGraph {
    shared: Arc<GraphShared>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    _loop_handle: JoinHandle<()>,
}

impl TaskGraph {
    pub(crate) fn new(
        name: String,
        nodes: HashMap<Uuid, Arc<TaskNode>>,
        deps: DependencyGraph,
        config: EngineConfig,
        executor: Arc<dyn RemoteExecutor>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        let mut buckets = Buckets::default();
        for id in nodes.keys() {
            buckets.place(*id, NodeState::Waiting);
        }
        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let (status_tx, _) = watch::channel(GraphStatus::NotStarted);
        let shared = Arc::new(GraphShared {
            name,
            nodes,
            deps,
            executor,
            codec,
            semaphore,
            core: Mutex::new(GraphCore {
                buckets,
                started: false,
                cancel_requested: false,
                first_failure: None,
                inputs: HashMap::new(),
            }),
            status_tx,
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = EngineLoop {
            shared: Arc::clone(&shared),
            events_tx: events_tx.clone(),
        };
        let loop_handle = tokio::spawn(engine.run(events_rx));

        Self {
            shared,
            events_tx,
            _loop_handle: loop_handle,
        }
    }

    /// Build a runnable graph from a builder. Cycle detection happens here.
    pub fn from_builder(
        builder: crate::builder::GraphBuilder,
        executor: Arc<dyn RemoteExecutor>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, TaskError> {
        let (nodes, deps, config, name) = builder.freeze()?;
        Ok(Self::new(name, nodes, deps, config, executor, codec))
    }

    pub fn node(&self, id: Uuid) -> Option<Arc<TaskNode>> {
        self.shared.node(id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<Arc<TaskNode>> {
        self.shared
            .nodes
            .values()
            .find(|node| node.name == name)
            .cloned()
    }

    pub fn status(&self) -> GraphStatus {
        *self.shared.status_tx.borrow()
    }

    /// Observe every aggregate status transition.
    pub fn subscribe(&self) -> watch::Receiver<GraphStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Start execution: roots dispatch immediately, everything else as its
    /// parents finish. Returns right away; use [`wait`] to block.
    pub fn run(&self, inputs: HashMap<String, Value>) -> Result<(), TaskError> {
        {
            let mut core = self.shared.core();
            if core.started {
                return Err(TaskError::Internal(format!(
                    "graph '{}' is already running",
                    self.shared.name
                )));
            }
            core.started = true;
            core.inputs = inputs;
            self.shared.publish_status(&core);
        }
        self.send(EngineEvent::Start);
        Ok(())
    }

    /// Block until the graph reaches a terminal status.
    ///
    /// A `Failed` graph re-raises the first failing node's error. Timeouts
    /// raise without altering state, so a later wait with a larger budget
    /// can still succeed.
    ///
    /// Node callbacks run on the completion loop and may still be in flight
    /// when this returns; only the node states themselves are settled.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<GraphStatus, TaskError> {
        let mut rx = self.shared.status_tx.subscribe();
        let terminal = async {
            loop {
                let status = *rx.borrow_and_update();
                if status.is_terminal() {
                    return status;
                }
                if rx.changed().await.is_err() {
                    return *rx.borrow();
                }
            }
        };
        let status = match timeout {
            Some(budget) => tokio::time::timeout(budget, terminal)
                .await
                .map_err(|_| TaskError::Timeout(budget.as_millis() as u64))?,
            None => terminal.await,
        };
        if status == GraphStatus::Failed {
            return Err(self.failure_cause());
        }
        Ok(status)
    }

    /// Convenience: run and wait in one call.
    pub async fn execute(
        &self,
        inputs: HashMap<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<GraphStatus, TaskError> {
        self.run(inputs)?;
        self.wait(timeout).await
    }

    /// The first `Failed` node's error, or any failed node's recorded
    /// failure when no direct failure remains (a retried parent can leave
    /// only `ParentFailed` descendants behind).
    fn failure_cause(&self) -> TaskError {
        let core = self.shared.core();
        if let Some(error) = core.first_failure.clone() {
            return error;
        }
        core.buckets
            .failed
            .iter()
            .filter_map(|id| self.shared.node(*id))
            .find_map(|node| node.failure())
            .unwrap_or_else(|| TaskError::Internal("graph failed without a cause".into()))
    }

    /// Cancel everything that has not started. Running work is left to
    /// finish and record its real outcome. Never raises on the caller.
    pub fn cancel(&self) {
        self.send(EngineEvent::Cancel);
    }

    /// Reset one failed/cancelled/parent-failed node back to `Waiting` and
    /// re-evaluate it. Descendants stay `ParentFailed` until each is
    /// retried itself.
    pub fn retry(&self, id: Uuid) -> Result<(), TaskError> {
        let node = self.shared.node(id).ok_or(TaskError::UnknownNode(id))?;
        if !node.reset_for_retry() {
            return Err(TaskError::Internal(format!(
                "node '{}' is not in a retryable state",
                node.name
            )));
        }
        self.unpublish_retried(&[id]);
        self.send(EngineEvent::Retried(id));
        Ok(())
    }

    /// Retry every failed/cancelled/parent-failed node. Ancestors of a
    /// `ParentFailed` node are not cascaded; only nodes currently in a
    /// retryable state are reset.
    pub fn retry_all(&self) {
        let retryable: Vec<Uuid> = {
            let core = self.shared.core();
            core.buckets
                .failed
                .iter()
                .chain(core.buckets.cancelled.iter())
                .copied()
                .collect()
        };
        // Reset every node before any readiness re-evaluation runs, so a
        // reset child never observes a parent still in its old failed state.
        let mut reset: Vec<Uuid> = Vec::with_capacity(retryable.len());
        for id in retryable {
            if let Some(node) = self.shared.node(id) {
                if node.reset_for_retry() {
                    reset.push(id);
                }
            }
        }
        self.unpublish_retried(&reset);
        for id in reset {
            self.send(EngineEvent::Retried(id));
        }
    }

    /// Move retried nodes back to the not-started bucket and publish the
    /// resulting status on the caller, before the loop re-evaluates them.
    /// A `wait()` entered right after a retry therefore never observes the
    /// stale terminal status from the previous run.
    fn unpublish_retried(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let mut core = self.shared.core();
        core.cancel_requested = false;
        core.first_failure = None;
        for id in ids {
            core.buckets.place(*id, NodeState::Waiting);
        }
        self.shared.publish_status(&core);
    }

    fn send(&self, event: EngineEvent) {
        if self.events_tx.send(event).is_err() {
            warn!(graph = %self.shared.name, "engine loop is gone, dropping event");
        }
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("name", &self.shared.name)
            .field("nodes", &self.shared.nodes.len())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Drop for TaskGraph {
    fn drop(&mut self) {
        let _ = self.events_tx.send(EngineEvent::Shutdown);
    }
}

/// Single-consumer completion loop: the dedicated dispatch mechanism for
/// readiness evaluation, status bookkeeping, and callback invocation.
struct EngineLoop {
    shared: Arc<GraphShared>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineLoop {
    async fn run(self, mut events_rx: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                EngineEvent::Start => self.seed_roots(),
                EngineEvent::NodeDone { id, callbacks } => self.handle_done(id, callbacks),
                EngineEvent::Retried(id) => self.handle_retried(id),
                EngineEvent::Cancel => self.handle_cancel(),
                EngineEvent::Shutdown => break,
            }
        }
        debug!(graph = %self.shared.name, "engine loop stopped");
    }

    fn seed_roots(&self) {
        for id in self.shared.deps.roots() {
            self.evaluate_readiness(id);
        }
    }

    fn handle_retried(&self, id: Uuid) {
        // Bucket placement already happened on the retrying caller.
        self.evaluate_readiness(id);
    }

    fn handle_cancel(&self) {
        let pending: Vec<Uuid> = {
            let mut core = self.shared.core();
            core.cancel_requested = true;
            core.buckets.not_started.iter().copied().collect()
        };
        // Mark every pending node cancelled before any fan-out runs, so
        // parent-failure propagation cannot turn a to-be-cancelled child
        // into `ParentFailed` first.
        let mut cancelled: Vec<(Uuid, Vec<DoneCallback>)> = Vec::with_capacity(pending.len());
        for id in pending {
            if let Some(node) = self.shared.node(id) {
                if let Some(callbacks) = node.mark_cancelled() {
                    cancelled.push((id, callbacks));
                }
            }
        }
        for (id, callbacks) in cancelled {
            self.handle_done(id, callbacks);
        }
        // A cancel with nothing pending still needs a status recompute.
        let core = self.shared.core();
        self.shared.publish_status(&core);
    }

    /// Apply one terminal transition: buckets, first-failure capture,
    /// child fan-out, aggregate status, then the node's own callbacks.
    fn handle_done(&self, id: Uuid, callbacks: Vec<DoneCallback>) {
        let Some(node) = self.shared.node(id) else {
            return;
        };
        let state = node.state();
        debug!(graph = %self.shared.name, node = %node.name, ?state, "node finished");

        {
            let mut core = self.shared.core();
            core.buckets.place(id, state);
            if state == NodeState::Failed && core.first_failure.is_none() {
                core.first_failure = node.failure();
            }
        }

        match state {
            NodeState::Succeeded => {
                for child in self.shared.deps.children_of(id) {
                    self.evaluate_readiness(*child);
                }
            }
            NodeState::Failed | NodeState::ParentFailed | NodeState::Cancelled => {
                self.propagate_parent_failure(&node);
            }
            other => {
                warn!(node = %node.name, state = ?other, "non-terminal node reported done");
            }
        }

        {
            let core = self.shared.core();
            self.shared.publish_status(&core);
        }

        for callback in callbacks {
            callback(id, state);
        }
    }

    /// Mark not-yet-started children of a failed/cancelled node as
    /// `ParentFailed`, wrapping the causal chain.
    fn propagate_parent_failure(&self, parent: &Arc<TaskNode>) {
        let cause = parent
            .failure()
            .unwrap_or_else(|| TaskError::Internal("failure cause missing".into()));
        for child_id in self.shared.deps.children_of(parent.id) {
            let Some(child) = self.shared.node(*child_id) else {
                continue;
            };
            let wrapped = TaskError::ParentFailed {
                parent: parent.name.clone(),
                parent_id: parent.id,
                cause: Box::new(cause.clone()),
            };
            if let Some(callbacks) = child.mark_parent_failed(wrapped) {
                self.handle_done(*child_id, callbacks);
            }
        }
    }

    /// Readiness check, run exactly once per parent-completion event and
    /// once at start for roots.
    fn evaluate_readiness(&self, id: Uuid) {
        let Some(node) = self.shared.node(id) else {
            return;
        };
        if node.state() != NodeState::Waiting {
            return;
        }

        // Parent scan in dependency-insertion order: the first failing
        // parent observed is the recorded cause (deterministic tie-break).
        let mut all_succeeded = true;
        for parent_id in self.shared.deps.parents_of(id) {
            let Some(parent) = self.shared.node(*parent_id) else {
                continue;
            };
            match parent.state() {
                NodeState::Succeeded => {}
                NodeState::Failed | NodeState::ParentFailed | NodeState::Cancelled => {
                    self.propagate_parent_failure(&parent);
                    return;
                }
                _ => {
                    all_succeeded = false;
                }
            }
        }
        if !all_succeeded {
            return;
        }

        let cancel_requested = self.shared.core().cancel_requested;
        if cancel_requested {
            if let Some(callbacks) = node.mark_cancelled() {
                self.handle_done(id, callbacks);
            }
            return;
        }

        node.mark_ready();
        self.maybe_start(node);
    }

    /// Claim-once dispatch: verify readiness and flip to `Running` before
    /// the work is handed to the worker pool. Losing a concurrent claim is
    /// not an error.
    fn maybe_start(&self, node: Arc<TaskNode>) {
        if !node.try_claim_running() {
            return;
        }
        {
            let mut core = self.shared.core();
            core.buckets.place(node.id, NodeState::Running);
            self.shared.publish_status(&core);
        }

        let shared = Arc::clone(&self.shared);
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            // Bounded worker budget: the claim happened above, the permit
            // gates actual execution.
            let _permit = match Arc::clone(&shared.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let callbacks = match run_node(&shared, &node).await {
                Ok(WorkOutcome {
                    value,
                    stored_ref,
                    completion_id,
                }) => node.complete_success(value, stored_ref, completion_id),
                Err(error) => node.complete_failure(error),
            };
            let _ = events_tx.send(EngineEvent::NodeDone {
                id: node.id,
                callbacks,
            });
        });
    }
}

struct WorkOutcome {
    value: Option<Value>,
    stored_ref: Option<String>,
    completion_id: Option<Uuid>,
}

/// Execute one node's work on a worker task.
async fn run_node(shared: &Arc<GraphShared>, node: &Arc<TaskNode>) -> Result<WorkOutcome, TaskError> {
    match &node.payload {
        NodePayload::Input { default } => {
            let supplied = shared.core().inputs.get(&node.name).cloned();
            let value = supplied
                .or_else(|| default.clone())
                .ok_or_else(|| TaskError::MissingInput(node.name.clone()))?;
            Ok(WorkOutcome {
                value: Some(value),
                stored_ref: None,
                completion_id: None,
            })
        }
        NodePayload::RemoteCall { function: None } => {
            // Inline work runs locally and can never accept stored
            // references, so parents are always materialized.
            let resolved = resolve_args(shared, node, false).await?;
            let function = node.inline.clone().ok_or_else(|| {
                TaskError::Internal(format!("node '{}' lost its inline work", node.name))
            })?;
            let positional = positional_args(resolved.args);
            let value = function(&positional).map_err(|message| TaskError::NodeExecution {
                node: node.name.clone(),
                message,
            })?;
            Ok(WorkOutcome {
                value: Some(value),
                stored_ref: None,
                completion_id: None,
            })
        }
        _ => submit_remote(shared, node).await,
    }
}

/// Submit through the remote executor, falling back to materialized
/// arguments exactly once if the stored-reference form is rejected.
async fn submit_remote(
    shared: &Arc<GraphShared>,
    node: &Arc<TaskNode>,
) -> Result<WorkOutcome, TaskError> {
    let resolved = resolve_args(shared, node, node.accepts_stored_refs).await?;
    let request = SubmitRequest {
        node_id: node.id,
        node_name: node.name.clone(),
        payload: node.payload.clone(),
        args: resolved.args,
        encoding: resolved.encoding,
    };

    let outcome = match shared.executor.submit(request).await {
        Ok(outcome) => outcome,
        Err(SubmitError::ReferenceRejected(reason))
            if resolved.encoding == ArgEncoding::StoredRefs =>
        {
            debug!(node = %node.name, %reason, "stored references rejected, retrying materialized");
            let fallback = resolve_args(shared, node, false).await?;
            let request = SubmitRequest {
                node_id: node.id,
                node_name: node.name.clone(),
                payload: node.payload.clone(),
                args: fallback.args,
                encoding: ArgEncoding::Materialized,
            };
            shared
                .executor
                .submit(request)
                .await
                .map_err(|err| TaskError::NodeExecution {
                    node: node.name.clone(),
                    message: err.to_string(),
                })?
        }
        Err(err) => {
            return Err(TaskError::NodeExecution {
                node: node.name.clone(),
                message: err.to_string(),
            })
        }
    };

    match outcome.result {
        SubmitResult::Bytes { format, bytes } => {
            let value = shared.codec.decode(&format, &bytes)?;
            Ok(WorkOutcome {
                value: Some(value),
                stored_ref: None,
                completion_id: outcome.completion_id,
            })
        }
        SubmitResult::Stored(StoredRef(reference)) => Ok(WorkOutcome {
            value: None,
            stored_ref: Some(reference),
            completion_id: outcome.completion_id,
        }),
    }
}

struct ResolvedArgs {
    args: Value,
    encoding: ArgEncoding,
}

/// Swap each value placeholder for the parent's stored reference (when the
/// call accepts them and the parent produced one) or its materialized
/// value. Parents holding only a stored reference are fetched through the
/// executor and decoded by the codec when they must be inlined.
async fn resolve_args(
    shared: &Arc<GraphShared>,
    node: &Arc<TaskNode>,
    prefer_stored: bool,
) -> Result<ResolvedArgs, TaskError> {
    let referenced = args::template_node_refs(&node.args_template);
    let mut resolutions: HashMap<Uuid, Resolution> = HashMap::with_capacity(referenced.len());
    let mut used_stored = false;

    for parent_id in referenced {
        let parent = shared
            .node(parent_id)
            .ok_or(TaskError::UnknownNode(parent_id))?;
        let stored = parent.stored_ref();
        if prefer_stored {
            if let Some(reference) = stored.clone() {
                resolutions.insert(parent_id, Resolution::Stored(reference));
                used_stored = true;
                continue;
            }
        }
        let value = match parent.result() {
            Ok(value) => value,
            Err(_) if stored.is_some() => {
                let reference = StoredRef(stored.clone().unwrap_or_default());
                let (format, bytes) = shared.executor.fetch(&reference).await.map_err(|err| {
                    TaskError::NodeExecution {
                        node: node.name.clone(),
                        message: format!("materializing parent '{}': {err}", parent.name),
                    }
                })?;
                let value = shared.codec.decode(&format, &bytes)?;
                parent.cache_result(value.clone());
                value
            }
            Err(err) => return Err(err),
        };
        resolutions.insert(parent_id, Resolution::Materialized(value));
    }

    let resolved = args::resolve(&node.args_template, &|id| resolutions.get(&id).cloned())?;
    Ok(ResolvedArgs {
        args: resolved,
        encoding: if used_stored {
            ArgEncoding::StoredRefs
        } else {
            ArgEncoding::Materialized
        },
    })
}

/// Flatten a resolved argument template into positional values for inline
/// work.
fn positional_args(resolved: Value) -> Vec<Value> {
    match resolved {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buckets_partition_exactly_once() {
        let mut buckets = Buckets::default();
        let id = Uuid::new_v4();
        buckets.place(id, NodeState::Waiting);
        buckets.place(id, NodeState::Running);
        buckets.place(id, NodeState::Succeeded);
        assert!(!buckets.not_started.contains(&id));
        assert!(!buckets.running.contains(&id));
        assert!(buckets.completed.contains(&id));
    }

    #[test]
    fn positional_args_flatten_shapes() {
        assert_eq!(positional_args(json!([1, 2])), vec![json!(1), json!(2)]);
        assert!(positional_args(Value::Null).is_empty());
        assert_eq!(positional_args(json!(7)), vec![json!(7)]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(GraphStatus::Completed.is_terminal());
        assert!(GraphStatus::Failed.is_terminal());
        assert!(GraphStatus::Cancelled.is_terminal());
        assert!(!GraphStatus::Running.is_terminal());
        assert!(!GraphStatus::NotStarted.is_terminal());
    }
}
