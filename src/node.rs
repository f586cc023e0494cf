//! Task nodes: identity, kind, lifecycle state machine, waits, callbacks.
//!
//! A node's state is mutated only under its own lock, and the lock is
//! always released before callbacks run or the graph is notified. Waiters
//! observe transitions through a `watch` channel instead of polling.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::TaskError;

/// Kinds of nodes in a task graph. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Externally supplied value (or a default), no work of its own.
    Input,
    /// Unit of deferred work: an inline function or a registered remote one.
    RemoteCall,
    /// Read against a remote data source; cannot run locally.
    DataQuery,
    /// Declarative query against a remote engine; cannot run locally.
    StructuredQuery,
}

impl NodeKind {
    /// Short label used when synthesizing display names.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::RemoteCall => "call",
            NodeKind::DataQuery => "data-query",
            NodeKind::StructuredQuery => "sql-query",
        }
    }
}

/// Kind-specific payload carried into the declarative document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodePayload {
    Input {
        default: Option<Value>,
    },
    /// `function` is the registered remote function name; `None` marks
    /// inline work, which only the immediate executor can run.
    RemoteCall {
        function: Option<String>,
    },
    DataQuery {
        source: String,
    },
    StructuredQuery {
        query: String,
    },
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Input { .. } => NodeKind::Input,
            NodePayload::RemoteCall { .. } => NodeKind::RemoteCall,
            NodePayload::DataQuery { .. } => NodeKind::DataQuery,
            NodePayload::StructuredQuery { .. } => NodeKind::StructuredQuery,
        }
    }
}

/// Per-node lifecycle states.
///
/// `ParentFailed` is terminal for propagation purposes but, like `Failed`
/// and `Cancelled`, can be reset back to `Waiting` by an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Waiting,
    Ready,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    ParentFailed,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Succeeded | NodeState::Failed | NodeState::Cancelled | NodeState::ParentFailed
        )
    }

    /// Terminal states a retry can reset.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeState::Failed | NodeState::Cancelled | NodeState::ParentFailed
        )
    }
}

/// Inline work function executed by the immediate executor's worker pool.
pub type InlineFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// The work behind a `RemoteCall` node: an inline function or the name of
/// a function pre-registered with the remote executor.
#[derive(Clone)]
pub enum Work {
    Inline(InlineFn),
    Registered(String),
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::Inline(_) => f.write_str("Work::Inline(..)"),
            Work::Registered(name) => write!(f, "Work::Registered({name})"),
        }
    }
}

/// Completion observer, invoked at most once with the node's terminal state.
pub type DoneCallback = Box<dyn FnOnce(Uuid, NodeState) + Send + 'static>;

/// One dispatch attempt, for post-mortem inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Opaque completion identifier reported by the remote executor for
    /// this attempt. Recorded here, never as process-global state.
    pub completion_id: Option<Uuid>,
}

#[derive(Default)]
struct NodeInner {
    result: Option<Value>,
    stored_ref: Option<String>,
    failure: Option<TaskError>,
    callbacks: Vec<DoneCallback>,
    attempts: Vec<AttemptRecord>,
    attempt_number: u32,
}

/// One unit of deferred work in a task graph.
pub struct TaskNode {
    pub id: Uuid,
    pub name: String,
    /// Parents referenced by this node's arguments plus manual ordering
    /// edges, in discovery order. Never changes after construction.
    pub dependencies: Vec<Uuid>,
    pub payload: NodePayload,
    /// Escaped argument template; node references appear as placeholders.
    pub args_template: Value,
    /// Inline work, present only for `RemoteCall` nodes built from a closure.
    pub inline: Option<InlineFn>,
    /// Whether this node's calls may receive parents as stored references.
    pub accepts_stored_refs: bool,
    inner: Mutex<NodeInner>,
    state_tx: watch::Sender<NodeState>,
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl TaskNode {
    pub fn new(
        id: Uuid,
        name: String,
        payload: NodePayload,
        args_template: Value,
        dependencies: Vec<Uuid>,
    ) -> Self {
        let (state_tx, _) = watch::channel(NodeState::Waiting);
        Self {
            id,
            name,
            dependencies,
            payload,
            args_template,
            inline: None,
            accepts_stored_refs: false,
            inner: Mutex::new(NodeInner::default()),
            state_tx,
        }
    }

    pub fn with_inline(mut self, work: InlineFn) -> Self {
        self.inline = Some(work);
        self
    }

    pub fn with_stored_refs(mut self, accepts: bool) -> Self {
        self.accepts_stored_refs = accepts;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn state(&self) -> NodeState {
        *self.state_tx.borrow()
    }

    /// Watch receiver observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.state_tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Waiting -> Ready` once all parents succeeded. Returns whether the
    /// transition happened.
    pub fn mark_ready(&self) -> bool {
        let guard = self.lock();
        let moved = self.state() == NodeState::Waiting;
        if moved {
            self.state_tx.send_replace(NodeState::Ready);
        }
        drop(guard);
        moved
    }

    /// Claim-once `Ready -> Running` transition. Exactly one caller wins
    /// even when parent completions race; losers see `false`.
    pub fn try_claim_running(&self) -> bool {
        let mut guard = self.lock();
        if self.state() != NodeState::Ready {
            return false;
        }
        guard.attempt_number += 1;
        let attempt = guard.attempt_number;
        guard.attempts.push(AttemptRecord {
            attempt,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            completion_id: None,
        });
        self.state_tx.send_replace(NodeState::Running);
        true
    }

    /// `Running -> Succeeded`. Returns the callbacks to invoke, which the
    /// caller must run after the lock is released.
    pub fn complete_success(
        &self,
        result: Option<Value>,
        stored_ref: Option<String>,
        completion_id: Option<Uuid>,
    ) -> Vec<DoneCallback> {
        let mut guard = self.lock();
        debug_assert_eq!(self.state(), NodeState::Running);
        guard.result = result;
        guard.stored_ref = stored_ref;
        guard.failure = None;
        if let Some(attempt) = guard.attempts.last_mut() {
            attempt.completed_at = Some(Utc::now());
            attempt.completion_id = completion_id;
        }
        self.state_tx.send_replace(NodeState::Succeeded);
        std::mem::take(&mut guard.callbacks)
    }

    /// `Running -> Failed` with the wrapped work failure.
    pub fn complete_failure(&self, error: TaskError) -> Vec<DoneCallback> {
        let mut guard = self.lock();
        debug_assert_eq!(self.state(), NodeState::Running);
        if let Some(attempt) = guard.attempts.last_mut() {
            attempt.completed_at = Some(Utc::now());
            attempt.error = Some(error.to_string());
        }
        guard.failure = Some(error);
        guard.result = None;
        guard.stored_ref = None;
        self.state_tx.send_replace(NodeState::Failed);
        std::mem::take(&mut guard.callbacks)
    }

    /// `Waiting|Ready -> ParentFailed`; never applied once running.
    pub fn mark_parent_failed(&self, error: TaskError) -> Option<Vec<DoneCallback>> {
        let mut guard = self.lock();
        if !matches!(self.state(), NodeState::Waiting | NodeState::Ready) {
            return None;
        }
        guard.failure = Some(error);
        self.state_tx.send_replace(NodeState::ParentFailed);
        Some(std::mem::take(&mut guard.callbacks))
    }

    /// `Waiting|Ready -> Cancelled`; a running node is left to finish.
    pub fn mark_cancelled(&self) -> Option<Vec<DoneCallback>> {
        let mut guard = self.lock();
        if !matches!(self.state(), NodeState::Waiting | NodeState::Ready) {
            return None;
        }
        guard.failure = Some(TaskError::Cancelled(self.name.clone()));
        self.state_tx.send_replace(NodeState::Cancelled);
        Some(std::mem::take(&mut guard.callbacks))
    }

    /// Explicit retry: reset a retryable terminal node back to `Waiting`,
    /// clearing its result and failure. Attempt history is kept.
    pub fn reset_for_retry(&self) -> bool {
        let mut guard = self.lock();
        if !self.state().is_retryable() {
            return false;
        }
        guard.result = None;
        guard.stored_ref = None;
        guard.failure = None;
        self.state_tx.send_replace(NodeState::Waiting);
        true
    }

    /// The node's result once `Succeeded`.
    ///
    /// Cancelled nodes raise `Cancelled`; failed nodes re-raise their
    /// failure cause; a result held only as a stored reference must be
    /// materialized through the owning executor first.
    pub fn result(&self) -> Result<Value, TaskError> {
        let guard = self.lock();
        match self.state() {
            NodeState::Succeeded => match &guard.result {
                Some(value) => Ok(value.clone()),
                None => Err(TaskError::Internal(format!(
                    "result of node '{}' is held as a stored reference",
                    self.name
                ))),
            },
            NodeState::Cancelled => Err(TaskError::Cancelled(self.name.clone())),
            NodeState::Failed | NodeState::ParentFailed => Err(guard
                .failure
                .clone()
                .unwrap_or_else(|| TaskError::Internal("failure cause missing".into()))),
            other => Err(TaskError::Internal(format!(
                "node '{}' has not finished (state {other:?})",
                self.name
            ))),
        }
    }

    /// Cache a materialized value for a node whose call produced only a
    /// stored reference.
    pub fn cache_result(&self, value: Value) {
        let mut guard = self.lock();
        if guard.result.is_none() {
            guard.result = Some(value);
        }
    }

    pub fn stored_ref(&self) -> Option<String> {
        self.lock().stored_ref.clone()
    }

    pub fn failure(&self) -> Option<TaskError> {
        self.lock().failure.clone()
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.lock().attempts.clone()
    }

    pub fn attempt_number(&self) -> u32 {
        self.lock().attempt_number
    }

    /// Register a completion observer. Observers registered before the
    /// node finishes run on the completion loop in registration order;
    /// registering after completion invokes the observer immediately on
    /// the caller, outside the node lock.
    pub fn add_callback(&self, callback: DoneCallback) {
        let state = {
            let mut guard = self.lock();
            let state = self.state();
            if !state.is_terminal() {
                guard.callbacks.push(callback);
                return;
            }
            state
        };
        callback(self.id, state);
    }

    /// Block until the node reaches a terminal state.
    pub async fn wait(&self) -> NodeState {
        let mut rx = self.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Like [`wait`], with a deadline. Raises `Timeout` without touching
    /// node state, so a later wait with a larger budget can still succeed.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<NodeState, TaskError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| TaskError::Timeout(timeout.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_node() -> TaskNode {
        TaskNode::new(
            Uuid::new_v4(),
            "call-1".into(),
            NodePayload::RemoteCall {
                function: Some("double".into()),
            },
            json!([]),
            Vec::new(),
        )
    }

    #[test]
    fn claim_running_wins_once() {
        let node = call_node();
        assert!(node.mark_ready());
        assert!(node.try_claim_running());
        assert!(!node.try_claim_running());
        assert_eq!(node.state(), NodeState::Running);
        assert_eq!(node.attempt_number(), 1);
    }

    #[test]
    fn success_sets_result_and_is_final() {
        let node = call_node();
        node.mark_ready();
        node.try_claim_running();
        let callbacks = node.complete_success(Some(json!(10)), None, None);
        assert!(callbacks.is_empty());
        assert_eq!(node.state(), NodeState::Succeeded);
        assert_eq!(node.result().unwrap(), json!(10));
        assert!(node.failure().is_none());
    }

    #[test]
    fn failure_and_result_are_exclusive() {
        let node = call_node();
        node.mark_ready();
        node.try_claim_running();
        node.complete_failure(TaskError::NodeExecution {
            node: "call-1".into(),
            message: "boom".into(),
        });
        assert_eq!(node.state(), NodeState::Failed);
        assert!(node.result().is_err());
        assert!(matches!(
            node.failure(),
            Some(TaskError::NodeExecution { .. })
        ));
    }

    #[test]
    fn cancel_only_before_running() {
        let node = call_node();
        node.mark_ready();
        assert!(node.mark_cancelled().is_some());
        assert_eq!(node.state(), NodeState::Cancelled);
        assert!(matches!(node.result(), Err(TaskError::Cancelled(_))));

        let running = call_node();
        running.mark_ready();
        running.try_claim_running();
        assert!(running.mark_cancelled().is_none());
        assert_eq!(running.state(), NodeState::Running);
    }

    #[test]
    fn retry_resets_terminal_state() {
        let node = call_node();
        node.mark_ready();
        node.try_claim_running();
        node.complete_failure(TaskError::NodeExecution {
            node: "call-1".into(),
            message: "boom".into(),
        });

        assert!(node.reset_for_retry());
        assert_eq!(node.state(), NodeState::Waiting);
        assert!(node.failure().is_none());
        // Attempt history survives the reset.
        assert_eq!(node.attempts().len(), 1);

        // A succeeded node is not retryable.
        node.mark_ready();
        node.try_claim_running();
        node.complete_success(Some(json!(1)), None, None);
        assert!(!node.reset_for_retry());
    }

    #[test]
    fn attempt_records_number_each_claim() {
        let node = call_node();
        node.mark_ready();
        node.try_claim_running();
        node.complete_failure(TaskError::NodeExecution {
            node: "call-1".into(),
            message: "boom".into(),
        });
        node.reset_for_retry();
        node.mark_ready();
        node.try_claim_running();

        let attempts = node.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].attempt, 1);
        assert_eq!(attempts[1].attempt, 2);
        assert_eq!(node.attempt_number(), 2);
    }

    #[test]
    fn late_callback_fires_immediately() {
        let node = call_node();
        node.mark_ready();
        node.try_claim_running();
        node.complete_success(Some(json!(1)), None, None);

        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&fired);
        node.add_callback(Box::new(move |_, state| {
            assert_eq!(state, NodeState::Succeeded);
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wait_timeout_does_not_mutate() {
        let node = call_node();
        let err = node.wait_timeout(Duration::from_millis(20)).await;
        assert!(matches!(err, Err(TaskError::Timeout(_))));
        assert_eq!(node.state(), NodeState::Waiting);
    }
}
