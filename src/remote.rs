//! Contracts for the remote executor and codec collaborators.
//!
//! The engine never interprets payload bytes itself: the remote executor
//! runs the work and reports bytes or an opaque stored reference, and the
//! codec converts between values and transmissible bytes at the boundary.
//! An in-process executor backs local execution of registered functions
//! and the test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::args;
use crate::error::TaskError;
use crate::node::{InlineFn, NodePayload};

/// Opaque server-side reference to a node's result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredRef(pub String);

/// How the arguments of a submission deliver parent outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgEncoding {
    /// Parent outputs appear as stored-reference placeholders.
    StoredRefs,
    /// Every parent output is materialized inline.
    Materialized,
}

/// One execution request handed to the remote executor.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub node_id: Uuid,
    pub node_name: String,
    pub payload: NodePayload,
    pub args: Value,
    pub encoding: ArgEncoding,
}

/// Successful submission outcome.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub result: SubmitResult,
    /// Completion identifier for later status polling; carried on the
    /// response, never kept as ambient state.
    pub completion_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub enum SubmitResult {
    Bytes { format: String, bytes: Vec<u8> },
    Stored(StoredRef),
}

/// Failure signal from the remote executor.
///
/// `ReferenceRejected` is structurally distinguished so the engine can
/// trigger its one-time materialize-and-resubmit fallback; every other
/// failure is terminal for the node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("stored argument reference rejected: {0}")]
    ReferenceRejected(String),
    #[error("remote execution failed: {0}")]
    Failed(String),
}

/// The remote execution service, specified only at its interface boundary.
pub trait RemoteExecutor: Send + Sync {
    /// Run one unit of work synchronously from the caller's perspective.
    fn submit<'a>(
        &'a self,
        request: SubmitRequest,
    ) -> BoxFuture<'a, Result<SubmitOutcome, SubmitError>>;

    /// Materialize a stored reference into encoded bytes.
    fn fetch<'a>(
        &'a self,
        reference: &'a StoredRef,
    ) -> BoxFuture<'a, Result<(String, Vec<u8>), SubmitError>>;
}

/// Value <-> bytes conversion at the transport boundary.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<(String, Vec<u8>), TaskError>;
    fn decode(&self, format: &str, bytes: &[u8]) -> Result<Value, TaskError>;
}

/// Default codec: JSON bytes tagged with format `"json"`.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

pub const JSON_FORMAT: &str = "json";

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<(String, Vec<u8>), TaskError> {
        let bytes = serde_json::to_vec(value).map_err(|err| TaskError::Codec(err.to_string()))?;
        Ok((JSON_FORMAT.to_string(), bytes))
    }

    fn decode(&self, format: &str, bytes: &[u8]) -> Result<Value, TaskError> {
        if format != JSON_FORMAT {
            return Err(TaskError::Codec(format!("unsupported format '{format}'")));
        }
        serde_json::from_slice(bytes).map_err(|err| TaskError::Codec(err.to_string()))
    }
}

/// In-memory executor with a registered-function table.
///
/// Runs registered functions over materialized positional arguments,
/// dereferencing stored-reference placeholders against its own result
/// store. Query payloads resolve to registered functions by source/query
/// name. Test hooks: `produce_stored_refs` makes every result a stored
/// reference, and `reject_refs(n)` rejects the next `n` submissions that
/// carry stored-reference arguments.
pub struct InProcessExecutor {
    functions: RwLock<HashMap<String, InlineFn>>,
    store: Mutex<HashMap<String, Value>>,
    produce_stored_refs: bool,
    reject_refs_remaining: AtomicUsize,
}

impl Default for InProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessExecutor {
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
            store: Mutex::new(HashMap::new()),
            produce_stored_refs: false,
            reject_refs_remaining: AtomicUsize::new(0),
        }
    }

    /// Store every result server-side and hand back stored references.
    pub fn with_stored_refs(mut self) -> Self {
        self.produce_stored_refs = true;
        self
    }

    /// Reject the next `n` submissions whose arguments carry stored
    /// references, simulating "reference expired / not supported".
    pub fn reject_refs(&self, n: usize) {
        self.reject_refs_remaining.store(n, Ordering::SeqCst);
    }

    pub fn register(&self, name: impl Into<String>, function: InlineFn) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), function);
    }

    fn function_for(&self, payload: &NodePayload) -> Result<(String, InlineFn), SubmitError> {
        let name = match payload {
            NodePayload::RemoteCall { function: Some(name) } => name.clone(),
            NodePayload::RemoteCall { function: None } => {
                return Err(SubmitError::Failed(
                    "inline work cannot be submitted remotely".into(),
                ))
            }
            NodePayload::DataQuery { source } => source.clone(),
            NodePayload::StructuredQuery { query } => query.clone(),
            NodePayload::Input { .. } => {
                return Err(SubmitError::Failed("input nodes carry no work".into()))
            }
        };
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        match functions.get(&name) {
            Some(function) => Ok((name, function.clone())),
            None => Err(SubmitError::Failed(format!("unknown function '{name}'"))),
        }
    }

    /// Replace stored-reference placeholders with values from the store.
    fn deref_stored(&self, value: &Value) -> Result<Value, SubmitError> {
        if let Some(reference) = args::as_stored_ref(value) {
            let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            return store.get(reference).cloned().ok_or_else(|| {
                SubmitError::ReferenceRejected(format!("reference '{reference}' expired"))
            });
        }
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.deref_stored(item)?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), self.deref_stored(item)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn run(&self, request: SubmitRequest) -> Result<SubmitOutcome, SubmitError> {
        if request.encoding == ArgEncoding::StoredRefs {
            let remaining = self.reject_refs_remaining.load(Ordering::SeqCst);
            if remaining > 0
                && self
                    .reject_refs_remaining
                    .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                debug!(node = %request.node_name, "rejecting stored-reference arguments");
                return Err(SubmitError::ReferenceRejected(
                    "stored references not supported for this argument shape".into(),
                ));
            }
        }

        let (name, function) = self.function_for(&request.payload)?;
        let materialized = self.deref_stored(&request.args)?;
        let positional: Vec<Value> = match materialized {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        debug!(node = %request.node_name, function = %name, "executing in-process");
        let value = function(&positional).map_err(SubmitError::Failed)?;
        let completion_id = Some(Uuid::new_v4());

        if self.produce_stored_refs {
            let reference = format!("ref-{}", Uuid::new_v4());
            self.store
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(reference.clone(), value);
            return Ok(SubmitOutcome {
                result: SubmitResult::Stored(StoredRef(reference)),
                completion_id,
            });
        }

        let bytes =
            serde_json::to_vec(&value).map_err(|err| SubmitError::Failed(err.to_string()))?;
        Ok(SubmitOutcome {
            result: SubmitResult::Bytes {
                format: JSON_FORMAT.to_string(),
                bytes,
            },
            completion_id,
        })
    }
}

impl RemoteExecutor for InProcessExecutor {
    fn submit<'a>(
        &'a self,
        request: SubmitRequest,
    ) -> BoxFuture<'a, Result<SubmitOutcome, SubmitError>> {
        Box::pin(async move { self.run(request) })
    }

    fn fetch<'a>(
        &'a self,
        reference: &'a StoredRef,
    ) -> BoxFuture<'a, Result<(String, Vec<u8>), SubmitError>> {
        Box::pin(async move {
            let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            let value = store.get(&reference.0).ok_or_else(|| {
                SubmitError::Failed(format!("unknown stored reference '{}'", reference.0))
            })?;
            let bytes = serde_json::to_vec(value)
                .map_err(|err| SubmitError::Failed(err.to_string()))?;
            Ok((JSON_FORMAT.to_string(), bytes))
        })
    }
}
