//! Taskgraph - a client-side task graph engine.
//!
//! Deferred units of work are wired into a DAG by scanning their argument
//! trees for references to other nodes' outputs, then executed with a
//! bounded worker budget. Results flow between nodes either as
//! materialized values or as stored references that a call can accept
//! without pulling the bytes down. Two execution styles share one engine:
//! the immediate [`TaskGraph`], which dispatches as soon as dependencies
//! finish, and the [`CompiledRunner`], which executes a frozen
//! [`GraphDoc`] produced by [`GraphBuilder::compile`].

pub mod args;
pub mod builder;
pub mod compiled;
pub mod config;
pub mod doc;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod remote;

pub use args::ArgValue;
pub use builder::{GraphBuilder, NodeOptions};
pub use compiled::CompiledRunner;
pub use config::EngineConfig;
pub use doc::{GraphDoc, NodeRecord};
pub use error::TaskError;
pub use executor::{GraphStatus, TaskGraph};
pub use node::{AttemptRecord, InlineFn, NodeKind, NodePayload, NodeState, TaskNode, Work};
pub use remote::{
    ArgEncoding, Codec, InProcessExecutor, JsonCodec, RemoteExecutor, StoredRef, SubmitError,
    SubmitOutcome, SubmitRequest, SubmitResult,
};
