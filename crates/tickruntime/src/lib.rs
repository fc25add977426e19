//! Execution runtime for tick graphs
//!
//! This crate drives fragments: it wires edge queues, evaluates scheduling
//! conditions round by round and runs compute steps on tokio tasks. It also
//! holds the operator registry and the YAML graph loader.

mod executor;
mod loader;
mod plan;
mod registry;
mod runtime;

pub use executor::{
    ExecutionHandle, ExecutionResult, ExecutorConfig, GraphExecutor, OperatorFailure, StopReason,
};
pub use loader::{ConditionDefinition, FlowDefinition, GraphDefinition, OperatorDefinition};
pub use registry::{OperatorFactory, OperatorMetadata, OperatorRegistry, PortDefinition};
pub use runtime::{RunningExecution, RuntimeConfig, TickRuntime};
