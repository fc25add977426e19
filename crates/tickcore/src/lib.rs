//! Core model for the tick engine
//!
//! Operators, ports, conditions, entities and the fragment graph they form.
//! Nothing in here drives execution; see `tickruntime` for the scheduler.

mod arg;
pub mod condition;
mod config;
mod context;
mod entity;
mod error;
pub mod events;
pub mod fragment;
pub mod graph;
pub mod interop;
pub mod logging;
mod operator;
pub mod resource;
pub mod schema;
mod tensor;
pub mod transport;
mod value;

pub use arg::{Arg, ArgList};
pub use condition::{
    BooleanCondition, Condition, ConditionType, CountCondition, DownstreamMessageAffordableCondition,
    MessageAvailableCondition, PeriodicCondition, RecessPeriod, SchedulingStatus,
};
pub use config::Config;
pub use context::{ExecutionContext, ResourceMap};
pub use entity::{Entity, Payload};
pub use error::{
    CompositionError, ConditionError, InitializationError, OperatorError, OwnershipError,
    ResourceError, TensorError, TickError, TransportError,
};
pub use events::*;
pub use fragment::{Application, Fragment, FragmentId, FragmentParts, OperatorEntry, OperatorId};
pub use interop::{ArrayInterface, DataType, Device, ExternalArray, ForeignRef, HostArray, OwnershipLedger};
pub use operator::{
    ComputeFn, FnOperator, Operator, OperatorBackend, OperatorDef, OperatorState, OperatorType, SetupFn,
};
pub use resource::{BlockMemoryPool, MemoryBlock, Resource, UnboundedAllocator};
pub use schema::{OperatorSchema, Parameters, PortDirection, PortSchema};
pub use tensor::{Tensor, TensorCapsule};
pub use transport::{InputContext, OutputContext, QueuePolicy};
pub use value::Value;

/// Result type for tick operations
pub type Result<T> = std::result::Result<T, TickError>;
