use thiserror::Error;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),

    #[error("Ownership violation: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised synchronously while building a graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("Operator '{0}' already exists in fragment")]
    DuplicateOperatorName(String),

    #[error("Operator not found: {0}")]
    OperatorNotFound(String),

    #[error("Operator '{operator}' has no {direction} port '{port}'")]
    PortNotFound {
        operator: String,
        port: String,
        direction: String,
    },

    #[error("Cannot connect '{from}' to '{to}': expected an output feeding an input")]
    DirectionMismatch { from: String, to: String },

    #[error("Edge {producer}.{out_port} -> {consumer}.{in_port} already exists")]
    DuplicateEdge {
        producer: String,
        out_port: String,
        consumer: String,
        in_port: String,
    },

    #[error("Operators '{producer}' and '{consumer}' belong to different fragments")]
    CrossFragment { producer: String, consumer: String },

    #[error("Cannot infer ports between '{producer}' and '{consumer}': {reason}")]
    AmbiguousPorts {
        producer: String,
        consumer: String,
        reason: String,
    },

    #[error("Condition '{condition}' already attached to operator '{operator}'")]
    DuplicateCondition { operator: String, condition: String },

    #[error("Resource '{resource}' already attached to operator '{operator}'")]
    DuplicateResource { operator: String, resource: String },

    #[error("Fragment '{0}' already exists in application")]
    DuplicateFragmentName(String),

    #[error("Fragment name '{0}' is reserved")]
    ReservedFragmentName(String),

    #[error("Unknown operator type: {0}")]
    UnknownOperatorType(String),

    #[error("Failed to create operator of type '{operator_type}': {reason}")]
    OperatorCreation { operator_type: String, reason: String },
}

/// Errors that keep an operator from reaching INITIALIZED
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("Operator '{operator}' is missing required parameter '{parameter}'")]
    MissingParameter { operator: String, parameter: String },

    #[error("Operator '{operator}' has invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        operator: String,
        parameter: String,
        reason: String,
    },

    #[error("Operator '{operator}' has invalid condition '{condition}': {source}")]
    InvalidCondition {
        operator: String,
        condition: String,
        source: ConditionError,
    },

    #[error("Operator '{operator}' failed to initialize: {source}")]
    Operator {
        operator: String,
        source: OperatorError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("Invalid recess period: {0}")]
    InvalidPeriod(String),
}

/// Failures of receive/emit calls made from inside a compute step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown {direction} port '{port}'")]
    PortNotFound { port: String, direction: String },

    #[error("Input port '{0}' has no connection")]
    NotConnected(String),

    #[error("Input port '{port}' is fed by {edges} edges; use receive_many")]
    FanInArity { port: String, edges: usize },

    #[error("Queue for edge into '{port}' is full (capacity {capacity})")]
    QueueFull { port: String, capacity: usize },

    #[error("Entity is shared and can no longer be modified")]
    EntityShared,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Unsupported typestr '{0}'")]
    UnsupportedDtype(String),

    #[error("Strides length {strides} does not match shape length {shape}")]
    StrideMismatch { shape: usize, strides: usize },

    #[error("Null data pointer for a non-empty array")]
    NullData,

    #[error("Buffer of {actual} bytes cannot hold {required} bytes")]
    BufferTooSmall { required: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Memory pool '{pool}' exhausted ({blocks} blocks in use)")]
    Exhausted { pool: String, blocks: usize },

    #[error("Requested {requested} bytes exceeds block size {block_size}")]
    BlockTooSmall { requested: usize, block_size: usize },
}

/// Core invariant violations around shared buffer lifetimes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("Reference count underflow on '{object}'")]
    Underflow { object: String },
}
