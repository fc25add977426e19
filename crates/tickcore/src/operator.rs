use crate::condition::Condition;
use crate::context::ExecutionContext;
use crate::resource::Resource;
use crate::schema::{OperatorSchema, Parameters};
use crate::transport::{InputContext, OutputContext};
use crate::{Arg, ArgList, OperatorError, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Core trait that all native operators implement
#[async_trait]
pub trait Operator: Send {
    /// Type identifier (e.g., "ping.tx", "tensor.source")
    fn operator_type(&self) -> &str;

    /// Declare ports and parameters
    fn setup(&self, schema: &mut OperatorSchema);

    /// Read resolved parameters once the graph is finalized
    async fn initialize(&mut self, _params: &Parameters) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Called once before the first tick
    async fn start(&mut self) -> Result<(), OperatorError> {
        Ok(())
    }

    /// One tick: receive inputs, emit outputs
    async fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError>;

    /// Called once when the run ends, whatever the operator's state
    async fn stop(&mut self) -> Result<(), OperatorError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    /// Trait object implementing [`Operator`]
    Native,
    /// Closure pair built with [`OperatorDef::from_fn`]
    Function,
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorType::Native => f.write_str("native"),
            OperatorType::Function => f.write_str("function"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

pub type SetupFn = Box<dyn Fn(&mut OperatorSchema) + Send>;

pub type ComputeFn = Box<
    dyn FnMut(&mut InputContext, &mut OutputContext, &ExecutionContext) -> Result<(), OperatorError>
        + Send,
>;

/// Operator made of a setup closure and a synchronous compute closure
pub struct FnOperator {
    setup: SetupFn,
    compute: ComputeFn,
}

impl FnOperator {
    pub fn new<S, C>(setup: S, compute: C) -> Self
    where
        S: Fn(&mut OperatorSchema) + Send + 'static,
        C: FnMut(&mut InputContext, &mut OutputContext, &ExecutionContext) -> Result<(), OperatorError>
            + Send
            + 'static,
    {
        Self {
            setup: Box::new(setup),
            compute: Box::new(compute),
        }
    }
}

/// The closed set of ways an operator can be implemented
pub enum OperatorBackend {
    Native(Box<dyn Operator>),
    Function(FnOperator),
}

impl OperatorBackend {
    pub fn operator_type(&self) -> OperatorType {
        match self {
            OperatorBackend::Native(_) => OperatorType::Native,
            OperatorBackend::Function(_) => OperatorType::Function,
        }
    }

    /// Registry type name for native operators, `"function"` otherwise
    pub fn type_name(&self) -> &str {
        match self {
            OperatorBackend::Native(op) => op.operator_type(),
            OperatorBackend::Function(_) => "function",
        }
    }

    pub fn setup(&self, schema: &mut OperatorSchema) {
        match self {
            OperatorBackend::Native(op) => op.setup(schema),
            OperatorBackend::Function(op) => (op.setup)(schema),
        }
    }

    pub async fn initialize(&mut self, params: &Parameters) -> Result<(), OperatorError> {
        match self {
            OperatorBackend::Native(op) => op.initialize(params).await,
            OperatorBackend::Function(_) => Ok(()),
        }
    }

    pub async fn start(&mut self) -> Result<(), OperatorError> {
        match self {
            OperatorBackend::Native(op) => op.start().await,
            OperatorBackend::Function(_) => Ok(()),
        }
    }

    pub async fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        match self {
            OperatorBackend::Native(op) => op.compute(input, output, ctx).await,
            OperatorBackend::Function(op) => (op.compute)(input, output, ctx),
        }
    }

    pub async fn stop(&mut self) -> Result<(), OperatorError> {
        match self {
            OperatorBackend::Native(op) => op.stop().await,
            OperatorBackend::Function(_) => Ok(()),
        }
    }
}

impl fmt::Debug for OperatorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorBackend({}: {})", self.operator_type(), self.type_name())
    }
}

/// Everything needed to add an operator to a fragment
#[derive(Debug)]
pub struct OperatorDef {
    pub name: String,
    pub backend: OperatorBackend,
    pub conditions: Vec<Box<dyn Condition>>,
    pub resources: Vec<Arc<dyn Resource>>,
    pub args: ArgList,
}

impl OperatorDef {
    pub fn new(name: impl Into<String>, operator: impl Operator + 'static) -> Self {
        Self::with_backend(name, OperatorBackend::Native(Box::new(operator)))
    }

    pub fn from_boxed(name: impl Into<String>, operator: Box<dyn Operator>) -> Self {
        Self::with_backend(name, OperatorBackend::Native(operator))
    }

    pub fn from_fn<S, C>(name: impl Into<String>, setup: S, compute: C) -> Self
    where
        S: Fn(&mut OperatorSchema) + Send + 'static,
        C: FnMut(&mut InputContext, &mut OutputContext, &ExecutionContext) -> Result<(), OperatorError>
            + Send
            + 'static,
    {
        Self::with_backend(name, OperatorBackend::Function(FnOperator::new(setup, compute)))
    }

    fn with_backend(name: impl Into<String>, backend: OperatorBackend) -> Self {
        Self {
            name: name.into(),
            backend,
            conditions: Vec::new(),
            resources: Vec::new(),
            args: ArgList::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    pub fn with_boxed_condition(mut self, condition: Box<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_resource(mut self, resource: Arc<dyn Resource>) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.add(Arg::new(name, value));
        self
    }

    pub fn with_args(mut self, args: &ArgList) -> Self {
        self.args.extend(args);
        self
    }
}
