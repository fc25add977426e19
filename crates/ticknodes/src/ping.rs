use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tickcore::{
    ArgList, ExecutionContext, InputContext, Operator, OperatorError, OperatorSchema, OutputContext,
    Parameters, Value,
};
use tickruntime::{OperatorFactory, OperatorMetadata};

/// Emits an increasing integer on `out` every tick
pub struct PingTxOp {
    next: i64,
}

impl PingTxOp {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl Default for PingTxOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for PingTxOp {
    fn operator_type(&self) -> &str {
        "ping.tx"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.output("out");
        schema
            .param("start")
            .description("First value emitted")
            .default_value(1i64);
    }

    async fn initialize(&mut self, params: &Parameters) -> Result<(), OperatorError> {
        self.next = params
            .require_i64("start")
            .map_err(|e| OperatorError::Configuration(e.to_string()))?;
        Ok(())
    }

    async fn compute(
        &mut self,
        _input: &mut InputContext,
        output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        let value = self.next;
        self.next += 1;
        tracing::debug!("{} sending {}", ctx.operator, value);
        output.emit_value(value, "out")?;
        Ok(())
    }
}

/// Values seen by a [`PingRxOp`], shared with whoever created it
pub type ReceivedValues = Arc<Mutex<Vec<Value>>>;

/// Receives values on `in` and records them
pub struct PingRxOp {
    received: ReceivedValues,
}

impl PingRxOp {
    pub fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn received(&self) -> ReceivedValues {
        self.received.clone()
    }
}

impl Default for PingRxOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for PingRxOp {
    fn operator_type(&self) -> &str {
        "ping.rx"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.input("in");
    }

    async fn compute(
        &mut self,
        input: &mut InputContext,
        _output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        let value = input
            .receive_value("in")?
            .ok_or_else(|| OperatorError::MissingInput("in".to_string()))?;
        tracing::info!("{} received {:?}", ctx.operator, value);
        ctx.events.data("in", value.clone());
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
        Ok(())
    }
}

pub struct PingTxOpFactory;

impl OperatorFactory for PingTxOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(PingTxOp::new()))
    }

    fn operator_type(&self) -> &str {
        "ping.tx"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&PingTxOp::new(), "Emits an increasing integer", "ping")
    }
}

pub struct PingRxOpFactory;

impl OperatorFactory for PingRxOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(PingRxOp::new()))
    }

    fn operator_type(&self) -> &str {
        "ping.rx"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&PingRxOp::new(), "Logs received values", "ping")
    }
}
