use async_trait::async_trait;
use tickcore::{
    ArgList, ExecutionContext, InputContext, Operator, OperatorError, OperatorSchema, OutputContext,
    Parameters,
};
use tickruntime::{OperatorFactory, OperatorMetadata};
use tokio::time::{sleep, Duration};

/// Holds each entity for `delay_ms` before passing it on
pub struct DelayOp {
    delay: Duration,
}

impl DelayOp {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
        }
    }
}

impl Default for DelayOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for DelayOp {
    fn operator_type(&self) -> &str {
        "time.delay"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.input("in");
        schema.output("out");
        schema
            .param("delay_ms")
            .description("Milliseconds to hold each entity")
            .default_value(10i64);
    }

    async fn initialize(&mut self, params: &Parameters) -> Result<(), OperatorError> {
        let delay_ms = params
            .require_f64("delay_ms")
            .map_err(|e| OperatorError::Configuration(e.to_string()))?;
        if delay_ms < 0.0 {
            return Err(OperatorError::Configuration("delay_ms must not be negative".to_string()));
        }
        self.delay = Duration::from_secs_f64(delay_ms / 1000.0);
        Ok(())
    }

    async fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        let Some(entity) = input.receive("in")? else {
            return Ok(());
        };

        ctx.events.info(format!("Delaying for {}ms", self.delay.as_millis()));
        sleep(self.delay).await;

        output.emit(entity, "out")?;
        Ok(())
    }
}

pub struct DelayOpFactory;

impl OperatorFactory for DelayOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(DelayOp::new()))
    }

    fn operator_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&DelayOp::new(), "Delay entities by a fixed time", "time")
    }
}
