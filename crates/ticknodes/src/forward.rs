use async_trait::async_trait;
use tickcore::{
    ArgList, ExecutionContext, InputContext, Operator, OperatorError, OperatorSchema, OutputContext,
};
use tickruntime::{OperatorFactory, OperatorMetadata};

/// Passes each entity from `in` to `out` unchanged (same entity, no copy)
pub struct ForwardOp;

#[async_trait]
impl Operator for ForwardOp {
    fn operator_type(&self) -> &str {
        "forward"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.input("in");
        schema.output("out");
    }

    async fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        _ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        if let Some(entity) = input.receive("in")? {
            output.emit(entity, "out")?;
        }
        Ok(())
    }
}

pub struct ForwardOpFactory;

impl OperatorFactory for ForwardOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(ForwardOp))
    }

    fn operator_type(&self) -> &str {
        "forward"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&ForwardOp, "Forwards entities unchanged", "flow")
    }
}
