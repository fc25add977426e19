use async_trait::async_trait;
use tickcore::{
    ArgList, ConditionType, ExecutionContext, InputContext, Operator, OperatorError, OperatorSchema,
    OutputContext, Payload,
};
use tickruntime::{OperatorFactory, OperatorMetadata};

/// Logs the components of whatever arrives on `in`.
///
/// The port has no condition, so the operator ticks even when nothing is
/// queued and only reports what it finds.
pub struct DebugOp;

#[async_trait]
impl Operator for DebugOp {
    fn operator_type(&self) -> &str {
        "debug.log"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.input("in").condition(ConditionType::None);
    }

    async fn compute(
        &mut self,
        input: &mut InputContext,
        _output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        let Some(entity) = input.receive("in")? else {
            ctx.events.info("DEBUG: (no message)");
            return Ok(());
        };

        ctx.events.info(format!("DEBUG: entity {}", entity.id()));
        for (name, payload) in entity.components() {
            let name = if name.is_empty() { "(unnamed)" } else { name };
            match payload {
                Payload::Value(value) => {
                    ctx.events.info(format!("  {}: {:?}", name, value));
                    ctx.events.data(name, value.clone());
                }
                Payload::Tensor(tensor) => ctx.events.info(format!("  {}: {:?}", name, tensor)),
                Payload::Object(_) => ctx.events.info(format!("  {}: <object>", name)),
            }
        }
        Ok(())
    }
}

pub struct DebugOpFactory;

impl OperatorFactory for DebugOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(DebugOp))
    }

    fn operator_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&DebugOp, "Logs entity components for debugging", "debug")
    }
}
