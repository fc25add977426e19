use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tickcore::{
    ArgList, BlockMemoryPool, DataType, Entity, ExecutionContext, ExternalArray, HostArray, InputContext,
    Operator, OperatorError, OperatorSchema, OutputContext, Parameters, Tensor,
};
use tickruntime::{OperatorFactory, OperatorMetadata};

/// Component name tensor operators read and write
pub const TENSOR_COMPONENT: &str = "tensor";

/// Emits a `rows x cols` f32 tensor per tick.
///
/// With a `BlockMemoryPool` resource named `pool` the tensor lives in a pool
/// block; otherwise it wraps a fresh [`HostArray`] without copying.
pub struct TensorSourceOp {
    shape: Vec<usize>,
}

impl TensorSourceOp {
    pub fn new() -> Self {
        Self { shape: vec![2, 3] }
    }

    fn make_tensor(&self, ctx: &ExecutionContext) -> Result<Tensor, OperatorError> {
        match ctx.resource::<BlockMemoryPool>("pool") {
            Some(pool) => {
                let nbytes = self.shape.iter().product::<usize>() * DataType::F32.itemsize();
                let mut block = pool.allocate(nbytes)?;
                let values = (0..self.shape.iter().product::<usize>()).map(|i| (i as f32).to_ne_bytes());
                for (chunk, bytes) in block.as_mut_slice().chunks_exact_mut(4).zip(values) {
                    chunk.copy_from_slice(&bytes);
                }
                Ok(Tensor::from_block(block, self.shape.clone(), DataType::F32)?)
            }
            None => {
                let label = format!("{}#{}", ctx.operator, ctx.tick);
                let array: Arc<dyn ExternalArray> = HostArray::arange_f32(label, self.shape.clone());
                Ok(Tensor::as_tensor(array)?)
            }
        }
    }
}

impl Default for TensorSourceOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for TensorSourceOp {
    fn operator_type(&self) -> &str {
        "tensor.source"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.output("out");
        schema.param("rows").default_value(2i64);
        schema.param("cols").default_value(3i64);
    }

    async fn initialize(&mut self, params: &Parameters) -> Result<(), OperatorError> {
        let dim = |name: &str| -> Result<usize, OperatorError> {
            let value = params
                .require_i64(name)
                .map_err(|e| OperatorError::Configuration(e.to_string()))?;
            usize::try_from(value)
                .map_err(|_| OperatorError::Configuration(format!("'{}' must not be negative", name)))
        };
        self.shape = vec![dim("rows")?, dim("cols")?];
        Ok(())
    }

    async fn compute(
        &mut self,
        _input: &mut InputContext,
        output: &mut OutputContext,
        ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        let tensor = self.make_tensor(ctx)?;
        let mut entity = Entity::new();
        entity.add(TENSOR_COMPONENT, tensor)?;
        output.emit(entity, "out")?;
        Ok(())
    }
}

/// What a [`TensorSinkOp`] saw for one received tensor
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSummary {
    pub shape: Vec<usize>,
    pub dtype: DataType,
    pub sum: f64,
}

pub type TensorSummaries = Arc<Mutex<Vec<TensorSummary>>>;

/// Receives tensors on `in` and records their shape and element sum
pub struct TensorSinkOp {
    seen: TensorSummaries,
}

impl TensorSinkOp {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn summaries(&self) -> TensorSummaries {
        self.seen.clone()
    }
}

impl Default for TensorSinkOp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for TensorSinkOp {
    fn operator_type(&self) -> &str {
        "tensor.sink"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.input("in");
    }

    async fn compute(
        &mut self,
        input: &mut InputContext,
        _output: &mut OutputContext,
        _ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        let entity = input
            .receive("in")?
            .ok_or_else(|| OperatorError::MissingInput("in".to_string()))?;
        let tensor = entity
            .tensor(TENSOR_COMPONENT)
            .ok_or_else(|| OperatorError::InvalidInputType {
                field: TENSOR_COMPONENT.to_string(),
                expected: "tensor".to_string(),
                actual: "missing".to_string(),
            })?;

        let sum = tensor
            .to_f32_vec()
            .map(|values| values.iter().map(|v| *v as f64).sum())
            .unwrap_or(0.0);
        tracing::debug!("Received tensor {:?} (sum {})", tensor.shape(), sum);

        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TensorSummary {
                shape: tensor.shape().to_vec(),
                dtype: tensor.dtype(),
                sum,
            });
        Ok(())
    }
}

pub struct TensorSourceOpFactory;

impl OperatorFactory for TensorSourceOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(TensorSourceOp::new()))
    }

    fn operator_type(&self) -> &str {
        "tensor.source"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&TensorSourceOp::new(), "Emits an f32 tensor per tick", "tensor")
    }
}

pub struct TensorSinkOpFactory;

impl OperatorFactory for TensorSinkOpFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(TensorSinkOp::new()))
    }

    fn operator_type(&self) -> &str {
        "tensor.sink"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&TensorSinkOp::new(), "Records received tensors", "tensor")
    }
}
