use std::time::Duration;
use tickcore::{
    BooleanCondition, CountCondition, DataType, Entity, EventBus, ExternalArray, Fragment, HostArray, OperatorDef,
    OperatorSchema, OwnershipError, PeriodicCondition, Tensor, TickError,
};
use tickruntime::{ExecutorConfig, GraphExecutor, StopReason};

/// Emits one tensor whose external array was released once too often
fn leaky_source(label: &'static str) -> OperatorDef {
    OperatorDef::from_fn(
        "tx",
        |schema: &mut OperatorSchema| {
            schema.output("out");
        },
        move |_, output, _| {
            let array = HostArray::zeros(label, vec![4], DataType::U8);
            let tensor = Tensor::as_tensor(array.clone())?;
            // drop the creator's reference and the wrap's reference behind the tensor's back
            let _ = array.release();
            let _ = array.release();
            let mut entity = Entity::new();
            entity.add("t", tensor)?;
            output.emit(entity, "out")?;
            Ok(())
        },
    )
    .with_condition(CountCondition::new(1))
}

fn consumer() -> OperatorDef {
    OperatorDef::from_fn(
        "rx",
        |schema: &mut OperatorSchema| {
            schema.input("in");
        },
        |input, _, _| {
            drop(input.receive("in")?);
            Ok(())
        },
    )
}

fn expect_underflow(result: Result<tickruntime::ExecutionResult, TickError>, label: &str) {
    match result {
        Err(TickError::Ownership(OwnershipError::Underflow { object })) => assert_eq!(object, label),
        Err(other) => panic!("expected an ownership violation, got {}", other),
        Ok(result) => panic!("expected an ownership violation, run ended with {}", result.stop_reason),
    }
}

#[tokio::test]
async fn test_refcount_underflow_aborts_run() {
    let mut fragment = Fragment::new("leaky");
    let tx = fragment.add_operator(leaky_source("over_released")).unwrap();
    let rx = fragment.add_operator(consumer()).unwrap();
    fragment.add_flow(tx, rx, &[]).unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await;
    expect_underflow(result, "over_released");
}

#[tokio::test]
async fn test_underflow_while_draining_aborts_run() {
    let mut fragment = Fragment::new("leaky_queue");
    let tx = fragment.add_operator(leaky_source("left_in_queue")).unwrap();
    // never consumes, so the entity is only released when queues drain
    let rx = fragment
        .add_operator(consumer().with_condition(BooleanCondition::new(false)))
        .unwrap();
    fragment.add_flow(tx, rx, &[]).unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await;
    expect_underflow(result, "left_in_queue");
}

#[tokio::test]
async fn test_violation_does_not_abort_concurrent_run() {
    let mut leaky = Fragment::new("leaky");
    let tx = leaky.add_operator(leaky_source("neighbour")).unwrap();
    let rx = leaky.add_operator(consumer()).unwrap();
    leaky.add_flow(tx, rx, &[]).unwrap();

    let mut healthy = Fragment::new("healthy");
    healthy
        .add_operator(
            OperatorDef::from_fn("clock", |_: &mut OperatorSchema| {}, |_, _, _| Ok(()))
                .with_condition(PeriodicCondition::new(Duration::from_millis(5)))
                .with_condition(CountCondition::new(5)),
        )
        .unwrap();

    let events = EventBus::default();
    let executor = GraphExecutor::new(ExecutorConfig::default());
    let (leaky, healthy) = tokio::join!(executor.execute(leaky, &events), executor.execute(healthy, &events));

    expect_underflow(leaky, "neighbour");
    let healthy = healthy.unwrap();
    assert_eq!(healthy.ticks_of("clock"), 5);
    assert_eq!(healthy.stop_reason, StopReason::AllStopped);
}
