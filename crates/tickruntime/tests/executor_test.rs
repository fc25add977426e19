use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickcore::{
    BooleanCondition, ConditionType, CountCondition, DataType, Entity, EventBus, ExecutionEvent, Fragment,
    ExternalArray, HostArray, InitializationError, OperatorDef, OperatorError, OperatorSchema, OperatorState,
    PeriodicCondition, Tensor, TickError, Value,
};
use tickruntime::{ExecutorConfig, GraphExecutor, RuntimeConfig, StopReason, TickRuntime};

type Log = Arc<Mutex<Vec<String>>>;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Emits its tick number on `out`
fn counter(name: &str) -> OperatorDef {
    OperatorDef::from_fn(
        name,
        |schema: &mut OperatorSchema| {
            schema.output("out");
        },
        |_, output, ctx| {
            output.emit_value(ctx.tick as i64, "out")?;
            Ok(())
        },
    )
}

/// Records every value arriving on `in`
fn collector(name: &str, log: &Log) -> OperatorDef {
    let log = log.clone();
    OperatorDef::from_fn(
        name,
        |schema: &mut OperatorSchema| {
            schema.input("in");
        },
        move |input, _, _| {
            let value = input
                .receive_value("in")?
                .ok_or_else(|| OperatorError::MissingInput("in".to_string()))?;
            log.lock().unwrap().push(format!("{:?}", value));
            Ok(())
        },
    )
}

#[tokio::test]
async fn test_count_condition_limits_ticks() {
    init_tracing();

    let received = log();
    let mut fragment = Fragment::new("ping");
    let tx = fragment
        .add_operator(counter("tx").with_condition(CountCondition::new(3)))
        .unwrap();
    let rx = fragment.add_operator(collector("rx", &received)).unwrap();
    fragment.add_flow(tx, rx, &[]).unwrap();

    let executor = GraphExecutor::new(ExecutorConfig::default());
    let result = executor.execute(fragment, &EventBus::default()).await.unwrap();

    assert_eq!(result.ticks_of("tx"), 3);
    assert_eq!(result.ticks_of("rx"), 3);
    assert_eq!(entries(&received), vec!["Int(1)", "Int(2)", "Int(3)"]);
    // rx waits for messages that can no longer arrive
    assert_eq!(result.stop_reason, StopReason::Deadlock);
    assert!(result.succeeded());
    assert!(result.states.values().all(|s| *s == OperatorState::Stopped));
}

#[tokio::test]
async fn test_unconditioned_inputs_tick_without_messages() {
    init_tracing();

    let trace = log();
    let mut fragment = Fragment::new("conditions");

    let tx_trace = trace.clone();
    let tx = fragment
        .add_operator(
            OperatorDef::from_fn(
                "tx",
                |schema: &mut OperatorSchema| {
                    schema.output("out1");
                    schema.output("out2");
                },
                move |_, output, ctx| {
                    let (first, second) = match ctx.tick {
                        2 => (true, false),
                        3 => (false, true),
                        4 => (true, true),
                        _ => (false, false),
                    };
                    let label = match (first, second) {
                        (false, false) => "TX",
                        (true, false) => "T1O",
                        (false, true) => "T2O",
                        (true, true) => "TO",
                    };
                    tx_trace.lock().unwrap().push(format!("{}{}", label, ctx.tick));
                    if first {
                        output.emit_value(2i64, "out1")?;
                    }
                    if second {
                        output.emit(Entity::new(), "out2")?;
                    }
                    Ok(())
                },
            )
            .with_condition(CountCondition::new(5)),
        )
        .unwrap();

    let rx_trace = trace.clone();
    let rx = fragment
        .add_operator(
            OperatorDef::from_fn(
                "rx",
                |schema: &mut OperatorSchema| {
                    schema.input("in1").condition(ConditionType::None);
                    schema.input("in2").condition(ConditionType::None);
                },
                move |input, _, ctx| {
                    let first = input.receive("in1")?.is_some();
                    let second = input.receive("in2")?.is_some();
                    let label = match (first, second) {
                        (false, false) => "RX",
                        (true, false) => "R1O",
                        (false, true) => "R2O",
                        (true, true) => "RO",
                    };
                    rx_trace.lock().unwrap().push(format!("{}{}", label, ctx.tick));
                    Ok(())
                },
            )
            .with_condition(CountCondition::new(5)),
        )
        .unwrap();

    fragment
        .add_flow(tx, rx, &[("out1", "in1"), ("out2", "in2")])
        .unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(entries(&trace).concat(), "TX1RX1T1O2R1O2T2O3R2O3TO4RO4TX5RX5");
    assert_eq!(result.stop_reason, StopReason::AllStopped);
    assert_eq!(result.total_ticks(), 10);
}

#[tokio::test]
async fn test_fan_in_follows_edge_declaration_order() {
    init_tracing();

    let received = log();
    let mut fragment = Fragment::new("fan_in");
    let mut sources = Vec::new();
    for label in ["A", "B", "C"] {
        let def = OperatorDef::from_fn(
            label,
            |schema: &mut OperatorSchema| {
                schema.output("out");
            },
            move |_, output, _| {
                output.emit_value(label, "out")?;
                Ok(())
            },
        )
        .with_condition(CountCondition::new(1));
        sources.push(fragment.add_operator(def).unwrap());
    }

    let sink_log = received.clone();
    let sink = fragment
        .add_operator(
            OperatorDef::from_fn(
                "sink",
                |schema: &mut OperatorSchema| {
                    schema.input("in").condition(ConditionType::None);
                },
                move |input, _, _| {
                    for entity in input.receive_many("in")? {
                        let value = entity.and_then(|e| e.as_value().cloned());
                        if let Some(Value::String(s)) = value {
                            sink_log.lock().unwrap().push(s);
                        }
                    }
                    Ok(())
                },
            )
            .with_condition(CountCondition::new(1)),
        )
        .unwrap();

    for source in &sources {
        fragment.add_flow(*source, sink, &[]).unwrap();
    }

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(entries(&received), vec!["A", "B", "C"]);
    assert_eq!(result.stop_reason, StopReason::AllStopped);
}

#[tokio::test]
async fn test_fan_out_leaves_external_refcount_unchanged() {
    init_tracing();

    let array = HostArray::arange_f32("frame", vec![2, 2]);
    let before = array.ref_count();
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let mut fragment = Fragment::new("fan_out");
    let source_array = array.clone();
    let source = fragment
        .add_operator(
            OperatorDef::from_fn(
                "source",
                |schema: &mut OperatorSchema| {
                    schema.output("out");
                },
                move |_, output, _| {
                    let tensor = Tensor::as_tensor(source_array.clone())?;
                    let mut entity = Entity::new();
                    entity.add("frame", tensor)?;
                    output.emit(entity, "out")?;
                    Ok(())
                },
            )
            .with_condition(CountCondition::new(2)),
        )
        .unwrap();

    for name in ["left", "right"] {
        let seen = seen.clone();
        let sink = fragment
            .add_operator(OperatorDef::from_fn(
                name,
                |schema: &mut OperatorSchema| {
                    schema.input("in");
                },
                move |input, _, _| {
                    if let Some(entity) = input.receive("in")? {
                        if let Some(tensor) = entity.tensor("frame") {
                            seen.lock().unwrap().push(tensor.data_ptr());
                        }
                    }
                    Ok(())
                },
            ))
            .unwrap();
        fragment.add_flow(source, sink, &[]).unwrap();
    }

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(result.ticks_of("left"), 2);
    assert_eq!(result.ticks_of("right"), 2);

    let pointers = seen.lock().unwrap().clone();
    assert_eq!(pointers.len(), 4);
    assert!(pointers.iter().all(|&p| p == pointers[0]), "consumers share one buffer");
    assert_eq!(array.ref_count(), before);
}

#[tokio::test]
async fn test_periodic_condition_spaces_ticks() {
    init_tracing();

    let stamps: Arc<Mutex<Vec<tokio::time::Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = stamps.clone();
    let mut fragment = Fragment::new("periodic");
    fragment
        .add_operator(
            OperatorDef::from_fn(
                "clock",
                |_: &mut OperatorSchema| {},
                move |_, _, ctx| {
                    recorder.lock().unwrap().push(ctx.scheduled_at);
                    Ok(())
                },
            )
            .with_condition(PeriodicCondition::new(Duration::from_millis(20)))
            .with_condition(CountCondition::new(3)),
        )
        .unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(result.ticks_of("clock"), 3);
    assert_eq!(result.stop_reason, StopReason::AllStopped);

    let stamps = stamps.lock().unwrap().clone();
    assert_eq!(stamps.len(), 3);
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(20));
    }
}

#[tokio::test]
async fn test_periodic_consumer_reaches_deadlock() {
    init_tracing();

    let received = log();
    let mut fragment = Fragment::new("paced_rx");
    let tx = fragment
        .add_operator(counter("tx").with_condition(CountCondition::new(3)))
        .unwrap();
    let rx = fragment
        .add_operator(collector("rx", &received).with_condition(PeriodicCondition::new(Duration::from_millis(1))))
        .unwrap();
    fragment.add_flow(tx, rx, &[]).unwrap();

    let config = ExecutorConfig {
        max_duration: Some(Duration::from_secs(5)),
        ..ExecutorConfig::default()
    };
    let result = GraphExecutor::new(config)
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(result.ticks_of("rx"), 3);
    assert_eq!(entries(&received), vec!["Int(1)", "Int(2)", "Int(3)"]);
    assert_eq!(result.stop_reason, StopReason::Deadlock);
    assert!(result.duration_ms < 1000);
}

#[tokio::test]
async fn test_initialization_errors_prevent_start() {
    init_tracing();

    let mut missing = Fragment::new("missing_param");
    missing
        .add_operator(OperatorDef::from_fn(
            "reader",
            |schema: &mut OperatorSchema| {
                schema.param("path");
            },
            |_, _, _| Ok(()),
        ))
        .unwrap();

    let executor = GraphExecutor::new(ExecutorConfig::default());
    let error = executor
        .execute(missing, &EventBus::default())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        TickError::Initialization(InitializationError::MissingParameter { ref parameter, .. }) if parameter == "path"
    ));

    let mut bad_period = Fragment::new("bad_period");
    bad_period
        .add_operator(
            counter("tx").with_condition(PeriodicCondition::new(&Value::from("fast")).named("tempo")),
        )
        .unwrap();

    let error = executor
        .execute(bad_period, &EventBus::default())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        TickError::Initialization(InitializationError::InvalidCondition { ref condition, .. }) if condition == "tempo"
    ));
}

#[tokio::test]
async fn test_compute_failure_stops_only_that_operator() {
    init_tracing();

    let mut fragment = Fragment::new("failures");
    fragment
        .add_operator(
            OperatorDef::from_fn(
                "flaky",
                |_: &mut OperatorSchema| {},
                |_, _, ctx| {
                    if ctx.tick == 2 {
                        return Err(OperatorError::ExecutionFailed("sensor offline".to_string()));
                    }
                    Ok(())
                },
            )
            .with_condition(CountCondition::new(5)),
        )
        .unwrap();
    fragment
        .add_operator(
            OperatorDef::from_fn("steady", |_: &mut OperatorSchema| {}, |_, _, _| Ok(()))
                .with_condition(CountCondition::new(4)),
        )
        .unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(result.ticks_of("flaky"), 2);
    assert_eq!(result.ticks_of("steady"), 4);
    assert!(!result.succeeded());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].operator, "flaky");
    assert_eq!(result.failures[0].tick, 2);
    assert!(result.failures[0].error.contains("sensor offline"));
    assert_eq!(result.stop_reason, StopReason::AllStopped);
}

#[tokio::test]
async fn test_compute_panic_stops_only_that_operator() {
    init_tracing();

    let mut fragment = Fragment::new("panics");
    fragment
        .add_operator(
            OperatorDef::from_fn("bad", |_: &mut OperatorSchema| {}, |_, _, _| panic!("boom"))
                .with_condition(CountCondition::new(1)),
        )
        .unwrap();
    fragment
        .add_operator(
            OperatorDef::from_fn("good", |_: &mut OperatorSchema| {}, |_, _, _| Ok(()))
                .with_condition(CountCondition::new(3)),
        )
        .unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(result.ticks_of("good"), 3);
    assert_eq!(result.ticks_of("bad"), 1);
    assert_eq!(result.states["bad"], OperatorState::Stopped);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].operator, "bad");
    assert!(result.failures[0].error.contains("boom"));
    assert_eq!(result.stop_reason, StopReason::AllStopped);
}

#[tokio::test]
async fn test_boolean_condition_gates_operator() {
    init_tracing();

    let gate = BooleanCondition::new(true).named("gate");
    let handle = gate.clone();
    let mut fragment = Fragment::new("gated");
    fragment
        .add_operator(
            OperatorDef::from_fn("worker", |_: &mut OperatorSchema| {}, move |_, _, ctx| {
                if ctx.tick == 3 {
                    handle.disable_tick();
                }
                Ok(())
            })
            .with_condition(gate),
        )
        .unwrap();

    let result = GraphExecutor::new(ExecutorConfig::default())
        .execute(fragment, &EventBus::default())
        .await
        .unwrap();

    assert_eq!(result.ticks_of("worker"), 3);
    assert_eq!(result.stop_reason, StopReason::AllStopped);
}

#[tokio::test]
async fn test_stop_request_ends_run() {
    init_tracing();

    let mut fragment = Fragment::new("endless");
    fragment
        .add_operator(
            counter("tx")
                .with_condition(CountCondition::new(-1))
                .with_condition(PeriodicCondition::new(Duration::from_millis(5))),
        )
        .unwrap();

    let runtime = TickRuntime::new();
    let running = runtime.spawn(fragment);
    tokio::time::sleep(Duration::from_millis(50)).await;
    running.request_stop();

    let result = running.wait().await.unwrap();
    assert_eq!(result.stop_reason, StopReason::StopRequested);
    assert!(result.ticks_of("tx") > 0);
    assert_eq!(result.states["tx"], OperatorState::Stopped);
}

#[tokio::test]
async fn test_operator_can_stop_execution() {
    init_tracing();

    let mut fragment = Fragment::new("self_stopping");
    fragment
        .add_operator(OperatorDef::from_fn("worker", |_: &mut OperatorSchema| {}, |_, _, ctx| {
            if ctx.tick == 3 {
                ctx.stop_execution();
            }
            Ok(())
        }))
        .unwrap();

    let result = TickRuntime::new().run(fragment).await.unwrap();
    assert_eq!(result.stop_reason, StopReason::StopRequested);
    assert_eq!(result.ticks_of("worker"), 3);
}

#[tokio::test]
async fn test_max_duration_bounds_idle_graph() {
    init_tracing();

    let mut fragment = Fragment::new("idle");
    let received = log();
    let tx = fragment
        .add_operator(counter("tx").with_condition(CountCondition::new(1)))
        .unwrap();
    let rx = fragment.add_operator(collector("rx", &received)).unwrap();
    fragment.add_flow(tx, rx, &[]).unwrap();

    let config = RuntimeConfig {
        executor: ExecutorConfig {
            stop_on_deadlock: false,
            max_duration: Some(Duration::from_millis(40)),
            ..ExecutorConfig::default()
        },
        ..RuntimeConfig::default()
    };
    let result = TickRuntime::with_config(config).run(fragment).await.unwrap();

    assert_eq!(result.stop_reason, StopReason::MaxDuration);
    assert_eq!(entries(&received), vec!["Int(1)"]);
    assert!(result.duration_ms >= 40);
}

#[tokio::test]
async fn test_run_emits_events() {
    init_tracing();

    let runtime = TickRuntime::new();
    let mut events = runtime.subscribe_events();

    let mut fragment = Fragment::new("events");
    fragment
        .add_operator(
            OperatorDef::from_fn("talker", |_: &mut OperatorSchema| {}, |_, _, ctx| {
                ctx.events.info(format!("tick {}", ctx.tick));
                Ok(())
            })
            .with_condition(CountCondition::new(2)),
        )
        .unwrap();

    let result = runtime.run(fragment).await.unwrap();

    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }

    assert!(matches!(collected.first(), Some(ExecutionEvent::RunStarted { operators: 1, .. })));
    assert!(matches!(
        collected.last(),
        Some(ExecutionEvent::RunCompleted { total_ticks: 2, .. })
    ));
    let ticked = collected
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::OperatorTicked { .. }))
        .count();
    let messages = collected
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::OperatorEvent { .. }))
        .count();
    assert_eq!(ticked, 2);
    assert_eq!(messages, 2);
    assert!(collected.iter().all(|e| match e {
        ExecutionEvent::RunStarted { execution_id, .. }
        | ExecutionEvent::RunCompleted { execution_id, .. }
        | ExecutionEvent::OperatorTicked { execution_id, .. }
        | ExecutionEvent::OperatorStopped { execution_id, .. }
        | ExecutionEvent::OperatorFailed { execution_id, .. }
        | ExecutionEvent::OperatorEvent { execution_id, .. } => *execution_id == result.execution_id,
    }));
}

#[tokio::test]
async fn test_pooled_tensors_return_after_run() {
    init_tracing();

    let pool = Arc::new(tickcore::BlockMemoryPool::new("pool", 16, 2));
    let mut fragment = Fragment::new("pooled");
    let received = log();

    let tx = fragment
        .add_operator(
            OperatorDef::from_fn(
                "tx",
                |schema: &mut OperatorSchema| {
                    schema.output("out");
                },
                |_, output, ctx| {
                    let pool = ctx
                        .resource::<tickcore::BlockMemoryPool>("pool")
                        .ok_or_else(|| OperatorError::Configuration("no pool".to_string()))?;
                    let block = pool
                        .allocate(16)
                        .map_err(|e| OperatorError::ExecutionFailed(e.to_string()))?;
                    let tensor = Tensor::from_block(block, vec![4], DataType::F32)?;
                    let mut entity = Entity::from_value(ctx.tick as i64);
                    entity.add("frame", tensor)?;
                    output.emit(entity, "out")?;
                    Ok(())
                },
            )
            .with_resource(pool.clone())
            .with_condition(CountCondition::new(3)),
        )
        .unwrap();
    let rx = fragment.add_operator(collector("rx", &received)).unwrap();
    fragment.add_flow(tx, rx, &[]).unwrap();

    let result = TickRuntime::new().run(fragment).await.unwrap();

    assert!(result.succeeded(), "{:?}", result.failures);
    assert_eq!(result.ticks_of("rx"), 3);
    assert_eq!(pool.available(), 2);
}
