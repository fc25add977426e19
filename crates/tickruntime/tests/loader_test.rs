use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tickcore::{
    Application, ArgList, CompositionError, ExecutionContext, InputContext, Operator, OperatorError, OperatorSchema,
    OutputContext, Parameters, TickError,
};
use tickruntime::{
    GraphDefinition, OperatorFactory, OperatorMetadata, OperatorRegistry, RuntimeConfig, StopReason, TickRuntime,
};

type Seen = Arc<Mutex<Vec<i64>>>;

struct SourceOp {
    next: i64,
}

#[async_trait]
impl Operator for SourceOp {
    fn operator_type(&self) -> &str {
        "test.source"
    }

    fn setup(&self, schema: &mut OperatorSchema) {
        schema.output("out");
        schema.param("start").default_value(0i64);
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
        _ctx: &ExecutionContext,
    ) -> Result<(), OperatorError> {
        output.emit_value(self.next, "out")?;
        self.next += 1;
        Ok(())
    }
}

struct SinkOp {
    seen: Seen,
}

#[async_trait]
impl Operator for SinkOp {
    fn operator_type(&self) -> &str {
        "test.sink"
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
        if let Some(value) = input.receive_value("in")?.and_then(|v| v.as_i64()) {
            self.seen.lock().unwrap().push(value);
        }
        Ok(())
    }
}

struct SourceFactory;

impl OperatorFactory for SourceFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(SourceOp { next: 0 }))
    }

    fn operator_type(&self) -> &str {
        "test.source"
    }

    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::from_operator(&SourceOp { next: 0 }, "Counts upwards", "test")
    }
}

struct SinkFactory {
    seen: Seen,
}

impl OperatorFactory for SinkFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Ok(Box::new(SinkOp {
            seen: self.seen.clone(),
        }))
    }

    fn operator_type(&self) -> &str {
        "test.sink"
    }
}

struct BrokenFactory;

impl OperatorFactory for BrokenFactory {
    fn create(&self, _args: &ArgList) -> Result<Box<dyn Operator>, OperatorError> {
        Err(OperatorError::Configuration("device unavailable".to_string()))
    }

    fn operator_type(&self) -> &str {
        "test.broken"
    }
}

fn registry(seen: &Seen) -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    registry.register(Arc::new(SourceFactory));
    registry.register(Arc::new(SinkFactory { seen: seen.clone() }));
    registry.register(Arc::new(BrokenFactory));
    registry
}

const PIPELINE: &str = r#"
name: pipeline
config:
  source:
    start: 10
operators:
  - name: src
    type: test.source
    args_from: source
    conditions:
      - kind: count
        count: 3
  - name: sink
    type: test.sink
flows:
  - from: src
    to: sink
"#;

#[test]
fn test_registry_lists_types() {
    let seen = Seen::default();
    let registry = registry(&seen);

    assert_eq!(
        registry.list_operator_types(),
        vec!["test.broken", "test.sink", "test.source"]
    );
    assert!(registry.contains("test.sink"));

    let metadata = registry.get_metadata("test.source").unwrap();
    assert_eq!(metadata.category, "test");
    assert_eq!(metadata.outputs[0].name, "out");
    assert!(metadata.inputs.is_empty());

    let sink = registry.get_metadata("test.sink").unwrap();
    assert_eq!(sink.category, "general");
    assert!(registry.get_metadata("test.missing").is_none());
}

#[test]
fn test_registry_creation_errors() {
    let seen = Seen::default();
    let registry = registry(&seen);

    assert!(matches!(
        registry.create_operator("test.missing", &ArgList::new()),
        Err(CompositionError::UnknownOperatorType(t)) if t == "test.missing"
    ));
    assert!(matches!(
        registry.create_operator("test.broken", &ArgList::new()),
        Err(CompositionError::OperatorCreation { reason, .. }) if reason.contains("device unavailable")
    ));
}

#[tokio::test]
async fn test_definition_builds_and_runs() {
    let seen = Seen::default();
    let runtime = TickRuntime::with_registry(registry(&seen), RuntimeConfig::default());

    let definition = GraphDefinition::from_yaml_str(PIPELINE).unwrap();
    let fragment = definition.build(runtime.registry()).unwrap();
    assert_eq!(fragment.name(), "pipeline");
    assert_eq!(fragment.operator_names().collect::<Vec<_>>(), vec!["src", "sink"]);
    assert_eq!(fragment.graph().edges().len(), 1);

    let result = runtime.run(fragment).await.unwrap();
    assert_eq!(result.ticks_of("src"), 3);
    assert_eq!(*seen.lock().unwrap(), vec![10, 11, 12]);
}

#[tokio::test]
async fn test_inline_args_override_config() {
    let seen = Seen::default();
    let runtime = TickRuntime::with_registry(registry(&seen), RuntimeConfig::default());

    let yaml = PIPELINE.replace(
        "    args_from: source\n",
        "    args_from: source\n    args:\n      start: 100\n",
    );
    let fragment = GraphDefinition::from_yaml_str(&yaml)
        .unwrap()
        .build(runtime.registry())
        .unwrap();

    runtime.run(fragment).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![100, 101, 102]);
}

#[tokio::test]
async fn test_condition_kinds_from_yaml() {
    let seen = Seen::default();
    let runtime = TickRuntime::with_registry(registry(&seen), RuntimeConfig::default());

    let yaml = r#"
name: kinds
operators:
  - name: paced
    type: test.source
    conditions:
      - kind: periodic
        recess_period: 2ms
      - kind: count
        name: budget
        count: 2
  - name: idle
    type: test.source
    conditions:
      - kind: boolean
        enabled: false
  - name: sink
    type: test.sink
flows:
  - from: paced
    to: sink
    ports: [[out, in]]
"#;
    let fragment = GraphDefinition::from_yaml_str(yaml)
        .unwrap()
        .build(runtime.registry())
        .unwrap();

    let result = runtime.run(fragment).await.unwrap();
    assert_eq!(result.ticks_of("paced"), 2);
    assert_eq!(result.ticks_of("idle"), 0);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    assert_eq!(result.stop_reason, StopReason::Deadlock);
}

#[test]
fn test_definition_errors() {
    let seen = Seen::default();
    let registry = registry(&seen);

    assert!(matches!(
        GraphDefinition::from_yaml_str("name: [unterminated"),
        Err(TickError::Config(_))
    ));

    let unknown_type = r#"
name: bad
operators:
  - name: mystery
    type: test.missing
"#;
    assert!(matches!(
        GraphDefinition::from_yaml_str(unknown_type).unwrap().build(&registry),
        Err(TickError::Composition(CompositionError::UnknownOperatorType(_)))
    ));

    let dangling_flow = r#"
name: bad
operators:
  - name: src
    type: test.source
flows:
  - from: src
    to: nowhere
"#;
    assert!(matches!(
        GraphDefinition::from_yaml_str(dangling_flow).unwrap().build(&registry),
        Err(TickError::Composition(CompositionError::OperatorNotFound(name))) if name == "nowhere"
    ));
}

#[tokio::test]
async fn test_run_file() -> anyhow::Result<()> {
    let seen = Seen::default();
    let runtime = TickRuntime::with_registry(registry(&seen), RuntimeConfig::default());

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pipeline.yaml");
    std::fs::write(&path, PIPELINE)?;

    let result = runtime.run_file(&path).await?;
    assert_eq!(result.fragment, "pipeline");
    assert_eq!(*seen.lock().unwrap(), vec![10, 11, 12]);

    assert!(runtime.run_file(dir.path().join("absent.yaml")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_run_application_fragments() {
    let seen = Seen::default();
    let runtime = TickRuntime::with_registry(registry(&seen), RuntimeConfig::default());

    let mut application = Application::new("pair").with_version("0.2.0");
    for (name, start) in [("low", 0), ("high", 1000)] {
        let yaml = PIPELINE
            .replace("name: pipeline", &format!("name: {}", name))
            .replace("start: 10", &format!("start: {}", start));
        let fragment = GraphDefinition::from_yaml_str(&yaml)
            .unwrap()
            .build(runtime.registry())
            .unwrap();
        application.add_fragment(fragment).unwrap();
    }

    let results = runtime.run_application(application).await.unwrap();
    assert_eq!(
        results.iter().map(|r| r.fragment.as_str()).collect::<Vec<_>>(),
        vec!["low", "high"]
    );
    assert!(results.iter().all(|r| r.ticks_of("src") == 3));

    let mut values = seen.lock().unwrap().clone();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2, 1000, 1001, 1002]);
}
