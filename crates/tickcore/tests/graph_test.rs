use tickcore::{Application, CompositionError, CountCondition, Fragment, OperatorDef, OperatorSchema};

fn op(name: &str, inputs: &[&'static str], outputs: &[&'static str]) -> OperatorDef {
    let inputs = inputs.to_vec();
    let outputs = outputs.to_vec();
    OperatorDef::from_fn(
        name,
        move |schema: &mut OperatorSchema| {
            for port in &inputs {
                schema.input(*port);
            }
            for port in &outputs {
                schema.output(*port);
            }
        },
        |_, _, _| Ok(()),
    )
}

#[test]
fn test_duplicate_operator_name() {
    let mut fragment = Fragment::new("main");
    fragment.add_operator(op("tx", &[], &["out"])).unwrap();

    let result = fragment.add_operator(op("tx", &[], &["out"]));
    assert_eq!(result, Err(CompositionError::DuplicateOperatorName("tx".to_string())));
    assert_eq!(fragment.len(), 1);
}

#[test]
fn test_duplicate_condition_name() {
    let mut fragment = Fragment::new("main");
    let def = op("tx", &[], &["out"])
        .with_condition(CountCondition::new(1).named("limit"))
        .with_condition(CountCondition::new(2).named("limit"));

    assert!(matches!(
        fragment.add_operator(def),
        Err(CompositionError::DuplicateCondition { condition, .. }) if condition == "limit"
    ));
    assert!(fragment.is_empty());
}

#[test]
fn test_connect_errors() {
    let mut fragment = Fragment::new("main");
    let tx = fragment.add_operator(op("tx", &[], &["out"])).unwrap();
    let rx = fragment.add_operator(op("rx", &["in"], &[])).unwrap();

    assert!(matches!(
        fragment.connect(tx, "missing", rx, "in"),
        Err(CompositionError::PortNotFound { port, .. }) if port == "missing"
    ));
    assert!(matches!(
        fragment.connect(rx, "in", tx, "out"),
        Err(CompositionError::DirectionMismatch { .. })
    ));

    fragment.connect(tx, "out", rx, "in").unwrap();
    assert!(matches!(
        fragment.connect(tx, "out", rx, "in"),
        Err(CompositionError::DuplicateEdge { .. })
    ));
    assert_eq!(fragment.graph().edges().len(), 1);
}

#[test]
fn test_cross_fragment_connect() {
    let mut left = Fragment::new("left");
    let mut right = Fragment::new("right");
    let tx = left.add_operator(op("tx", &[], &["out"])).unwrap();
    let rx = right.add_operator(op("rx", &["in"], &[])).unwrap();

    assert!(matches!(
        left.connect(tx, "out", rx, "in"),
        Err(CompositionError::CrossFragment { .. })
    ));
}

#[test]
fn test_add_flow_infers_single_ports() {
    let mut fragment = Fragment::new("main");
    let tx = fragment.add_operator(op("tx", &[], &["out"])).unwrap();
    let rx = fragment.add_operator(op("rx", &["in"], &[])).unwrap();
    let split = fragment.add_operator(op("split", &[], &["a", "b"])).unwrap();

    fragment.add_flow(tx, rx, &[]).unwrap();
    let edge = &fragment.graph().edges()[0];
    assert_eq!((edge.out_port.as_str(), edge.in_port.as_str()), ("out", "in"));

    assert!(matches!(
        fragment.add_flow(split, rx, &[]),
        Err(CompositionError::AmbiguousPorts { .. })
    ));
    fragment.add_flow(split, rx, &[("a", "in"), ("b", "in")]).unwrap();
    assert_eq!(fragment.graph().edges_into(rx.index, "in").count(), 3);
}

#[test]
fn test_graph_queries() {
    let mut fragment = Fragment::new("main");
    let a = fragment.add_operator(op("a", &[], &["out"])).unwrap();
    let b = fragment.add_operator(op("b", &["in"], &["out"])).unwrap();
    let c = fragment.add_operator(op("c", &["in"], &["out"])).unwrap();
    let d = fragment.add_operator(op("d", &["in"], &[])).unwrap();

    fragment.add_flow(a, b, &[]).unwrap();
    fragment.add_flow(a, c, &[]).unwrap();
    fragment.add_flow(b, d, &[]).unwrap();
    fragment.add_flow(c, d, &[]).unwrap();

    assert_eq!(fragment.root_operators(), vec![a]);
    assert_eq!(fragment.leaf_operators(), vec![d]);
    assert_eq!(fragment.next_operators(a), vec![b, c]);
    assert_eq!(fragment.previous_operators(d), vec![b, c]);
    assert_eq!(fragment.ordered_operators(), vec![a, b, c, d]);
    assert!(!fragment.graph().is_cyclic());

    assert_eq!(fragment.operator_by_name("c"), Some(c));
    assert_eq!(fragment.operator_name(d), Some("d"));
    assert_eq!(fragment.operator_names().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    assert!(fragment.operator_schema(b).unwrap().input_port("in").is_some());
}

#[test]
fn test_scheduling_order_with_cycle() {
    let mut fragment = Fragment::new("loop");
    let source = fragment.add_operator(op("source", &[], &["out"])).unwrap();
    let first = fragment.add_operator(op("first", &["in", "back"], &["out"])).unwrap();
    let second = fragment.add_operator(op("second", &["in"], &["out"])).unwrap();

    fragment.connect(source, "out", first, "in").unwrap();
    fragment.connect(first, "out", second, "in").unwrap();
    fragment.connect(second, "out", first, "back").unwrap();

    assert!(fragment.graph().is_cyclic());
    assert_eq!(fragment.ordered_operators(), vec![source, first, second]);
}

#[test]
fn test_application_fragments() {
    let mut app = Application::new("demo").with_description("two fragments").with_version("1.2.0");
    assert_eq!(app.version, "1.2.0");

    app.add_fragment(Fragment::new("camera")).unwrap();
    app.add_fragment(Fragment::new("display")).unwrap();

    assert_eq!(
        app.add_fragment(Fragment::new("camera")),
        Err(CompositionError::DuplicateFragmentName("camera".to_string()))
    );
    assert_eq!(
        app.add_fragment(Fragment::new("all")),
        Err(CompositionError::ReservedFragmentName("all".to_string()))
    );

    let names: Vec<&str> = app.fragments().iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["camera", "display"]);
    assert!(app.fragment_mut("display").is_some());
    assert!(app.fragment("missing").is_none());
}
