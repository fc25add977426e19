//! Turns a composed fragment into the run-time state the executor drives:
//! one queue per edge, port handles, port conditions and initialized
//! operator backends.

use indexmap::IndexMap;
use std::sync::Arc;
use tickcore::graph::OperatorGraph;
use tickcore::transport::{EdgeQueue, SharedQueue};
use tickcore::{
    Condition, ConditionType, DownstreamMessageAffordableCondition, FragmentParts, InitializationError,
    InputContext, MessageAvailableCondition, OperatorBackend, OperatorEntry, OperatorSchema, OperatorState,
    OutputContext, ResourceMap, SchedulingStatus, TickError,
};
use tokio::time::Instant;

pub(crate) struct OperatorSlot {
    pub name: String,
    pub type_name: String,
    pub backend: Option<OperatorBackend>,
    pub input: Option<InputContext>,
    pub output: Option<OutputContext>,
    pub conditions: Vec<Box<dyn Condition>>,
    pub resources: ResourceMap,
    pub state: OperatorState,
    pub ticks: u64,
    /// Producers that precede this operator in the scheduling order
    pub deps: Vec<usize>,
    /// Set by `evaluate` when only time-based conditions hold the operator back
    wake: Option<Instant>,
}

impl OperatorSlot {
    pub fn is_stopped(&self) -> bool {
        self.state == OperatorState::Stopped
    }

    /// AND over every condition; stops at the first NEVER
    pub fn evaluate(&mut self, now: Instant) -> SchedulingStatus {
        let mut status = SchedulingStatus::Ready;
        let mut wake: Option<Instant> = None;
        let mut timed = true;
        for condition in self.conditions.iter_mut() {
            let result = condition.check(now);
            tracing::trace!("Operator '{}' condition '{}': {:?}", self.name, condition.name(), result);
            if result == SchedulingStatus::NotReady {
                match condition.next_ready_at().filter(|at| *at > now) {
                    Some(at) => wake = Some(wake.map_or(at, |w| w.max(at))),
                    None => timed = false,
                }
            }
            status = status.and(result);
            if status == SchedulingStatus::Never {
                break;
            }
        }
        self.wake = if status == SchedulingStatus::NotReady && timed {
            wake
        } else {
            None
        };
        status
    }

    /// Instant the operator turns ready by itself, when it is NOT_READY
    /// only because of time-based conditions
    pub fn wake_at(&self) -> Option<Instant> {
        self.wake
    }
}

pub(crate) struct ExecutionPlan {
    pub fragment: String,
    pub slots: Vec<OperatorSlot>,
    pub order: Vec<usize>,
    pub queues: Vec<SharedQueue>,
}

impl ExecutionPlan {
    /// Wire queues and port conditions, resolve parameters, then initialize
    /// every condition and operator. Any failure keeps the run from starting.
    pub async fn build(parts: FragmentParts) -> Result<Self, TickError> {
        let FragmentParts {
            name: fragment,
            operators,
            graph,
            ..
        } = parts;

        let queues = create_queues(&operators, &graph);
        let order = graph.scheduling_order();
        let position: Vec<usize> = {
            let mut position = vec![0; order.len()];
            for (rank, &op) in order.iter().enumerate() {
                position[op] = rank;
            }
            position
        };

        let mut slots = Vec::with_capacity(operators.len());
        for (index, entry) in operators.into_iter().enumerate() {
            let deps = graph
                .previous_operators(index)
                .into_iter()
                .filter(|&producer| position[producer] < position[index])
                .collect();
            slots.push(build_slot(index, entry, &graph, &queues, deps).await?);
        }

        for slot in slots.iter_mut() {
            if let Some(backend) = slot.backend.as_mut() {
                backend.start().await.map_err(|source| InitializationError::Operator {
                    operator: slot.name.clone(),
                    source,
                })?;
            }
        }

        Ok(Self {
            fragment,
            slots,
            order,
            queues,
        })
    }

    pub fn all_stopped(&self) -> bool {
        self.slots.iter().all(OperatorSlot::is_stopped)
    }

    /// Release every entity still queued
    pub fn drain(&self) -> usize {
        self.queues.iter().map(|queue| queue.clear()).sum()
    }
}

fn create_queues(operators: &[OperatorEntry], graph: &OperatorGraph) -> Vec<SharedQueue> {
    graph
        .edges()
        .iter()
        .map(|edge| {
            let consumer = &operators[edge.consumer];
            let (capacity, policy) = consumer
                .schema
                .input_port(&edge.in_port)
                .map(|port| (port.capacity, port.policy))
                .unwrap_or((1, Default::default()));
            let label = format!(
                "{}.{}->{}.{}",
                operators[edge.producer].name, edge.out_port, consumer.name, edge.in_port
            );
            EdgeQueue::shared(label, edge.in_port.clone(), capacity, policy)
        })
        .collect()
}

fn port_conditions(
    name: &str,
    schema: &OperatorSchema,
    inputs: &IndexMap<String, Vec<SharedQueue>>,
    outputs: &IndexMap<String, Vec<SharedQueue>>,
) -> Vec<Box<dyn Condition>> {
    let mut conditions: Vec<Box<dyn Condition>> = Vec::new();

    for port in schema.inputs() {
        let queues = inputs.get(&port.name).cloned().unwrap_or_default();
        if queues.is_empty() {
            tracing::debug!("Input port '{}.{}' is not connected", name, port.name);
            continue;
        }
        match port.condition {
            ConditionType::None => {}
            ConditionType::MessageAvailable => {
                let mut condition = MessageAvailableCondition::new(port.min_size)
                    .named(format!("{}_message_available", port.name));
                if let Some(max) = port.front_stage_max_size {
                    condition = condition.with_front_stage_max_size(max);
                }
                condition.bind_queues(queues);
                conditions.push(Box::new(condition));
            }
            other => tracing::warn!(
                "Condition type '{}' is not supported on input port '{}.{}'",
                other,
                name,
                port.name
            ),
        }
    }

    for port in schema.outputs() {
        let queues = outputs.get(&port.name).cloned().unwrap_or_default();
        if queues.is_empty() {
            tracing::debug!("Output port '{}.{}' is not connected", name, port.name);
            continue;
        }
        match port.condition {
            ConditionType::None => {}
            ConditionType::DownstreamMessageAffordable => {
                let mut condition = DownstreamMessageAffordableCondition::new(port.min_size)
                    .named(format!("{}_downstream_affordable", port.name));
                condition.bind_queues(queues);
                conditions.push(Box::new(condition));
            }
            other => tracing::warn!(
                "Condition type '{}' is not supported on output port '{}.{}'",
                other,
                name,
                port.name
            ),
        }
    }

    conditions
}

async fn build_slot(
    index: usize,
    entry: OperatorEntry,
    graph: &OperatorGraph,
    queues: &[SharedQueue],
    deps: Vec<usize>,
) -> Result<OperatorSlot, TickError> {
    let OperatorEntry {
        name,
        mut backend,
        schema,
        conditions: mut user_conditions,
        resources,
        args,
    } = entry;

    let inputs: IndexMap<String, Vec<SharedQueue>> = schema
        .inputs()
        .map(|port| {
            let edges = graph
                .edges_into(index, &port.name)
                .map(|edge| queues[edge.id].clone())
                .collect();
            (port.name.clone(), edges)
        })
        .collect();
    let outputs: IndexMap<String, Vec<SharedQueue>> = schema
        .outputs()
        .map(|port| {
            let edges = graph
                .edges_from(index, &port.name)
                .map(|edge| queues[edge.id].clone())
                .collect();
            (port.name.clone(), edges)
        })
        .collect();

    let mut conditions = port_conditions(&name, &schema, &inputs, &outputs);
    conditions.append(&mut user_conditions);

    for condition in conditions.iter_mut() {
        condition
            .initialize()
            .map_err(|source| InitializationError::InvalidCondition {
                operator: name.clone(),
                condition: condition.name().to_string(),
                source,
            })?;
    }

    let params = schema.resolve(&name, &args)?;
    backend
        .initialize(&params)
        .await
        .map_err(|source| InitializationError::Operator {
            operator: name.clone(),
            source,
        })?;

    tracing::debug!(
        "Initialized operator '{}' with {} condition(s)",
        name,
        conditions.len()
    );

    Ok(OperatorSlot {
        type_name: backend.type_name().to_string(),
        name,
        backend: Some(backend),
        input: Some(InputContext::new(inputs)),
        output: Some(OutputContext::new(outputs)),
        conditions,
        resources: Arc::new(resources),
        state: OperatorState::Initialized,
        ticks: 0,
        deps,
        wake: None,
    })
}
