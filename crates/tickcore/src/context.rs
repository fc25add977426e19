use crate::events::{EventEmitter, ExecutionId};
use crate::resource::Resource;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub type ResourceMap = Arc<IndexMap<String, Arc<dyn Resource>>>;

/// Per-tick context handed to a compute step next to its port handles
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,

    /// Name of the ticking operator
    pub operator: String,

    /// 1-based tick number of this operator
    pub tick: u64,

    /// Instant the scheduler found the operator ready; time-based
    /// conditions measure from here
    pub scheduled_at: Instant,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    resources: ResourceMap,
    stop: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        execution_id: ExecutionId,
        operator: impl Into<String>,
        tick: u64,
        scheduled_at: Instant,
        resources: ResourceMap,
        events: EventEmitter,
        stop: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            operator: operator.into(),
            tick,
            scheduled_at,
            events,
            resources,
            stop,
        }
    }

    /// Resource attached to the operator under `name`, if it has type `T`
    pub fn resource<T: Resource + 'static>(&self, name: &str) -> Option<&T> {
        self.resources
            .get(name)
            .and_then(|resource| resource.as_any().downcast_ref::<T>())
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Ask the executor to stop the whole run after the current round
    pub fn stop_execution(&self) {
        tracing::info!("Operator '{}' requested stop", self.operator);
        self.stop.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }
}
