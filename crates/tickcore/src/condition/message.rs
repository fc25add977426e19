use super::{Condition, ConditionType, SchedulingStatus};
use crate::transport::SharedQueue;
use tokio::time::Instant;

/// Ready when every edge queue of an input port holds at least `min_size`
/// entities
#[derive(Debug, Clone)]
pub struct MessageAvailableCondition {
    name: String,
    min_size: usize,
    front_stage_max_size: Option<usize>,
    queues: Vec<SharedQueue>,
}

impl MessageAvailableCondition {
    pub fn new(min_size: usize) -> Self {
        Self {
            name: "message_available".to_string(),
            min_size,
            front_stage_max_size: None,
            queues: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Also require that no queue holds more than `max_size` entities
    pub fn with_front_stage_max_size(mut self, max_size: usize) -> Self {
        self.front_stage_max_size = Some(max_size);
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn front_stage_max_size(&self) -> Option<usize> {
        self.front_stage_max_size
    }
}

impl Default for MessageAvailableCondition {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Condition for MessageAvailableCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn condition_type(&self) -> ConditionType {
        ConditionType::MessageAvailable
    }

    fn bind_queues(&mut self, queues: Vec<SharedQueue>) {
        self.queues = queues;
    }

    fn check(&mut self, _now: Instant) -> SchedulingStatus {
        if self.queues.is_empty() {
            return SchedulingStatus::NotReady;
        }
        let ready = self.queues.iter().all(|queue| {
            let len = queue.len();
            len >= self.min_size && self.front_stage_max_size.map_or(true, |max| len <= max)
        });
        if ready {
            SchedulingStatus::Ready
        } else {
            SchedulingStatus::NotReady
        }
    }
}

/// Ready when every downstream queue fed by an output port has room for at
/// least `min_size` more entities
#[derive(Debug, Clone)]
pub struct DownstreamMessageAffordableCondition {
    name: String,
    min_size: usize,
    queues: Vec<SharedQueue>,
}

impl DownstreamMessageAffordableCondition {
    pub fn new(min_size: usize) -> Self {
        Self {
            name: "downstream_affordable".to_string(),
            min_size,
            queues: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }
}

impl Default for DownstreamMessageAffordableCondition {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Condition for DownstreamMessageAffordableCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn condition_type(&self) -> ConditionType {
        ConditionType::DownstreamMessageAffordable
    }

    fn bind_queues(&mut self, queues: Vec<SharedQueue>) {
        self.queues = queues;
    }

    fn check(&mut self, _now: Instant) -> SchedulingStatus {
        if self.queues.iter().all(|queue| queue.free() >= self.min_size) {
            SchedulingStatus::Ready
        } else {
            SchedulingStatus::NotReady
        }
    }
}
