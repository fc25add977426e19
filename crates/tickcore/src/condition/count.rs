use super::{Condition, ConditionType, SchedulingStatus};
use tokio::time::Instant;

/// Allows a fixed number of ticks. A negative count never runs out.
#[derive(Debug, Clone)]
pub struct CountCondition {
    name: String,
    remaining: i64,
}

impl CountCondition {
    pub fn new(count: i64) -> Self {
        Self {
            name: "count".to_string(),
            remaining: count,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Ticks still allowed
    pub fn count(&self) -> i64 {
        self.remaining
    }

    pub fn set_count(&mut self, count: i64) {
        self.remaining = count;
    }
}

impl Default for CountCondition {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Condition for CountCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn condition_type(&self) -> ConditionType {
        ConditionType::Count
    }

    fn check(&mut self, _now: Instant) -> SchedulingStatus {
        if self.remaining == 0 {
            SchedulingStatus::Never
        } else {
            SchedulingStatus::Ready
        }
    }

    fn on_execute(&mut self, _now: Instant) {
        if self.remaining > 0 {
            self.remaining -= 1;
        }
    }
}
