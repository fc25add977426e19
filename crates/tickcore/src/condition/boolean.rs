use super::{Condition, ConditionType, SchedulingStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Ticks while enabled. Clones share the flag, so an operator can keep a
/// handle and disable its own ticking; once disabled the operator is retired.
#[derive(Debug, Clone)]
pub struct BooleanCondition {
    name: String,
    enabled: Arc<AtomicBool>,
}

impl BooleanCondition {
    pub fn new(enable_tick: bool) -> Self {
        Self {
            name: "boolean".to_string(),
            enabled: Arc::new(AtomicBool::new(enable_tick)),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn enable_tick(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_tick(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn check_tick_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for BooleanCondition {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Condition for BooleanCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn condition_type(&self) -> ConditionType {
        ConditionType::Boolean
    }

    fn check(&mut self, _now: Instant) -> SchedulingStatus {
        if self.check_tick_enabled() {
            SchedulingStatus::Ready
        } else {
            SchedulingStatus::Never
        }
    }
}
