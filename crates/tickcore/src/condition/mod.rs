//! Scheduling conditions.
//!
//! A condition is checked before every potential tick of its operator and
//! answers READY, NOT_READY or NEVER. An operator ticks only when all of its
//! conditions are READY; a single NEVER retires it for the rest of the run.

mod boolean;
mod count;
mod message;
mod periodic;

pub use boolean::BooleanCondition;
pub use count::CountCondition;
pub use message::{DownstreamMessageAffordableCondition, MessageAvailableCondition};
pub use periodic::{PeriodicCondition, RecessPeriod};

use crate::transport::SharedQueue;
use crate::ConditionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Result of a single condition check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingStatus {
    Ready,
    NotReady,
    Never,
}

impl SchedulingStatus {
    /// AND of two statuses: NEVER dominates, then NOT_READY
    pub fn and(self, other: SchedulingStatus) -> SchedulingStatus {
        match (self, other) {
            (SchedulingStatus::Never, _) | (_, SchedulingStatus::Never) => SchedulingStatus::Never,
            (SchedulingStatus::NotReady, _) | (_, SchedulingStatus::NotReady) => {
                SchedulingStatus::NotReady
            }
            _ => SchedulingStatus::Ready,
        }
    }
}

/// Condition kinds a port can declare, plus the operator-level kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    None,
    MessageAvailable,
    DownstreamMessageAffordable,
    Count,
    Boolean,
    Periodic,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionType::None => "none",
            ConditionType::MessageAvailable => "message_available",
            ConditionType::DownstreamMessageAffordable => "downstream_message_affordable",
            ConditionType::Count => "count",
            ConditionType::Boolean => "boolean",
            ConditionType::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

pub trait Condition: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn condition_type(&self) -> ConditionType;

    /// Validate configuration before the run starts
    fn initialize(&mut self) -> Result<(), ConditionError> {
        Ok(())
    }

    /// Hand port-bound conditions the edge queues of their port, in edge
    /// declaration order
    fn bind_queues(&mut self, _queues: Vec<SharedQueue>) {}

    fn check(&mut self, now: Instant) -> SchedulingStatus;

    /// Called once after each tick of the owning operator
    fn on_execute(&mut self, _now: Instant) {}

    /// Earliest instant a NOT_READY time-based condition turns READY. The
    /// instant may already have passed once the condition is READY again.
    fn next_ready_at(&self) -> Option<Instant> {
        None
    }
}
