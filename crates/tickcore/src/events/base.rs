use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: ExecutionId,
        fragment: String,
        operators: usize,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        execution_id: ExecutionId,
        fragment: String,
        stop_reason: String,
        total_ticks: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    OperatorTicked {
        execution_id: ExecutionId,
        operator: String,
        tick: u64,
        duration_us: u64,
        timestamp: DateTime<Utc>,
    },
    OperatorStopped {
        execution_id: ExecutionId,
        operator: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    OperatorFailed {
        execution_id: ExecutionId,
        operator: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    OperatorEvent {
        execution_id: ExecutionId,
        operator: String,
        event: OperatorEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events an operator sends from inside its compute step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum OperatorEvent {
    Info { message: String },
    Data { port: String, value: Value },
}

/// Per-operator handle on the run's event bus
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    operator: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        operator: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            operator: operator.into(),
            sender,
        }
    }

    pub fn emit(&self, event: OperatorEvent) {
        let _ = self.sender.send(ExecutionEvent::OperatorEvent {
            execution_id: self.execution_id,
            operator: self.operator.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(OperatorEvent::Info {
            message: message.into(),
        });
    }

    /// Mirror a value seen on a port to subscribers
    pub fn data(&self, port: impl Into<String>, value: Value) {
        self.emit(OperatorEvent::Data {
            port: port.into(),
            value,
        });
    }
}

/// Broadcast channel shared by every run of a runtime; slow subscribers
/// lose the oldest events
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, operator: impl Into<String>) -> EventEmitter {
        EventEmitter::new(execution_id, operator, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
