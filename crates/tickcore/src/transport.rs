//! Edge queues and the receive/emit handles given to compute steps.
//!
//! Every edge owns one bounded FIFO queue. Emitting on an output port pushes
//! one reference of the entity into each of the port's edge queues while all
//! of them are locked, so a fan-out delivery is never half done.

use crate::{Entity, TransportError, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What a full queue does with a new entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Drop the oldest queued entity to make room
    Pop,
    /// Drop the new entity and log a warning
    Reject,
    /// Fail the emit call
    #[default]
    Fault,
}

pub type SharedQueue = Arc<EdgeQueue>;

pub struct EdgeQueue {
    label: String,
    port: String,
    capacity: usize,
    policy: QueuePolicy,
    items: Mutex<VecDeque<Entity>>,
}

impl EdgeQueue {
    pub fn new(label: impl Into<String>, port: impl Into<String>, capacity: usize, policy: QueuePolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            label: label.into(),
            port: port.into(),
            capacity,
            policy,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn shared(label: impl Into<String>, port: impl Into<String>, capacity: usize, policy: QueuePolicy) -> SharedQueue {
        Arc::new(Self::new(label, port, capacity, policy))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entity>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Free slots left
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    pub fn pop(&self) -> Option<Entity> {
        self.lock().pop_front()
    }

    /// Push outside of a fan-out (used for injecting messages)
    pub fn push(&self, entity: Entity) -> Result<(), TransportError> {
        let mut items = self.lock();
        self.push_locked(&mut items, entity)
    }

    fn push_locked(&self, items: &mut VecDeque<Entity>, entity: Entity) -> Result<(), TransportError> {
        if items.len() < self.capacity {
            items.push_back(entity);
            return Ok(());
        }
        match self.policy {
            QueuePolicy::Pop => {
                items.pop_front();
                items.push_back(entity);
                tracing::debug!("Queue {} full, dropped oldest entity", self.label);
                Ok(())
            }
            QueuePolicy::Reject => {
                tracing::warn!("Queue {} full, rejected entity {}", self.label, entity.id());
                Ok(())
            }
            QueuePolicy::Fault => Err(TransportError::QueueFull {
                port: self.port.clone(),
                capacity: self.capacity,
            }),
        }
    }

    /// Drop every queued entity, returning how many were released
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let drained = items.len();
        items.clear();
        drained
    }
}

impl fmt::Debug for EdgeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeQueue")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .finish()
    }
}

/// Push one reference of `entity` into every queue, or into none.
///
/// All queues are locked in edge order before any push; with the `Fault`
/// policy a full queue aborts the whole delivery.
pub fn deliver(queues: &[SharedQueue], entity: Entity) -> Result<usize, TransportError> {
    let mut guards: Vec<_> = queues.iter().map(|queue| queue.lock()).collect();

    for (queue, items) in queues.iter().zip(guards.iter()) {
        if queue.policy == QueuePolicy::Fault && items.len() >= queue.capacity {
            return Err(TransportError::QueueFull {
                port: queue.port.clone(),
                capacity: queue.capacity,
            });
        }
    }

    for (queue, items) in queues.iter().zip(guards.iter_mut()) {
        queue.push_locked(items, entity.clone())?;
    }
    Ok(queues.len())
}

/// Receive side of an operator's ports, handed to each compute step
pub struct InputContext {
    ports: IndexMap<String, Vec<SharedQueue>>,
}

impl InputContext {
    /// `ports` maps every declared input port to its edge queues in edge
    /// declaration order (empty for unconnected ports)
    pub fn new(ports: IndexMap<String, Vec<SharedQueue>>) -> Self {
        Self { ports }
    }

    fn queues(&self, port: &str) -> Result<&[SharedQueue], TransportError> {
        self.ports
            .get(port)
            .map(Vec::as_slice)
            .ok_or_else(|| TransportError::PortNotFound {
                port: port.to_string(),
                direction: "input".to_string(),
            })
    }

    /// Oldest entity of a singly connected port, or `None` when its queue is
    /// empty. Never blocks.
    pub fn receive(&mut self, port: &str) -> Result<Option<Entity>, TransportError> {
        match self.queues(port)? {
            [] => Err(TransportError::NotConnected(port.to_string())),
            [queue] => Ok(queue.pop()),
            queues => Err(TransportError::FanInArity {
                port: port.to_string(),
                edges: queues.len(),
            }),
        }
    }

    /// One entity (or `None`) per edge of the port, in edge declaration order
    pub fn receive_many(&mut self, port: &str) -> Result<Vec<Option<Entity>>, TransportError> {
        let queues = self.queues(port)?;
        if queues.is_empty() {
            return Err(TransportError::NotConnected(port.to_string()));
        }
        Ok(queues.iter().map(|queue| queue.pop()).collect())
    }

    /// Unnamed value of the next entity on a singly connected port
    pub fn receive_value(&mut self, port: &str) -> Result<Option<Value>, TransportError> {
        Ok(self
            .receive(port)?
            .and_then(|entity| entity.as_value().cloned()))
    }

    /// Number of edges feeding `port`
    pub fn arity(&self, port: &str) -> Result<usize, TransportError> {
        Ok(self.queues(port)?.len())
    }

    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    /// Drop everything queued on every port
    pub fn drain(&self) -> usize {
        self.ports.values().flatten().map(|queue| queue.clear()).sum()
    }
}

/// Emit side of an operator's ports, handed to each compute step
pub struct OutputContext {
    ports: IndexMap<String, Vec<SharedQueue>>,
    emitted: usize,
}

impl OutputContext {
    pub fn new(ports: IndexMap<String, Vec<SharedQueue>>) -> Self {
        Self { ports, emitted: 0 }
    }

    /// Deliver `entity` to every edge fed by `port`
    pub fn emit(&mut self, entity: Entity, port: &str) -> Result<(), TransportError> {
        let queues = self.ports.get(port).ok_or_else(|| TransportError::PortNotFound {
            port: port.to_string(),
            direction: "output".to_string(),
        })?;

        if queues.is_empty() {
            tracing::trace!("Port '{}' has no connection, dropping entity {}", port, entity.id());
            return Ok(());
        }

        deliver(queues, entity)?;
        self.emitted += 1;
        Ok(())
    }

    /// Wrap a primitive value in a fresh entity and emit it
    pub fn emit_value(&mut self, value: impl Into<Value>, port: &str) -> Result<(), TransportError> {
        self.emit(Entity::from_value(value), port)
    }

    /// Emit calls that reached at least one queue since the context was built
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }
}
