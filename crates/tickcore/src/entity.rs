use crate::{Tensor, TransportError, Value};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// One named component of an entity
#[derive(Clone)]
pub enum Payload {
    Tensor(Tensor),
    Value(Value),
    Object(Arc<dyn Any + Send + Sync>),
}

impl Payload {
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Payload::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Payload::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Tensor(t) => f.debug_tuple("Tensor").field(t).finish(),
            Payload::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Payload::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<Tensor> for Payload {
    fn from(t: Tensor) -> Self {
        Payload::Tensor(t)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Value(v)
    }
}

struct EntityData {
    id: u64,
    components: IndexMap<String, Payload>,
}

/// Reference-counted message unit moved along edges.
///
/// Cloning an entity adds a reference to the same components; queues,
/// transport and receivers each hold one. Components can only be added while
/// the entity is unshared, i.e. before it is emitted.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityData>,
}

impl Entity {
    pub fn new() -> Self {
        Self::with_components(IndexMap::new())
    }

    /// Single unnamed value component
    pub fn from_value(value: impl Into<Value>) -> Self {
        let mut components = IndexMap::new();
        components.insert(String::new(), Payload::Value(value.into()));
        Self::with_components(components)
    }

    fn with_components(components: IndexMap<String, Payload>) -> Self {
        Self {
            inner: Arc::new(EntityData {
                id: NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed),
                components,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Add or replace a component
    pub fn add(&mut self, name: impl Into<String>, payload: impl Into<Payload>) -> Result<(), TransportError> {
        let data = Arc::get_mut(&mut self.inner).ok_or(TransportError::EntityShared)?;
        data.components.insert(name.into(), payload.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.inner.components.get(name)
    }

    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.get(name).and_then(Payload::as_tensor)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Payload::as_value)
    }

    /// The unnamed value of an entity built with [`Entity::from_value`]
    pub fn as_value(&self) -> Option<&Value> {
        self.value("")
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.components.keys().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.inner.components.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.inner.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.components.is_empty()
    }

    /// Live references to this entity, including the caller's
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.inner.id)
            .field("components", &self.inner.components)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
