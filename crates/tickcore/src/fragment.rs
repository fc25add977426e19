//! Composition API: fragments own operators and the edges between them,
//! applications own fragments.

use crate::condition::Condition;
use crate::graph::OperatorGraph;
use crate::operator::{OperatorBackend, OperatorDef};
use crate::resource::Resource;
use crate::schema::{OperatorSchema, PortDirection};
use crate::{ArgList, CompositionError, Config};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub type FragmentId = Uuid;

/// Fragment name that addresses every fragment of an application
pub const RESERVED_FRAGMENT_NAME: &str = "all";

/// Handle to an operator inside a specific fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId {
    pub fragment: FragmentId,
    pub index: usize,
}

/// An operator as stored by its fragment
#[derive(Debug)]
pub struct OperatorEntry {
    pub name: String,
    pub backend: OperatorBackend,
    pub schema: OperatorSchema,
    pub conditions: Vec<Box<dyn Condition>>,
    pub resources: IndexMap<String, Arc<dyn Resource>>,
    pub args: ArgList,
}

/// A fragment taken apart for execution
#[derive(Debug)]
pub struct FragmentParts {
    pub id: FragmentId,
    pub name: String,
    pub operators: Vec<OperatorEntry>,
    pub graph: OperatorGraph,
}

#[derive(Debug)]
pub struct Fragment {
    id: FragmentId,
    name: String,
    config: Config,
    operators: Vec<OperatorEntry>,
    graph: OperatorGraph,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config: Config::default(),
            operators: Vec::new(),
            graph: OperatorGraph::new(),
        }
    }

    pub fn id(&self) -> FragmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Arguments stored under `key` in the fragment's config
    pub fn from_config(&self, key: &str) -> ArgList {
        self.config.args(key)
    }

    /// Run the operator's `setup` and add it to the fragment
    pub fn add_operator(&mut self, def: OperatorDef) -> Result<OperatorId, CompositionError> {
        let OperatorDef {
            name,
            backend,
            conditions,
            resources,
            args,
        } = def;

        if self.operators.iter().any(|op| op.name == name) {
            return Err(CompositionError::DuplicateOperatorName(name));
        }

        let mut seen = HashSet::new();
        for condition in &conditions {
            if !seen.insert(condition.name().to_string()) {
                return Err(CompositionError::DuplicateCondition {
                    operator: name,
                    condition: condition.name().to_string(),
                });
            }
        }

        let mut resource_map = IndexMap::new();
        for resource in resources {
            let key = resource.name().to_string();
            if resource_map.contains_key(&key) {
                return Err(CompositionError::DuplicateResource {
                    operator: name,
                    resource: key,
                });
            }
            resource_map.insert(key, resource);
        }

        let mut schema = OperatorSchema::new();
        backend.setup(&mut schema);

        let index = self.graph.add_operator();
        tracing::debug!(
            "Added operator '{}' ({}) to fragment '{}' at index {}",
            name,
            backend.type_name(),
            self.name,
            index
        );

        self.operators.push(OperatorEntry {
            name,
            backend,
            schema,
            conditions,
            resources: resource_map,
            args,
        });

        Ok(OperatorId {
            fragment: self.id,
            index,
        })
    }

    fn entry(&self, id: OperatorId) -> Result<&OperatorEntry, CompositionError> {
        if id.fragment != self.id {
            return Err(CompositionError::OperatorNotFound(format!(
                "index {} of another fragment",
                id.index
            )));
        }
        self.operators
            .get(id.index)
            .ok_or_else(|| CompositionError::OperatorNotFound(format!("index {}", id.index)))
    }

    fn check_port(
        &self,
        entry: &OperatorEntry,
        port: &str,
        direction: PortDirection,
    ) -> Result<(), CompositionError> {
        if entry.schema.port(port, direction).is_some() {
            return Ok(());
        }

        let opposite = match direction {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        };
        if entry.schema.port(port, opposite).is_some() {
            let (from, to) = match direction {
                PortDirection::Output => (format!("{}.{}", entry.name, port), "an input".to_string()),
                PortDirection::Input => ("an output".to_string(), format!("{}.{}", entry.name, port)),
            };
            return Err(CompositionError::DirectionMismatch { from, to });
        }

        Err(CompositionError::PortNotFound {
            operator: entry.name.clone(),
            port: port.to_string(),
            direction: direction.to_string(),
        })
    }

    /// Add the edge `producer.out_port -> consumer.in_port`
    pub fn connect(
        &mut self,
        producer: OperatorId,
        out_port: &str,
        consumer: OperatorId,
        in_port: &str,
    ) -> Result<(), CompositionError> {
        if producer.fragment != consumer.fragment || producer.fragment != self.id {
            return Err(CompositionError::CrossFragment {
                producer: format!("{}#{}", producer.fragment, producer.index),
                consumer: format!("{}#{}", consumer.fragment, consumer.index),
            });
        }

        let from = self.entry(producer)?;
        let to = self.entry(consumer)?;
        self.check_port(from, out_port, PortDirection::Output)?;
        self.check_port(to, in_port, PortDirection::Input)?;

        if self
            .graph
            .contains_edge(producer.index, out_port, consumer.index, in_port)
        {
            return Err(CompositionError::DuplicateEdge {
                producer: from.name.clone(),
                out_port: out_port.to_string(),
                consumer: to.name.clone(),
                in_port: in_port.to_string(),
            });
        }

        tracing::debug!(
            "Connected {}.{} -> {}.{}",
            from.name,
            out_port,
            to.name,
            in_port
        );
        self.graph
            .add_edge(producer.index, out_port, consumer.index, in_port);
        Ok(())
    }

    /// Connect several port pairs between two operators. With no pairs the
    /// single output of `producer` is wired to the single input of `consumer`.
    pub fn add_flow(
        &mut self,
        producer: OperatorId,
        consumer: OperatorId,
        pairs: &[(&str, &str)],
    ) -> Result<(), CompositionError> {
        if !pairs.is_empty() {
            for (out_port, in_port) in pairs {
                self.connect(producer, out_port, consumer, in_port)?;
            }
            return Ok(());
        }

        let from = self.entry(producer)?;
        let to = self.entry(consumer)?;
        let outputs: Vec<String> = from.schema.outputs().map(|p| p.name.clone()).collect();
        let inputs: Vec<String> = to.schema.inputs().map(|p| p.name.clone()).collect();

        if outputs.len() != 1 || inputs.len() != 1 {
            return Err(CompositionError::AmbiguousPorts {
                producer: from.name.clone(),
                consumer: to.name.clone(),
                reason: format!(
                    "{} output(s) and {} input(s); name the port pairs",
                    outputs.len(),
                    inputs.len()
                ),
            });
        }

        self.connect(producer, &outputs[0], consumer, &inputs[0])
    }

    pub fn operator_by_name(&self, name: &str) -> Option<OperatorId> {
        self.operators
            .iter()
            .position(|op| op.name == name)
            .map(|index| OperatorId {
                fragment: self.id,
                index,
            })
    }

    pub fn operator_name(&self, id: OperatorId) -> Option<&str> {
        self.entry(id).ok().map(|op| op.name.as_str())
    }

    pub fn operator_schema(&self, id: OperatorId) -> Option<&OperatorSchema> {
        self.entry(id).ok().map(|op| &op.schema)
    }

    pub fn operator_names(&self) -> impl Iterator<Item = &str> {
        self.operators.iter().map(|op| op.name.as_str())
    }

    pub fn graph(&self) -> &OperatorGraph {
        &self.graph
    }

    fn ids(&self, indices: Vec<usize>) -> Vec<OperatorId> {
        indices
            .into_iter()
            .map(|index| OperatorId {
                fragment: self.id,
                index,
            })
            .collect()
    }

    pub fn root_operators(&self) -> Vec<OperatorId> {
        self.ids(self.graph.root_operators())
    }

    pub fn leaf_operators(&self) -> Vec<OperatorId> {
        self.ids(self.graph.leaf_operators())
    }

    pub fn next_operators(&self, id: OperatorId) -> Vec<OperatorId> {
        self.ids(self.graph.next_operators(id.index))
    }

    pub fn previous_operators(&self, id: OperatorId) -> Vec<OperatorId> {
        self.ids(self.graph.previous_operators(id.index))
    }

    /// Operators in stable scheduling order
    pub fn ordered_operators(&self) -> Vec<OperatorId> {
        self.ids(self.graph.scheduling_order())
    }

    pub fn into_parts(self) -> FragmentParts {
        FragmentParts {
            id: self.id,
            name: self.name,
            operators: self.operators,
            graph: self.graph,
        }
    }
}

/// Named set of fragments run together
#[derive(Debug)]
pub struct Application {
    pub name: String,
    pub description: String,
    pub version: String,
    fragments: Vec<Fragment>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: "0.0.0".to_string(),
            fragments: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<(), CompositionError> {
        if fragment.name() == RESERVED_FRAGMENT_NAME {
            return Err(CompositionError::ReservedFragmentName(fragment.name().to_string()));
        }
        if self.fragments.iter().any(|f| f.name() == fragment.name()) {
            return Err(CompositionError::DuplicateFragmentName(fragment.name().to_string()));
        }
        self.fragments.push(fragment);
        Ok(())
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.name() == name)
    }

    pub fn fragment_mut(&mut self, name: &str) -> Option<&mut Fragment> {
        self.fragments.iter_mut().find(|f| f.name() == name)
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<Fragment> {
        self.fragments
    }
}
