//! Declarative graph definitions.
//!
//! ```yaml
//! name: ping
//! config:
//!   tx:
//!     start: 1
//! operators:
//!   - name: tx
//!     type: ping.tx
//!     args_from: tx
//!     conditions:
//!       - kind: count
//!         count: 5
//!   - name: rx
//!     type: ping.rx
//! flows:
//!   - from: tx
//!     to: rx
//!     ports: [[out, in]]
//! ```

use crate::registry::OperatorRegistry;
use serde::Deserialize;
use std::path::Path;
use tickcore::{
    ArgList, BooleanCondition, Condition, CompositionError, Config, CountCondition, Fragment,
    PeriodicCondition, RecessPeriod, TickError, Value,
};

#[derive(Debug, Clone, Deserialize)]
pub struct GraphDefinition {
    pub name: String,
    /// Inline config section, read through `args_from`
    #[serde(default)]
    pub config: Option<serde_yaml::Value>,
    pub operators: Vec<OperatorDefinition>,
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub operator_type: String,
    /// Config key whose entries become arguments
    #[serde(default)]
    pub args_from: Option<String>,
    #[serde(default)]
    pub args: serde_yaml::Mapping,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionDefinition {
    Count {
        #[serde(default)]
        name: Option<String>,
        count: i64,
    },
    Boolean {
        #[serde(default)]
        name: Option<String>,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    Periodic {
        #[serde(default)]
        name: Option<String>,
        recess_period: serde_yaml::Value,
    },
}

fn default_enabled() -> bool {
    true
}

impl ConditionDefinition {
    pub fn build(&self) -> Box<dyn Condition> {
        match self {
            ConditionDefinition::Count { name, count } => {
                let condition = CountCondition::new(*count);
                Box::new(match name {
                    Some(name) => condition.named(name.clone()),
                    None => condition,
                })
            }
            ConditionDefinition::Boolean { name, enabled } => {
                let condition = BooleanCondition::new(*enabled);
                Box::new(match name {
                    Some(name) => condition.named(name.clone()),
                    None => condition,
                })
            }
            ConditionDefinition::Periodic {
                name,
                recess_period,
            } => {
                let period = RecessPeriod::from(&Value::from(recess_period.clone()));
                let condition = PeriodicCondition::new(period);
                Box::new(match name {
                    Some(name) => condition.named(name.clone()),
                    None => condition,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowDefinition {
    pub from: String,
    pub to: String,
    /// `[output, input]` pairs; empty means the single output feeds the
    /// single input
    #[serde(default)]
    pub ports: Vec<(String, String)>,
}

impl GraphDefinition {
    pub fn from_yaml_str(text: &str) -> Result<Self, TickError> {
        serde_yaml::from_str(text).map_err(|e| TickError::Config(format!("Invalid graph definition: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TickError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("Loading graph definition from {}", path.display());
        Self::from_yaml_str(&text)
    }

    /// Instantiate every operator through `registry` and wire the flows
    pub fn build(&self, registry: &OperatorRegistry) -> Result<Fragment, TickError> {
        let mut fragment = Fragment::new(self.name.clone());
        if let Some(config) = &self.config {
            fragment.set_config(Config::from_yaml_value(config.clone()));
        }

        for op in &self.operators {
            let mut args = match &op.args_from {
                Some(key) => fragment.from_config(key),
                None => ArgList::new(),
            };
            for (key, value) in &op.args {
                let key = key
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| TickError::Config(format!("Non-string argument key on '{}'", op.name)))?;
                args.add(tickcore::Arg::new(key, Value::from(value.clone())));
            }

            let mut def = registry.create_def(op.name.clone(), &op.operator_type, &args)?;
            for condition in &op.conditions {
                def = def.with_boxed_condition(condition.build());
            }
            fragment.add_operator(def)?;
        }

        for flow in &self.flows {
            let producer = fragment
                .operator_by_name(&flow.from)
                .ok_or_else(|| CompositionError::OperatorNotFound(flow.from.clone()))?;
            let consumer = fragment
                .operator_by_name(&flow.to)
                .ok_or_else(|| CompositionError::OperatorNotFound(flow.to.clone()))?;
            let pairs: Vec<(&str, &str)> = flow
                .ports
                .iter()
                .map(|(out_port, in_port)| (out_port.as_str(), in_port.as_str()))
                .collect();
            fragment.add_flow(producer, consumer, &pairs)?;
        }

        tracing::info!(
            "Built fragment '{}' with {} operators and {} edges",
            fragment.name(),
            fragment.len(),
            fragment.graph().edges().len()
        );
        Ok(fragment)
    }
}
