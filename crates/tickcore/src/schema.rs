//! Port and parameter declarations an operator makes in `setup`.

use crate::condition::ConditionType;
use crate::transport::QueuePolicy;
use crate::{ArgList, InitializationError, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// A declared input or output port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSchema {
    pub name: String,
    pub direction: PortDirection,
    pub condition: ConditionType,
    /// `min_size` of the default port condition
    pub min_size: usize,
    /// Upper bound for the message-available condition on input ports
    pub front_stage_max_size: Option<usize>,
    /// Capacity of each edge queue feeding this input port
    pub capacity: usize,
    pub policy: QueuePolicy,
}

impl PortSchema {
    fn new(name: String, direction: PortDirection) -> Self {
        let condition = match direction {
            PortDirection::Input => ConditionType::MessageAvailable,
            PortDirection::Output => ConditionType::DownstreamMessageAffordable,
        };
        Self {
            name,
            direction,
            condition,
            min_size: 1,
            front_stage_max_size: None,
            capacity: 1,
            policy: QueuePolicy::default(),
        }
    }

    /// Replace the port's default condition; `ConditionType::None` makes
    /// receiving on the port optional
    pub fn condition(&mut self, condition: ConditionType) -> &mut Self {
        self.condition = condition;
        self
    }

    pub fn min_size(&mut self, min_size: usize) -> &mut Self {
        self.min_size = min_size;
        self
    }

    pub fn front_stage_max_size(&mut self, max_size: usize) -> &mut Self {
        self.front_stage_max_size = Some(max_size);
        self
    }

    pub fn capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn policy(&mut self, policy: QueuePolicy) -> &mut Self {
        self.policy = policy;
        self
    }
}

/// A declared parameter; checked against the operator's arguments when the
/// operator initializes, not when arguments are attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    pub description: String,
    pub default: Option<Value>,
    pub required: bool,
}

impl ParameterSchema {
    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    pub fn default_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    pub fn optional(&mut self) -> &mut Self {
        self.required = false;
        self
    }
}

/// Everything `setup` declares: ports and parameters, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorSchema {
    inputs: IndexMap<String, PortSchema>,
    outputs: IndexMap<String, PortSchema>,
    params: IndexMap<String, ParameterSchema>,
}

impl OperatorSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&mut self, name: impl Into<String>) -> &mut PortSchema {
        let name = name.into();
        self.inputs
            .entry(name.clone())
            .or_insert_with(|| PortSchema::new(name, PortDirection::Input))
    }

    pub fn output(&mut self, name: impl Into<String>) -> &mut PortSchema {
        let name = name.into();
        self.outputs
            .entry(name.clone())
            .or_insert_with(|| PortSchema::new(name, PortDirection::Output))
    }

    /// Declare a required parameter
    pub fn param(&mut self, name: impl Into<String>) -> &mut ParameterSchema {
        let name = name.into();
        self.params.entry(name.clone()).or_insert_with(|| ParameterSchema {
            name,
            description: String::new(),
            default: None,
            required: true,
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = &PortSchema> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PortSchema> {
        self.outputs.values()
    }

    pub fn params(&self) -> impl Iterator<Item = &ParameterSchema> {
        self.params.values()
    }

    pub fn input_port(&self, name: &str) -> Option<&PortSchema> {
        self.inputs.get(name)
    }

    pub fn output_port(&self, name: &str) -> Option<&PortSchema> {
        self.outputs.get(name)
    }

    pub fn port(&self, name: &str, direction: PortDirection) -> Option<&PortSchema> {
        match direction {
            PortDirection::Input => self.input_port(name),
            PortDirection::Output => self.output_port(name),
        }
    }

    /// Resolve declared parameters against `args`.
    ///
    /// Arguments win over defaults; a required parameter with neither fails.
    /// Undeclared arguments are kept so operators can read them dynamically.
    pub fn resolve(&self, operator: &str, args: &ArgList) -> Result<Parameters, InitializationError> {
        let mut values = IndexMap::new();

        for param in self.params.values() {
            match args.get(&param.name).or(param.default.as_ref()) {
                Some(value) => {
                    values.insert(param.name.clone(), value.clone());
                }
                None if param.required => {
                    return Err(InitializationError::MissingParameter {
                        operator: operator.to_string(),
                        parameter: param.name.clone(),
                    });
                }
                None => {}
            }
        }

        for arg in args.args() {
            if !self.params.contains_key(&arg.name) {
                tracing::debug!("Operator '{}' got undeclared argument '{}'", operator, arg.name);
                values.insert(arg.name.clone(), arg.value.clone());
            }
        }

        Ok(Parameters {
            operator: operator.to_string(),
            values,
        })
    }
}

/// Resolved parameter values passed to `Operator::initialize`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    operator: String,
    values: IndexMap<String, Value>,
}

impl Parameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.values.get(name).cloned().unwrap_or(default)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn require(&self, name: &str) -> Result<&Value, InitializationError> {
        self.values
            .get(name)
            .ok_or_else(|| InitializationError::MissingParameter {
                operator: self.operator.clone(),
                parameter: name.to_string(),
            })
    }

    pub fn require_i64(&self, name: &str) -> Result<i64, InitializationError> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| self.invalid(name, "integer", value))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, InitializationError> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| self.invalid(name, "number", value))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, InitializationError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| self.invalid(name, "string", value))
    }

    fn invalid(&self, name: &str, expected: &str, actual: &Value) -> InitializationError {
        InitializationError::InvalidParameter {
            operator: self.operator.clone(),
            parameter: name.to_string(),
            reason: format!("expected {}, got {}", expected, actual.type_name()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
