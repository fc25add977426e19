use std::collections::HashMap;
use std::sync::Arc;
use tickcore::{ArgList, CompositionError, Operator, OperatorDef, OperatorError, OperatorSchema};

/// Factory trait for creating operator instances
pub trait OperatorFactory: Send + Sync {
    /// Create a new operator; `args` are the arguments given in the graph
    /// definition, before parameter resolution
    fn create(&self, args: &ArgList) -> Result<Box<dyn Operator>, OperatorError>;

    /// Get operator type identifier
    fn operator_type(&self) -> &str;

    /// Optional: Get operator metadata (description, ports)
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::default()
    }
}

/// Metadata about an operator type
#[derive(Debug, Clone)]
pub struct OperatorMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for OperatorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

impl OperatorMetadata {
    /// Port list taken from what `operator.setup` declares
    pub fn from_operator(
        operator: &dyn Operator,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let mut schema = OperatorSchema::new();
        operator.setup(&mut schema);
        let describe = |port: &tickcore::PortSchema| PortDefinition {
            name: port.name.clone(),
            description: port.condition.to_string(),
            required: port.condition != tickcore::ConditionType::None,
        };
        Self {
            description: description.into(),
            category: category.into(),
            inputs: schema.inputs().map(describe).collect(),
            outputs: schema.outputs().map(describe).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Registry of available operator types
pub struct OperatorRegistry {
    factories: HashMap<String, Arc<dyn OperatorFactory>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an operator factory
    pub fn register(&mut self, factory: Arc<dyn OperatorFactory>) {
        let operator_type = factory.operator_type().to_string();
        tracing::info!("Registering operator type: {}", operator_type);
        self.factories.insert(operator_type, factory);
    }

    /// Create an operator instance from its type name
    pub fn create_operator(
        &self,
        operator_type: &str,
        args: &ArgList,
    ) -> Result<Box<dyn Operator>, CompositionError> {
        let factory = self
            .factories
            .get(operator_type)
            .ok_or_else(|| CompositionError::UnknownOperatorType(operator_type.to_string()))?;

        factory
            .create(args)
            .map_err(|e| CompositionError::OperatorCreation {
                operator_type: operator_type.to_string(),
                reason: e.to_string(),
            })
    }

    /// Operator definition named `name`, carrying `args`
    pub fn create_def(
        &self,
        name: impl Into<String>,
        operator_type: &str,
        args: &ArgList,
    ) -> Result<OperatorDef, CompositionError> {
        let operator = self.create_operator(operator_type, args)?;
        Ok(OperatorDef::from_boxed(name, operator).with_args(args))
    }

    pub fn contains(&self, operator_type: &str) -> bool {
        self.factories.contains_key(operator_type)
    }

    /// Get all registered operator types, sorted
    pub fn list_operator_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for an operator type
    pub fn get_metadata(&self, operator_type: &str) -> Option<OperatorMetadata> {
        self.factories.get(operator_type).map(|f| f.metadata())
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
