use crate::executor::{ExecutionHandle, ExecutionResult, ExecutorConfig, GraphExecutor};
use crate::loader::GraphDefinition;
use crate::registry::OperatorRegistry;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tickcore::{Application, EventBus, ExecutionEvent, Fragment, TickError};
use tokio::task::JoinHandle;

/// Main entry point for running fragments and applications
pub struct TickRuntime {
    registry: Arc<OperatorRegistry>,
    executor: Arc<GraphExecutor>,
    event_bus: Arc<EventBus>,
}

impl TickRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(OperatorRegistry::new(), config)
    }

    /// Create a new runtime with a pre-populated registry
    pub fn with_registry(registry: OperatorRegistry, config: RuntimeConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            executor: Arc::new(GraphExecutor::new(config.executor)),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
        }
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Run one fragment to completion
    pub async fn run(&self, fragment: Fragment) -> Result<ExecutionResult, TickError> {
        self.executor.execute(fragment, &self.event_bus).await
    }

    /// Start a fragment in the background; the handle can stop it
    pub fn spawn(&self, fragment: Fragment) -> RunningExecution {
        let handle = ExecutionHandle::new();
        let executor = self.executor.clone();
        let event_bus = self.event_bus.clone();
        let task_handle = handle.clone();
        let join = tokio::spawn(async move {
            executor
                .execute_with(fragment, &event_bus, task_handle)
                .await
        });
        RunningExecution { handle, join }
    }

    /// Run every fragment of an application concurrently; one result per
    /// fragment in declaration order
    pub async fn run_application(
        &self,
        application: Application,
    ) -> Result<Vec<ExecutionResult>, TickError> {
        tracing::info!(
            "Running application '{}' {} ({} fragments)",
            application.name,
            application.version,
            application.fragments().len()
        );

        let running: Vec<RunningExecution> = application
            .into_fragments()
            .into_iter()
            .map(|fragment| self.spawn(fragment))
            .collect();

        join_all(running.into_iter().map(RunningExecution::wait))
            .await
            .into_iter()
            .collect()
    }

    /// Build a fragment from a YAML graph definition file and run it
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<ExecutionResult, TickError> {
        let definition = GraphDefinition::from_file(path)?;
        let fragment = definition.build(&self.registry)?;
        self.run(fragment).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for TickRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// A fragment running on its own task
pub struct RunningExecution {
    pub handle: ExecutionHandle,
    join: JoinHandle<Result<ExecutionResult, TickError>>,
}

impl RunningExecution {
    pub fn request_stop(&self) {
        self.handle.request_stop();
    }

    pub async fn wait(self) -> Result<ExecutionResult, TickError> {
        self.join
            .await
            .map_err(|e| TickError::Execution(format!("Task join error: {}", e)))?
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub executor: ExecutorConfig,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            event_buffer_size: 1000,
        }
    }
}
