use crate::plan::{ExecutionPlan, OperatorSlot};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tickcore::{
    EventBus, ExecutionContext, ExecutionEvent, ExecutionId, Fragment, InputContext, OperatorBackend,
    OperatorError, OperatorState, OutputContext, OwnershipError, OwnershipLedger, SchedulingStatus, TickError,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on compute steps running at once
    pub max_parallel: usize,
    /// End the run when nothing can tick and no timed condition is pending
    pub stop_on_deadlock: bool,
    /// Wait between retries of an idle graph when `stop_on_deadlock` is off
    #[serde(with = "duration_ms")]
    pub check_recession_period: Duration,
    /// Hard limit on the run's wall-clock time
    #[serde(default, with = "opt_duration_ms")]
    pub max_duration: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            stop_on_deadlock: true,
            check_recession_period: Duration::from_millis(5),
            max_duration: None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every operator reached STOPPED
    AllStopped,
    /// Operators remain but none can ever become ready
    Deadlock,
    StopRequested,
    MaxDuration,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::AllStopped => "all_stopped",
            StopReason::Deadlock => "deadlock",
            StopReason::StopRequested => "stop_requested",
            StopReason::MaxDuration => "max_duration",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorFailure {
    pub operator: String,
    pub tick: u64,
    pub error: String,
}

/// Result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub fragment: String,
    /// Completed compute steps per operator, in creation order
    pub ticks: IndexMap<String, u64>,
    pub states: IndexMap<String, OperatorState>,
    pub failures: Vec<OperatorFailure>,
    pub stop_reason: StopReason,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn ticks_of(&self, operator: &str) -> u64 {
        self.ticks.get(operator).copied().unwrap_or(0)
    }

    pub fn total_ticks(&self) -> u64 {
        self.ticks.values().sum()
    }
}

/// Handle for stopping a run from outside
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    token: CancellationToken,
}

impl ExecutionHandle {
    pub fn new() -> Self {
        Self {
            execution_id: ExecutionId::new_v4(),
            token: CancellationToken::new(),
        }
    }

    /// Every operator reports NEVER at its next evaluation; queued entities
    /// are released without further computes
    pub fn request_stop(&self) {
        tracing::info!("Stop requested for execution {}", self.execution_id);
        self.token.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for ExecutionHandle {
    fn default() -> Self {
        Self::new()
    }
}

struct TickOutcome {
    op: usize,
    backend: OperatorBackend,
    input: InputContext,
    output: OutputContext,
    dispatched_at: Instant,
    elapsed: Duration,
    result: Result<(), OperatorError>,
}

type TickTask = JoinHandle<TickOutcome>;

/// Drives a fragment round by round, ticking operators whose conditions are
/// all READY
pub struct GraphExecutor {
    config: ExecutorConfig,
}

impl GraphExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub async fn execute(&self, fragment: Fragment, event_bus: &EventBus) -> Result<ExecutionResult, TickError> {
        self.execute_with(fragment, event_bus, ExecutionHandle::new()).await
    }

    /// Run `fragment` until it stops; `handle` can stop it from elsewhere
    pub async fn execute_with(
        &self,
        fragment: Fragment,
        event_bus: &EventBus,
        handle: ExecutionHandle,
    ) -> Result<ExecutionResult, TickError> {
        let execution_id = handle.execution_id;
        let started = Instant::now();
        let ledger = Arc::new(OwnershipLedger::new());
        let mut plan = ledger
            .clone()
            .scope(ExecutionPlan::build(fragment.into_parts()))
            .await?;

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            fragment: plan.fragment.clone(),
            operators: plan.slots.len(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Starting execution {} of fragment '{}' ({} operators)",
            execution_id,
            plan.fragment,
            plan.slots.len()
        );

        let mut run = Run {
            config: &self.config,
            event_bus,
            execution_id,
            token: handle.token.clone(),
            ledger,
            failures: Vec::new(),
        };

        let deadline = self.config.max_duration.map(|limit| started + limit);
        let outcome = run.drive(&mut plan, deadline).await;
        let stop_reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                tracing::error!("Execution {} aborted: {}", execution_id, e);
                plan.drain();
                return Err(e);
            }
        };

        if let Err(e) = run.finish(&mut plan, stop_reason).await {
            tracing::error!("Execution {} aborted while shutting down: {}", execution_id, e);
            return Err(e);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = ExecutionResult {
            execution_id,
            fragment: plan.fragment.clone(),
            ticks: plan.slots.iter().map(|s| (s.name.clone(), s.ticks)).collect(),
            states: plan.slots.iter().map(|s| (s.name.clone(), s.state)).collect(),
            failures: run.failures,
            stop_reason,
            duration_ms,
        };

        event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            fragment: result.fragment.clone(),
            stop_reason: stop_reason.to_string(),
            total_ticks: result.total_ticks(),
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Execution {} finished ({}) after {} ticks in {}ms",
            execution_id,
            stop_reason,
            result.total_ticks(),
            duration_ms
        );

        Ok(result)
    }
}

/// State of one run that outlives individual rounds
struct Run<'a> {
    config: &'a ExecutorConfig,
    event_bus: &'a EventBus,
    execution_id: ExecutionId,
    token: CancellationToken,
    ledger: Arc<OwnershipLedger>,
    failures: Vec<OperatorFailure>,
}

struct RoundOutcome {
    ticks: usize,
    next_wake: Option<Instant>,
}

impl Run<'_> {
    async fn drive(&mut self, plan: &mut ExecutionPlan, deadline: Option<Instant>) -> Result<StopReason, TickError> {
        loop {
            if self.token.is_cancelled() {
                return Ok(StopReason::StopRequested);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::info!("Execution {} reached its maximum duration", self.execution_id);
                return Ok(StopReason::MaxDuration);
            }
            if plan.all_stopped() {
                return Ok(StopReason::AllStopped);
            }

            let round = self.round(plan).await?;
            tokio::task::yield_now().await;

            if round.ticks > 0 || plan.all_stopped() || self.token.is_cancelled() {
                continue;
            }

            let wake = match (round.next_wake, self.config.stop_on_deadlock) {
                (Some(at), _) => at,
                (None, true) => {
                    tracing::info!(
                        "No operator of fragment '{}' can make progress",
                        plan.fragment
                    );
                    return Ok(StopReason::Deadlock);
                }
                (None, false) => Instant::now() + self.config.check_recession_period,
            };
            let wake = deadline.map_or(wake, |d| wake.min(d));

            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                _ = self.token.cancelled() => {}
            }
        }
    }

    /// One pass over the scheduling order. An operator is evaluated once all
    /// of its preceding producers are done for this round.
    async fn round(&mut self, plan: &mut ExecutionPlan) -> Result<RoundOutcome, TickError> {
        let count = plan.slots.len();
        let mut done: Vec<bool> = plan.slots.iter().map(OperatorSlot::is_stopped).collect();
        let mut started = done.clone();
        let mut running: FuturesUnordered<TickTask> = FuturesUnordered::new();
        let mut outcome = RoundOutcome {
            ticks: 0,
            next_wake: None,
        };

        loop {
            let mut progressed = false;

            for position in 0..count {
                let op = plan.order[position];
                if started[op] || !plan.slots[op].deps.iter().all(|&dep| done[dep]) {
                    continue;
                }
                if running.len() >= self.config.max_parallel.max(1) {
                    break;
                }

                started[op] = true;
                progressed = true;
                let now = Instant::now();
                let slot = &mut plan.slots[op];
                let status = if self.token.is_cancelled() {
                    SchedulingStatus::Never
                } else {
                    slot.evaluate(now)
                };

                match status {
                    SchedulingStatus::Never => {
                        let reason = if self.token.is_cancelled() {
                            "stop requested"
                        } else {
                            "condition reported NEVER"
                        };
                        self.stop_operator(slot, reason);
                        done[op] = true;
                    }
                    SchedulingStatus::NotReady => {
                        if let Some(at) = slot.wake_at() {
                            outcome.next_wake = Some(outcome.next_wake.map_or(at, |w| w.min(at)));
                        }
                        done[op] = true;
                    }
                    SchedulingStatus::Ready => match self.dispatch(op, slot, now) {
                        Some(task) => running.push(task),
                        None => done[op] = true,
                    },
                }
            }

            if progressed {
                continue;
            }

            let Some(joined) = running.next().await else {
                break;
            };

            let tick = match joined {
                Ok(tick) => tick,
                Err(e) => {
                    abort_all(&running);
                    return Err(TickError::Execution(format!("Task join error: {}", e)));
                }
            };

            let op = tick.op;
            self.complete(&mut plan.slots[op], tick);
            done[op] = true;
            outcome.ticks += 1;

            if let Err(e) = self.check_ownership() {
                abort_all(&running);
                return Err(e);
            }
        }

        Ok(outcome)
    }

    fn dispatch(&mut self, op: usize, slot: &mut OperatorSlot, dispatched_at: Instant) -> Option<TickTask> {
        let (Some(mut backend), Some(mut input), Some(mut output)) =
            (slot.backend.take(), slot.input.take(), slot.output.take())
        else {
            tracing::error!("Operator '{}' is missing its backend; stopping it", slot.name);
            self.stop_operator(slot, "backend unavailable");
            return None;
        };

        if slot.state == OperatorState::Initialized {
            slot.state = OperatorState::Running;
        }

        let ctx = ExecutionContext::new(
            self.execution_id,
            slot.name.clone(),
            slot.ticks + 1,
            dispatched_at,
            slot.resources.clone(),
            self.event_bus.create_emitter(self.execution_id, slot.name.clone()),
            self.token.clone(),
        );
        tracing::trace!("Dispatching '{}' tick {}", slot.name, ctx.tick);

        let ledger = self.ledger.clone();
        Some(tokio::spawn(ledger.scope(async move {
            let start = Instant::now();
            let result = AssertUnwindSafe(backend.compute(&mut input, &mut output, &ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(OperatorError::ExecutionFailed(format!(
                        "compute panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            TickOutcome {
                op,
                backend,
                input,
                output,
                dispatched_at,
                elapsed: start.elapsed(),
                result,
            }
        })))
    }

    fn complete(&mut self, slot: &mut OperatorSlot, tick: TickOutcome) {
        slot.backend = Some(tick.backend);
        slot.input = Some(tick.input);
        slot.output = Some(tick.output);
        slot.ticks += 1;

        for condition in slot.conditions.iter_mut() {
            condition.on_execute(tick.dispatched_at);
        }

        match tick.result {
            Ok(()) => {
                tracing::debug!(
                    "Operator '{}' ({}) tick {} took {}us",
                    slot.name,
                    slot.type_name,
                    slot.ticks,
                    tick.elapsed.as_micros()
                );
                self.event_bus.emit(ExecutionEvent::OperatorTicked {
                    execution_id: self.execution_id,
                    operator: slot.name.clone(),
                    tick: slot.ticks,
                    duration_us: tick.elapsed.as_micros() as u64,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                tracing::error!("Operator '{}' failed on tick {}: {}", slot.name, slot.ticks, e);
                self.event_bus.emit(ExecutionEvent::OperatorFailed {
                    execution_id: self.execution_id,
                    operator: slot.name.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.failures.push(OperatorFailure {
                    operator: slot.name.clone(),
                    tick: slot.ticks,
                    error: e.to_string(),
                });
                self.stop_operator(slot, "compute failed");
            }
        }
    }

    fn stop_operator(&self, slot: &mut OperatorSlot, reason: &str) {
        if slot.is_stopped() {
            return;
        }
        slot.state = OperatorState::Stopped;
        tracing::debug!("Operator '{}' stopped after {} ticks: {}", slot.name, slot.ticks, reason);
        self.event_bus.emit(ExecutionEvent::OperatorStopped {
            execution_id: self.execution_id,
            operator: slot.name.clone(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn check_ownership(&self) -> Result<(), TickError> {
        if self.ledger.violations() == 0 {
            return Ok(());
        }
        let error = self.ledger.last_violation().unwrap_or(OwnershipError::Underflow {
            object: "unknown".to_string(),
        });
        Err(TickError::Ownership(error))
    }

    /// Stop everything, release queued entities and call each backend's
    /// `stop`. Releasing queued entities can still surface an ownership
    /// violation.
    async fn finish(&mut self, plan: &mut ExecutionPlan, reason: StopReason) -> Result<(), TickError> {
        let reason = reason.to_string();
        for slot in plan.slots.iter_mut() {
            self.stop_operator(slot, &reason);
        }

        let drained = plan.drain();
        if drained > 0 {
            tracing::debug!("Released {} queued entities", drained);
        }

        for slot in plan.slots.iter_mut() {
            if let Some(backend) = slot.backend.as_mut() {
                if let Err(e) = backend.stop().await {
                    tracing::warn!("Operator '{}' failed to stop cleanly: {}", slot.name, e);
                }
            }
        }

        self.check_ownership()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

fn abort_all(running: &FuturesUnordered<TickTask>) {
    for task in running.iter() {
        task.abort();
    }
}
