use super::{Condition, ConditionType, SchedulingStatus};
use crate::{ConditionError, Value};
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between two ticks, in nanoseconds.
///
/// Built from raw nanoseconds, a `Duration`, or (from configuration) a
/// string such as `"100ms"`, `"2s"`, `"500us"`, `"250ns"` or `"30Hz"`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecessPeriod(Result<u64, ConditionError>);

impl RecessPeriod {
    pub fn from_nanos(ns: u64) -> Self {
        Self(Ok(ns))
    }

    pub fn as_nanos(&self) -> Result<u64, ConditionError> {
        self.0.clone()
    }

    fn parse_str(raw: &str) -> Result<u64, ConditionError> {
        let invalid = || ConditionError::InvalidPeriod(raw.to_string());
        let text = raw.trim();
        let split = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let number: f64 = number.parse().map_err(|_| invalid())?;
        if !number.is_finite() || number < 0.0 {
            return Err(invalid());
        }

        let ns = match unit.trim() {
            "" | "ns" => number,
            "us" => number * 1e3,
            "ms" => number * 1e6,
            "s" => number * 1e9,
            "Hz" | "hz" if number > 0.0 => 1e9 / number,
            _ => return Err(invalid()),
        };
        whole_nanos(ns.round()).ok_or_else(invalid)
    }
}

/// `ns` as an integer count of nanoseconds, if it is one that fits
fn whole_nanos(ns: f64) -> Option<u64> {
    (ns.fract() == 0.0 && (0.0..u64::MAX as f64).contains(&ns)).then_some(ns as u64)
}

impl From<u64> for RecessPeriod {
    fn from(ns: u64) -> Self {
        Self(Ok(ns))
    }
}

impl From<i64> for RecessPeriod {
    fn from(ns: i64) -> Self {
        Self(u64::try_from(ns).map_err(|_| ConditionError::InvalidPeriod(ns.to_string())))
    }
}

impl From<Duration> for RecessPeriod {
    fn from(period: Duration) -> Self {
        Self(u64::try_from(period.as_nanos()).map_err(|_| {
            ConditionError::InvalidPeriod(format!("{:?} overflows nanoseconds", period))
        }))
    }
}

impl From<&Value> for RecessPeriod {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(ns) => RecessPeriod::from(*ns),
            Value::String(s) => Self(RecessPeriod::parse_str(s)),
            Value::Float(ns) => Self(whole_nanos(*ns).ok_or_else(|| {
                ConditionError::InvalidPeriod(format!(
                    "{} is not a whole number of nanoseconds; use a unit suffix such as \"500ms\"",
                    ns
                ))
            })),
            other => Self(Err(ConditionError::InvalidPeriod(format!(
                "expected nanoseconds or a duration string, got {}",
                other.type_name()
            )))),
        }
    }
}

/// Ready when at least the recess period has passed since the last tick
#[derive(Debug, Clone)]
pub struct PeriodicCondition {
    name: String,
    period: RecessPeriod,
    last_fire: Option<Instant>,
}

impl PeriodicCondition {
    pub fn new(period: impl Into<RecessPeriod>) -> Self {
        Self {
            name: "periodic".to_string(),
            period: period.into(),
            last_fire: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_recess_period(&mut self, period: impl Into<RecessPeriod>) {
        self.period = period.into();
    }

    /// Configured period; an invalid period reads as zero and is rejected by
    /// `initialize`
    pub fn recess_period_ns(&self) -> u64 {
        self.period.as_nanos().unwrap_or(0)
    }

    pub fn last_fire(&self) -> Option<Instant> {
        self.last_fire
    }

    fn period(&self) -> Duration {
        Duration::from_nanos(self.recess_period_ns())
    }
}

impl Condition for PeriodicCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn condition_type(&self) -> ConditionType {
        ConditionType::Periodic
    }

    fn initialize(&mut self) -> Result<(), ConditionError> {
        self.period.as_nanos().map(|_| ())
    }

    fn check(&mut self, now: Instant) -> SchedulingStatus {
        match self.last_fire {
            Some(last) if now.saturating_duration_since(last) < self.period() => {
                SchedulingStatus::NotReady
            }
            _ => SchedulingStatus::Ready,
        }
    }

    fn on_execute(&mut self, now: Instant) {
        self.last_fire = Some(now);
    }

    fn next_ready_at(&self) -> Option<Instant> {
        self.last_fire.map(|last| last + self.period())
    }
}
