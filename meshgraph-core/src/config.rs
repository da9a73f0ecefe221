//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// What [`Scheduler::process`](crate::graph::Scheduler::process) does when a
/// pass makes no progress while nodes are still stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlockPolicy {
    /// Return [`GraphError::Deadlock`].
    #[default]
    Error,
    /// Panic with the deadlock message.
    Panic,
}

/// Settings for the eager scheduler.
///
/// Every field has a default, so `{}` is a valid configuration:
///
/// ```json
/// { "on_deadlock": "panic", "max_passes": 64 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub on_deadlock: DeadlockPolicy,
    /// Abort a `process()` call after this many passes.
    pub max_passes: Option<usize>,
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> GraphResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.max_passes == Some(0) {
            return Err(GraphError::Config("max_passes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_deadlock_policy(mut self, policy: DeadlockPolicy) -> Self {
        self.on_deadlock = policy;
        self
    }

    pub fn with_max_passes(mut self, limit: usize) -> Self {
        self.max_passes = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = SchedulerConfig::from_json("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.on_deadlock, DeadlockPolicy::Error);
        assert_eq!(config.max_passes, None);
    }

    #[test]
    fn parses_policy_and_limit() {
        let config =
            SchedulerConfig::from_json(r#"{ "on_deadlock": "panic", "max_passes": 8 }"#).unwrap();
        assert_eq!(config.on_deadlock, DeadlockPolicy::Panic);
        assert_eq!(config.max_passes, Some(8));
    }

    #[test]
    fn rejects_unknown_fields_and_zero_passes() {
        let err = SchedulerConfig::from_json(r#"{ "retries": 3 }"#).unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));

        let err = SchedulerConfig::from_json(r#"{ "max_passes": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("max_passes"));
    }
}
