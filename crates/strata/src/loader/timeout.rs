// crates/strata/src/loader/timeout.rs
// Timeout ladder: one budget per operation class, strictly increasing

use crate::config::TimeoutsConfig;
use crate::error::{Result, StrataError};
use serde::Serialize;
use std::time::Duration;
use strata_types::OperationClass;
use tokio::time::Instant;

/// Validated timeout ladder.
///
/// `CacheLookup < FileRead < LayerLoad < FullLoad < Analysis` always holds;
/// a configuration that breaks the ordering never becomes a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutPolicy {
    budgets: [Duration; 5],
}

impl TimeoutPolicy {
    pub fn new(config: TimeoutsConfig) -> Result<Self> {
        let budgets = [
            config.cache_lookup,
            config.file_read,
            config.layer_load,
            config.full_load,
            config.analysis,
        ];

        for (class, budget) in OperationClass::ALL.iter().zip(&budgets) {
            if budget.is_zero() {
                return Err(StrataError::Config(format!(
                    "timeout for {} must be positive",
                    class
                )));
            }
        }
        for i in 1..budgets.len() {
            if budgets[i] <= budgets[i - 1] {
                return Err(StrataError::Config(format!(
                    "timeout ladder out of order: {} ({:?}) must exceed {} ({:?})",
                    OperationClass::ALL[i],
                    budgets[i],
                    OperationClass::ALL[i - 1],
                    budgets[i - 1]
                )));
            }
        }

        Ok(Self { budgets })
    }

    pub fn budget_for(&self, class: OperationClass) -> Duration {
        self.budgets[class as usize]
    }

    /// The full ladder, fastest first
    pub fn ladder(&self) -> [(OperationClass, Duration); 5] {
        OperationClass::ALL.map(|class| (class, self.budget_for(class)))
    }

    /// Absolute deadline for an operation of `class` that started at `start`
    pub fn deadline_for(&self, class: OperationClass, start: Instant) -> Instant {
        start + self.budget_for(class)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        let d = TimeoutsConfig::default();
        Self {
            budgets: [
                d.cache_lookup,
                d.file_read,
                d.layer_load,
                d.full_load,
                d.analysis,
            ],
        }
    }
}
