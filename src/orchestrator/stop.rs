//! Stop decisions, evaluated after every discovery/scoring cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{RunState, StopReason};

/// A condition the policy checks. Queue exhaustion is decided by planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopCondition {
    TargetReached,
    TimeBudget,
    QueryBudget,
    RepeatedFailure,
}

impl StopCondition {
    pub const DEFAULT_ORDER: [StopCondition; 4] = [
        StopCondition::TargetReached,
        StopCondition::TimeBudget,
        StopCondition::QueryBudget,
        StopCondition::RepeatedFailure,
    ];

    fn reason(&self) -> StopReason {
        match self {
            StopCondition::TargetReached => StopReason::TargetReached,
            StopCondition::TimeBudget => StopReason::TimeBudget,
            StopCondition::QueryBudget => StopReason::QueryBudget,
            StopCondition::RepeatedFailure => StopReason::RepeatedFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopPolicy {
    /// Checked in this order; the first that holds wins.
    pub order: Vec<StopCondition>,
    /// Scored listings wanted. 0 disables the check.
    pub target_results: u32,
    pub time_budget: Duration,
    /// Total queries the run may dispatch.
    pub max_queries: u32,
    pub max_consecutive_failures: u32,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            order: StopCondition::DEFAULT_ORDER.to_vec(),
            target_results: 50,
            time_budget: Duration::from_secs(30 * 60),
            max_queries: 15,
            max_consecutive_failures: 3,
        }
    }
}

impl StopPolicy {
    /// First condition in `order` that holds for `state`.
    pub fn evaluate(&self, state: &RunState) -> Option<StopReason> {
        self.order.iter().find(|c| self.holds(**c, state)).map(StopCondition::reason)
    }

    fn holds(&self, condition: StopCondition, state: &RunState) -> bool {
        match condition {
            StopCondition::TargetReached => {
                self.target_results > 0 && state.scored.len() as u32 >= self.target_results
            }
            StopCondition::TimeBudget => state.budget.elapsed_ms >= self.time_budget.as_millis() as u64,
            // A query already in flight finishes paging before the budget bites.
            StopCondition::QueryBudget => {
                state.in_flight.is_none() && state.budget.queries_issued >= self.max_queries
            }
            StopCondition::RepeatedFailure => {
                self.max_consecutive_failures > 0
                    && state.errors.consecutive_discovery_failures >= self.max_consecutive_failures
            }
        }
    }
}
