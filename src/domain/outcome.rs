//! Run outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::run_state::RunPhase;

/// Why a run stopped searching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Enough listings were scored
    TargetReached,
    /// Wall-time budget spent
    TimeBudget,
    /// Query budget spent
    QueryBudget,
    /// Too many queries failed back to back
    RepeatedFailure,
    /// Queue empty and no replanning left
    QueriesExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TargetReached => "target result count reached",
            StopReason::TimeBudget => "time budget exhausted",
            StopReason::QueryBudget => "query budget exhausted",
            StopReason::RepeatedFailure => "repeated discovery failures",
            StopReason::QueriesExhausted => "queries exhausted",
        };
        f.write_str(s)
    }
}

/// Final (or current) counts for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub phase: RunPhase,
    pub stop_reason: Option<StopReason>,
    pub queries_planned: u32,
    pub queries_attempted: u32,
    pub queries_failed: u32,
    pub listings_discovered: u32,
    pub listings_accepted: u32,
    pub listings_scored: u32,
    pub listings_unscored: u32,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.phase == RunPhase::Done
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} {}: queries {}/{} attempted, {} failed; listings {} discovered, {} accepted, {} scored, {} unscored",
            self.run_id,
            self.phase.as_str(),
            self.queries_attempted,
            self.queries_planned,
            self.queries_failed,
            self.listings_discovered,
            self.listings_accepted,
            self.listings_scored,
            self.listings_unscored,
        )?;
        if let Some(reason) = self.stop_reason {
            write!(f, " ({})", reason)?;
        }
        if let Some(err) = &self.error {
            write!(f, " error: {}", err)?;
        }
        Ok(())
    }
}
