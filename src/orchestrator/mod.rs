//! Orchestration: the run state machine, its checkpoints and stop policy.

mod checkpoint;
mod machine;
mod stop;
mod transitions;

pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use machine::{Orchestrator, RunSettings, run_all};
pub use stop::{StopCondition, StopPolicy};
pub use transitions::{can_transition, check_transition};
