//! The run state machine.
//!
//! `step` executes exactly one unit of work for the current phase and
//! checkpoints the state afterwards:
//! - INIT: resolve resume text, build the profile
//! - PLANNING: initial plan once, replan rounds afterwards
//! - DISCOVERING: fetch and ingest one page of the in-flight query
//! - SCORING: score what the last page accepted, then check stop conditions
//!
//! Contained failures (a query, a listing) are recorded on the state. Anything
//! else ends the run in FAILED; cancellation ends it in CANCELLED.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::checkpoint::CheckpointStore;
use super::stop::{StopCondition, StopPolicy};
use super::transitions::check_transition;
use crate::discovery::{DiscoveryDriver, Pagination};
use crate::domain::{
    AcceptedListing, CandidateProfile, InFlightQuery, ResumeSource, RunInput, RunPhase, RunState, RunSummary,
    ScoredListing, StopReason,
};
use crate::error::{Result, ScoutError};
use crate::extract::{FileTextExtractor, TextExtractor};
use crate::id::generate_run_id;
use crate::planner::QueryPlanner;
use crate::profile::ProfileBuilder;
use crate::scoring::{DEFAULT_TOLERANCE, FitScorer, reconcile};
use crate::storage::Deduplicator;

/// Budgets and limits for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Initial queries (K).
    pub max_queries: u32,
    /// Extra queries all replan rounds together may add.
    pub replan_cap: u32,
    pub max_replan_rounds: u32,
    /// Pages fetched per query before moving on.
    pub page_budget: u32,
    pub target_results: u32,
    pub time_budget: Duration,
    pub stop_order: Vec<StopCondition>,
    pub max_consecutive_failures: u32,
    pub score_tolerance: u8,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_queries: 10,
            replan_cap: 5,
            max_replan_rounds: 2,
            page_budget: 3,
            target_results: 50,
            time_budget: Duration::from_secs(30 * 60),
            stop_order: StopCondition::DEFAULT_ORDER.to_vec(),
            max_consecutive_failures: 3,
            score_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl RunSettings {
    /// Hard cap on queries a run may ever hold.
    pub fn total_query_cap(&self) -> u32 {
        self.max_queries + self.replan_cap
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            order: self.stop_order.clone(),
            target_results: self.target_results,
            time_budget: self.time_budget,
            max_queries: self.total_query_cap(),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

/// Drives runs through their phases.
pub struct Orchestrator {
    settings: RunSettings,
    extractor: Arc<dyn TextExtractor>,
    profiles: ProfileBuilder,
    planner: QueryPlanner,
    driver: DiscoveryDriver,
    dedup: Deduplicator,
    scorer: Arc<dyn FitScorer>,
    checkpoints: Arc<dyn CheckpointStore>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        driver: DiscoveryDriver,
        dedup: Deduplicator,
        scorer: Arc<dyn FitScorer>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            settings: RunSettings::default(),
            extractor: Arc::new(FileTextExtractor),
            profiles: ProfileBuilder::new(),
            planner: QueryPlanner::new(1),
            driver,
            dedup,
            scorer,
            checkpoints,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_profile_builder(mut self, profiles: ProfileBuilder) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_planner(mut self, planner: QueryPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Create a run, or pick up the checkpointed one when `run_id` exists.
    pub fn start(&self, run_id: Option<String>, input: RunInput) -> Result<RunState> {
        let id = run_id.unwrap_or_else(generate_run_id);
        if let Some(existing) = self.checkpoints.load(&id)? {
            log::info!("Run {} already exists in {}, resuming", id, existing.phase.as_str());
            return Ok(existing);
        }
        let state = RunState::new(id, input);
        self.checkpoints.save(&state)?;
        log::info!("Started run {}", state.id);
        Ok(state)
    }

    /// Load a checkpointed run. It re-enters at its last checkpointed phase.
    pub fn resume(&self, run_id: &str) -> Result<RunState> {
        let state = self
            .checkpoints
            .load(run_id)?
            .ok_or_else(|| ScoutError::InvalidState(format!("no checkpoint for run {}", run_id)))?;
        log::info!("Resuming run {} at {}", run_id, state.phase.as_str());
        Ok(state)
    }

    /// Start (or resume) and drive to a terminal phase.
    pub async fn execute(&self, run_id: Option<String>, input: RunInput) -> Result<RunSummary> {
        let state = self.start(run_id, input)?;
        self.run(state).await
    }

    /// Step until the run is terminal.
    pub async fn run(&self, mut state: RunState) -> Result<RunSummary> {
        self.drive(&mut state).await?;
        let summary = state.summary();
        log::info!("{}", summary);
        Ok(summary)
    }

    pub async fn drive(&self, state: &mut RunState) -> Result<()> {
        while !state.phase.is_terminal() {
            self.step(state).await?;
        }
        Ok(())
    }

    /// Execute one unit of work and checkpoint.
    ///
    /// Errors are returned only when the checkpoint itself cannot be written
    /// or the run is already terminal; run failures land in `state`.
    pub async fn step(&self, state: &mut RunState) -> Result<()> {
        if state.phase.is_terminal() {
            return Err(ScoutError::InvalidState(format!(
                "run {} is already {}",
                state.id,
                state.phase.as_str()
            )));
        }

        let started = Instant::now();
        let outcome = if self.cancel.is_cancelled() {
            Err(ScoutError::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(ScoutError::Cancelled),
                r = self.advance(state) => r,
            }
        };
        state.budget.elapsed_ms += started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {}
            Err(ScoutError::Cancelled) => {
                log::warn!("Run {} cancelled in {}", state.id, state.phase.as_str());
                state.phase = RunPhase::Cancelled;
            }
            Err(e) => {
                log::error!("Run {} failed in {}: {}", state.id, state.phase.as_str(), e);
                state.terminal_error = Some(e.to_string());
                state.phase = RunPhase::Failed;
            }
        }

        state.touch();
        if let Err(e) = self.checkpoints.save(state) {
            log::error!("Checkpoint for {} failed: {}", state.id, e);
            if !state.phase.is_terminal() {
                state.terminal_error = Some(e.to_string());
                state.phase = RunPhase::Failed;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Score every unscored listing of the run again. Returns how many now
    /// have a score.
    pub async fn rescore_unscored(&self, state: &mut RunState) -> Result<usize> {
        if state.unscored.is_empty() {
            return Ok(0);
        }
        let profile = profile_of(state)?;
        let batch = state.unscored.clone();
        log::info!("Rescoring {} unscored listings for {}", batch.len(), state.id);

        let results = self.scorer.score_batch(&profile, &batch).await;
        let before = state.unscored.len();
        self.record_scores(state, batch, results)?;
        let recovered = before - state.unscored.len();

        state.touch();
        self.checkpoints.save(state)?;
        Ok(recovered)
    }

    fn enter(&self, state: &mut RunState, to: RunPhase) -> Result<()> {
        check_transition(state.phase, to)?;
        log::debug!("Run {}: {} -> {}", state.id, state.phase.as_str(), to.as_str());
        state.phase = to;
        Ok(())
    }

    async fn advance(&self, state: &mut RunState) -> Result<()> {
        match state.phase {
            RunPhase::Init => self.init(state).await,
            RunPhase::Planning => self.planning(state).await,
            RunPhase::Discovering => self.discovering(state).await,
            RunPhase::Scoring => self.scoring(state).await,
            RunPhase::Done | RunPhase::Failed | RunPhase::Cancelled => Ok(()),
        }
    }

    async fn init(&self, state: &mut RunState) -> Result<()> {
        let text = match &state.input.resume {
            ResumeSource::Text(text) => text.clone(),
            ResumeSource::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| ScoutError::Extraction(format!("cannot read resume {}: {}", path.display(), e)))?;
                self.extractor.extract(bytes).await?
            }
        };
        let profile = self.profiles.build(&text, &state.input.preferences).await?;
        state.profile = Some(profile);
        self.enter(state, RunPhase::Planning)
    }

    async fn planning(&self, state: &mut RunState) -> Result<()> {
        let profile = profile_of(state)?;

        if !state.planned {
            let outcome = self
                .planner
                .plan(&state.id, &profile, self.settings.max_queries as usize)
                .await?;
            if outcome.degraded {
                state.errors.planning_degradations += 1;
            }
            state.budget.initial_planned = outcome.queries.len() as u32;
            state.queries.extend(outcome.queries);
            state.planned = true;
            return self.enter(state, RunPhase::Discovering);
        }

        if state.has_pending() {
            return self.enter(state, RunPhase::Discovering);
        }

        let allowance = self.replan_allowance(state);
        let fresh = if allowance > 0 {
            self.planner.replan(&state.id, &profile, &state.queries, allowance)
        } else {
            Vec::new()
        };

        if fresh.is_empty() {
            log::info!("Run {}: no queries left to run", state.id);
            state.stop_reason = Some(StopReason::QueriesExhausted);
            return self.enter(state, RunPhase::Done);
        }

        state.budget.replan_rounds += 1;
        state.budget.replan_planned += fresh.len() as u32;
        state.queries.extend(fresh);
        self.enter(state, RunPhase::Discovering)
    }

    fn replan_allowance(&self, state: &RunState) -> usize {
        if state.budget.replan_rounds >= self.settings.max_replan_rounds {
            return 0;
        }
        let by_cap = self.settings.replan_cap.saturating_sub(state.budget.replan_planned);
        let by_total = self.settings.total_query_cap().saturating_sub(state.queries.len() as u32);
        by_cap.min(by_total) as usize
    }

    async fn discovering(&self, state: &mut RunState) -> Result<()> {
        if state.in_flight.is_none() {
            let Some(idx) = state.next_pending() else {
                return self.enter(state, RunPhase::Planning);
            };
            let query = &mut state.queries[idx];
            query.mark_in_flight();
            log::info!("Run {}: dispatching query '{}'", state.id, query.text);
            state.in_flight = Some(InFlightQuery {
                query_id: query.id.clone(),
                pagination: Pagination::new(self.settings.page_budget),
            });
            state.budget.queries_issued += 1;
        }

        let (query_id, mut pagination) = match &state.in_flight {
            Some(f) => (f.query_id.clone(), f.pagination.clone()),
            None => return Err(ScoutError::InvalidState("no query in flight".to_string())),
        };
        let query = state
            .query(&query_id)
            .cloned()
            .ok_or_else(|| ScoutError::InvalidState(format!("in-flight query {} is not in the queue", query_id)))?;

        match self.driver.discover(&query, &mut pagination, &self.cancel).await {
            Ok(page) => {
                state.budget.pages_fetched += 1;
                state.budget.listings_found += page.listings.len() as u32;
                state.errors.consecutive_discovery_failures = 0;

                for listing in page.listings {
                    let outcome = self.dedup.ingest(&state.id, &mut state.seen, &listing)?;
                    if outcome.accepted {
                        state.budget.listings_accepted += 1;
                        state.pending_scoring.push(AcceptedListing {
                            key: outcome.key,
                            listing,
                        });
                    }
                }

                if page.end.is_some() {
                    if let Some(q) = state.query_mut(&query_id) {
                        q.mark_done();
                    }
                    state.in_flight = None;
                } else {
                    state.in_flight = Some(InFlightQuery { query_id, pagination });
                }
            }
            Err(ScoutError::Discovery { cause, .. }) => {
                log::warn!("Run {}: query '{}' failed: {}", state.id, query.text, cause);
                if let Some(q) = state.query_mut(&query_id) {
                    q.mark_failed(cause);
                }
                state.in_flight = None;
                state.errors.discovery_failures += 1;
                state.errors.consecutive_discovery_failures += 1;
            }
            Err(e) => return Err(e),
        }

        self.enter(state, RunPhase::Scoring)
    }

    async fn scoring(&self, state: &mut RunState) -> Result<()> {
        if !state.pending_scoring.is_empty() {
            let profile = profile_of(state)?;
            let batch = state.pending_scoring.clone();
            let results = self.scorer.score_batch(&profile, &batch).await;
            self.record_scores(state, batch, results)?;
            state.pending_scoring.clear();
        }

        if let Some(reason) = self.settings.stop_policy().evaluate(state) {
            log::info!("Run {} stopping: {}", state.id, reason);
            if let Some(flight) = state.in_flight.take()
                && let Some(q) = state.query_mut(&flight.query_id)
            {
                q.mark_done();
            }
            state.stop_reason = Some(reason);
            return self.enter(state, RunPhase::Done);
        }

        if state.in_flight.is_some() || state.has_pending() {
            self.enter(state, RunPhase::Discovering)
        } else {
            self.enter(state, RunPhase::Planning)
        }
    }

    fn record_scores(
        &self,
        state: &mut RunState,
        batch: Vec<AcceptedListing>,
        results: Vec<Result<ScoredListing>>,
    ) -> Result<()> {
        let store = self.dedup.store();
        let mut results = results.into_iter();

        for candidate in batch {
            let result = results.next().unwrap_or_else(|| {
                Err(ScoutError::Scoring {
                    listing: candidate.key.to_string(),
                    cause: "scorer returned no result".to_string(),
                })
            });

            match result {
                Ok(mut scored) => {
                    let previous = store.score_for(&state.id, &scored.key)?;
                    reconcile(previous.as_ref(), &mut scored, self.settings.score_tolerance);
                    store.save_score(&state.id, &scored)?;
                    state.unscored.retain(|u| u.key != scored.key);
                    match state.scored.iter_mut().find(|s| s.key == scored.key) {
                        Some(slot) => *slot = scored,
                        None => state.scored.push(scored),
                    }
                }
                Err(e) if !e.is_fatal() => {
                    log::warn!("Run {}: {}", state.id, e);
                    state.errors.scoring_failures += 1;
                    store.mark_unscored(&state.id, &candidate.key, &e.to_string())?;
                    if !state.unscored.iter().any(|u| u.key == candidate.key) {
                        state.unscored.push(candidate);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn profile_of(state: &RunState) -> Result<CandidateProfile> {
    state
        .profile
        .clone()
        .ok_or_else(|| ScoutError::InvalidState(format!("run {} has no profile", state.id)))
}

/// Drive several runs concurrently. Results line up with `runs`.
pub async fn run_all(runs: Vec<(Arc<Orchestrator>, RunState)>) -> Vec<Result<RunSummary>> {
    log::info!("Running {} runs concurrently", runs.len());
    join_all(
        runs.into_iter()
            .map(|(orchestrator, state)| async move { orchestrator.run(state).await }),
    )
    .await
}
