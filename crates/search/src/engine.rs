//! Breadth-first search engine with duplicate suppression and budgets.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use lean_repl::{LeanError, ProofState, TacticResult};
use policy::TacticCandidate;
use records::{ProofSearchResult, Termination, TheoremDescriptor};

use crate::cancel::CancelFlag;
use crate::config::SearchConfig;
use crate::node::{extract_tactic_sequence, SearchNode};

/// Theorem-level failures: the search could not start or could not go on.
///
/// Branch failures (a rejected tactic, a failed generation) never surface
/// here; the engine absorbs them.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The theorem's repository could not be resolved.
    #[error("repository setup failed: {0}")]
    Setup(String),
    /// The proof session could not be opened.
    #[error("failed to open proof session: {0}")]
    OracleInit(#[source] LeanError),
    /// The proof session became unusable mid-search.
    #[error("proof session crashed: {0}")]
    OracleCrash(#[source] LeanError),
}

impl SearchError {
    /// Result-row classification for this failure.
    pub fn termination(&self) -> Termination {
        match self {
            SearchError::Setup(_) => Termination::SetupFailed,
            SearchError::OracleInit(_) => Termination::OracleInitFailed,
            SearchError::OracleCrash(_) => Termination::OracleCrashed,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of ranked tactic candidates for a proof state.
///
/// Implementations should absorb provider failures themselves and return
/// what they have; an `Err` is still tolerated and treated as "no candidates".
#[async_trait]
pub trait TacticGenerator: Send + Sync {
    /// Candidates for `state_text`, deduplicated and sorted by score descending.
    async fn generate(&self, state_text: &str) -> anyhow::Result<Vec<TacticCandidate>>;
}

/// A proof session bound to one theorem.
#[async_trait]
pub trait ProofOracle: Send {
    /// Root state of the theorem.
    fn initial_state(&self) -> &ProofState;

    /// Apply `tactic` to `state`, which must come from this session.
    ///
    /// `Err` values with [`LeanError::is_fatal`] mean the session is gone.
    async fn apply(&mut self, state: &ProofState, tactic: &str) -> Result<TacticResult, LeanError>;

    /// Release the session. Called exactly once, on every exit path.
    async fn close(&mut self);
}

/// Opens proof sessions for theorems.
#[async_trait]
pub trait ProofEnvironment: Send + Sync {
    /// Resolve the theorem's sources and start a session on it.
    async fn open(&self, theorem: &TheoremDescriptor) -> Result<Box<dyn ProofOracle>, SearchError>;
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters for one search run.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// Nodes for which candidates were requested.
    pub expansions: u32,
    /// States dropped because an equal state was already visited.
    pub duplicates_skipped: u32,
    /// Nodes popped at `max_depth` and not expanded.
    pub nodes_pruned: u32,
    /// Largest frontier length observed.
    pub peak_frontier: usize,
    pub tactic_attempts: u32,
    /// Tactics Lean rejected.
    pub tactic_failures: u32,
    /// Tactics that closed goals with `sorry`.
    pub given_up: u32,
    /// Non-fatal oracle errors (timeouts, protocol noise).
    pub oracle_errors: u32,
    pub generation_failures: u32,
    pub generate_time: Duration,
    pub oracle_time: Duration,
}

impl SearchStats {
    fn log(&self, theorem: &str, termination: Termination, elapsed: Duration) {
        tracing::info!(
            theorem,
            outcome = %termination,
            elapsed_s = format!("{:.2}", elapsed.as_secs_f64()),
            expansions = self.expansions,
            duplicates = self.duplicates_skipped,
            pruned = self.nodes_pruned,
            peak_frontier = self.peak_frontier,
            attempts = self.tactic_attempts,
            failures = self.tactic_failures,
            given_up = self.given_up,
            oracle_errors = self.oracle_errors,
            generation_failures = self.generation_failures,
            generate_ms = self.generate_time.as_millis() as u64,
            oracle_ms = self.oracle_time.as_millis() as u64,
            "Search finished"
        );
    }
}

// ---------------------------------------------------------------------------
// SearchEngine
// ---------------------------------------------------------------------------

/// Breadth-first proof search engine.
///
/// States are expanded in FIFO order, so every state at depth `d` is
/// expanded before any state at depth `d + 1`. Each distinct pretty-printed
/// state is expanded at most once per run; the first path to reach a state
/// is the one kept.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    config: SearchConfig,
}

impl SearchEngine {
    /// Create a new search engine with the given configuration.
    pub fn new(config: SearchConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search for a proof of one theorem through an open session.
    ///
    /// Returns `Err` only when the session dies; every other ending
    /// (proved, exhausted, timed out, interrupted) is an `Ok` row. The
    /// timeout is checked before each frontier pop, so a slow expansion
    /// can overrun it by one expansion.
    pub async fn search(
        &self,
        oracle: &mut dyn ProofOracle,
        generator: &dyn TacticGenerator,
        theorem_name: &str,
        cancel: &CancelFlag,
    ) -> Result<ProofSearchResult, SearchError> {
        let start = Instant::now();
        let timeout = self.config.timeout();
        let mut stats = SearchStats::default();

        let mut arena = vec![SearchNode::root(oracle.initial_state().clone())];
        let mut frontier: VecDeque<usize> = VecDeque::from([0]);
        let mut visited: HashSet<String> = HashSet::new();

        let finish = |stats: &SearchStats, termination: Termination| {
            let elapsed = start.elapsed();
            stats.log(theorem_name, termination, elapsed);
            ProofSearchResult::unproved(
                theorem_name,
                termination,
                elapsed.as_secs_f64(),
                stats.expansions,
            )
        };

        while !frontier.is_empty() && stats.expansions < self.config.max_expansions {
            if start.elapsed() > timeout {
                tracing::info!(
                    theorem = theorem_name,
                    elapsed_s = start.elapsed().as_secs_f64(),
                    "Search timed out"
                );
                return Ok(finish(&stats, Termination::TimedOut));
            }
            if cancel.is_cancelled() {
                tracing::info!(theorem = theorem_name, "Search interrupted");
                return Ok(finish(&stats, Termination::Interrupted));
            }

            let Some(node_idx) = frontier.pop_front() else {
                break;
            };
            if !visited.insert(arena[node_idx].state.pp().to_string()) {
                stats.duplicates_skipped += 1;
                continue;
            }

            let depth = arena[node_idx].depth;
            if depth >= self.config.max_depth {
                stats.nodes_pruned += 1;
                continue;
            }

            stats.expansions += 1;
            let state = arena[node_idx].state.clone();

            tracing::debug!(
                theorem = theorem_name,
                node = node_idx,
                state_id = state.state_id,
                depth,
                frontier = frontier.len(),
                "Expanding node"
            );

            let gen_start = Instant::now();
            let candidates = match generator.generate(state.pp()).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    stats.generation_failures += 1;
                    tracing::warn!(
                        theorem = theorem_name,
                        node = node_idx,
                        error = %e,
                        "Tactic generation failed, treating as no candidates"
                    );
                    Vec::new()
                }
            };
            stats.generate_time += gen_start.elapsed();

            for candidate in candidates {
                stats.tactic_attempts += 1;
                let apply_start = Instant::now();
                let outcome = oracle.apply(&state, &candidate.text).await;
                stats.oracle_time += apply_start.elapsed();

                match outcome {
                    Ok(TacticResult::Finished { .. }) => {
                        let mut steps = extract_tactic_sequence(&arena, node_idx);
                        steps.push(candidate.text);
                        let elapsed = start.elapsed();

                        tracing::info!(
                            theorem = theorem_name,
                            steps = steps.len(),
                            expansions = stats.expansions,
                            time_ms = elapsed.as_millis() as u64,
                            "Proof found"
                        );
                        stats.log(theorem_name, Termination::Proved, elapsed);
                        return Ok(ProofSearchResult::proved(
                            theorem_name,
                            steps,
                            elapsed.as_secs_f64(),
                            stats.expansions,
                        ));
                    }
                    Ok(TacticResult::NewState(next)) => {
                        if visited.contains(next.pp()) {
                            stats.duplicates_skipped += 1;
                            continue;
                        }
                        arena.push(SearchNode::child(next, node_idx, candidate.text, depth + 1));
                        frontier.push_back(arena.len() - 1);
                        stats.peak_frontier = stats.peak_frontier.max(frontier.len());
                    }
                    Ok(TacticResult::Error { message }) => {
                        stats.tactic_failures += 1;
                        tracing::debug!(tactic = candidate.text, error = message, "Tactic failed");
                    }
                    Ok(TacticResult::GivenUp { .. }) => {
                        stats.given_up += 1;
                        tracing::debug!(tactic = candidate.text, "Tactic gave up");
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::warn!(
                            theorem = theorem_name,
                            tactic = candidate.text,
                            error = %e,
                            "Proof session crashed"
                        );
                        stats.log(theorem_name, Termination::OracleCrashed, start.elapsed());
                        return Err(SearchError::OracleCrash(e));
                    }
                    Err(e) => {
                        stats.oracle_errors += 1;
                        tracing::debug!(tactic = candidate.text, error = %e, "Tactic errored");
                    }
                }
            }
        }

        Ok(finish(&stats, Termination::Exhausted))
    }
}
