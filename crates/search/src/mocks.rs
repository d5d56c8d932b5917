//! Mock implementations of search traits for testing without Lean or LLM.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lean_repl::{LeanError, ProofState, TacticResult};
use policy::TacticCandidate;
use records::TheoremDescriptor;

use crate::engine::{ProofEnvironment, ProofOracle, SearchError, TacticGenerator};

/// Candidates in the given order, scored `n, n-1, ..., 1`.
pub fn candidates(tactics: &[&str]) -> Vec<TacticCandidate> {
    let n = tactics.len();
    tactics
        .iter()
        .enumerate()
        .map(|(i, t)| TacticCandidate::new(*t, (n - i) as f64))
        .collect()
}

/// Descriptor for a theorem in a fake repository.
pub fn theorem(full_name: &str) -> TheoremDescriptor {
    TheoremDescriptor {
        url: "https://github.com/example/project".to_string(),
        commit: "0123abcd".to_string(),
        file_path: "Project/Basic.lean".to_string(),
        full_name: full_name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Mock generator that returns canned candidates based on state text.
#[derive(Default)]
pub struct MockGenerator {
    responses: HashMap<String, Vec<TacticCandidate>>,
    contains_responses: Vec<(String, Vec<TacticCandidate>)>,
    default_responses: Vec<TacticCandidate>,
    failing: Vec<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Create an empty mock generator with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock generator with default responses for any state.
    pub fn with_default(candidates: Vec<TacticCandidate>) -> Self {
        Self {
            default_responses: candidates,
            ..Self::default()
        }
    }

    /// Sleep this long inside every `generate` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add a canned response for an exact state text match.
    pub fn add_response(&mut self, state: &str, candidates: Vec<TacticCandidate>) {
        self.responses.insert(state.to_string(), candidates);
    }

    /// Add a canned response that matches if the state *contains* the pattern.
    ///
    /// Contains-matches are checked after exact matches.
    pub fn add_contains_response(&mut self, pattern: &str, candidates: Vec<TacticCandidate>) {
        self.contains_responses.push((pattern.to_string(), candidates));
    }

    /// Return an error for states containing `pattern`.
    pub fn fail_on(&mut self, pattern: &str) {
        self.failing.push(pattern.to_string());
    }

    /// Every state text passed to `generate`, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl TacticGenerator for MockGenerator {
    async fn generate(&self, state_text: &str) -> anyhow::Result<Vec<TacticCandidate>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(state_text.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.iter().any(|p| state_text.contains(p.as_str())) {
            anyhow::bail!("mock generation failure for {state_text:?}");
        }
        // 1. Exact match
        if let Some(candidates) = self.responses.get(state_text) {
            return Ok(candidates.clone());
        }
        // 2. Contains match (first match wins)
        for (pattern, candidates) in &self.contains_responses {
            if state_text.contains(pattern.as_str()) {
                return Ok(candidates.clone());
            }
        }
        // 3. Default fallback
        Ok(self.default_responses.clone())
    }
}

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Result(TacticResult),
    Timeout,
    Crash,
    Panic,
}

/// Mock proof session returning canned results by `(state_id, tactic)`.
///
/// Unknown pairs are rejected with `TacticResult::Error`.
#[derive(Debug, Clone)]
pub struct MockOracle {
    initial: ProofState,
    responses: HashMap<(u64, String), Scripted>,
    applied: Vec<(u64, String)>,
    closed: bool,
    counters: Option<Arc<SessionCounters>>,
}

impl MockOracle {
    /// Session whose root is state 0 with the given goal text.
    pub fn new(initial_pp: &str) -> Self {
        Self {
            initial: ProofState::from_pp(0, initial_pp),
            responses: HashMap::new(),
            applied: Vec::new(),
            closed: false,
            counters: None,
        }
    }

    /// Add a canned tactic result for a `(state_id, tactic)` pair.
    pub fn add_response(&mut self, state_id: u64, tactic: &str, result: TacticResult) {
        self.responses
            .insert((state_id, tactic.to_string()), Scripted::Result(result));
    }

    /// Shorthand for a tactic leading to a new state with the given goal text.
    pub fn add_new_state(&mut self, state_id: u64, tactic: &str, next_id: u64, next_pp: &str) {
        let next = ProofState::from_pp(next_id, next_pp);
        self.add_response(state_id, tactic, TacticResult::NewState(next));
    }

    /// The pair fails with a non-fatal timeout.
    pub fn add_timeout(&mut self, state_id: u64, tactic: &str) {
        self.responses
            .insert((state_id, tactic.to_string()), Scripted::Timeout);
    }

    /// The pair kills the session.
    pub fn add_crash(&mut self, state_id: u64, tactic: &str) {
        self.responses
            .insert((state_id, tactic.to_string()), Scripted::Crash);
    }

    /// Applying the pair panics, as a bug inside a session would.
    pub fn add_panic(&mut self, state_id: u64, tactic: &str) {
        self.responses
            .insert((state_id, tactic.to_string()), Scripted::Panic);
    }

    /// Every `(state_id, tactic)` applied so far.
    pub fn applied(&self) -> Vec<(u64, String)> {
        self.applied.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl ProofOracle for MockOracle {
    fn initial_state(&self) -> &ProofState {
        &self.initial
    }

    async fn apply(&mut self, state: &ProofState, tactic: &str) -> Result<TacticResult, LeanError> {
        if self.closed {
            return Err(LeanError::ProcessDied);
        }
        self.applied.push((state.state_id, tactic.to_string()));

        match self.responses.get(&(state.state_id, tactic.to_string())) {
            Some(Scripted::Result(result)) => Ok(result.clone()),
            Some(Scripted::Timeout) => Err(LeanError::Timeout(30)),
            Some(Scripted::Crash) => Err(LeanError::ProcessDied),
            Some(Scripted::Panic) => panic!("mock oracle panicked applying '{tactic}'"),
            None => Ok(TacticResult::Error {
                message: format!("unknown tactic '{tactic}' at state {}", state.state_id),
            }),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(counters) = &self.counters {
            counters.closed.fetch_add(1, Ordering::SeqCst);
            counters.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// MockEnvironment
// ---------------------------------------------------------------------------

/// How `MockEnvironment::open` should fail for a theorem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    /// Repository resolution fails.
    Setup,
    /// The session refuses to start.
    Init,
    /// `open` panics.
    Panic,
}

/// Session bookkeeping shared by a `MockEnvironment` and the oracles it hands out.
#[derive(Debug, Default)]
pub struct SessionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl SessionCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Most sessions that were open at the same time.
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

/// Mock environment handing out copies of scripted oracles.
pub struct MockEnvironment {
    default: MockOracle,
    oracles: HashMap<String, MockOracle>,
    failures: HashMap<String, OpenFailure>,
    counters: Arc<SessionCounters>,
}

impl MockEnvironment {
    /// Every theorem without its own script gets a copy of `default`.
    pub fn new(default: MockOracle) -> Self {
        Self {
            default,
            oracles: HashMap::new(),
            failures: HashMap::new(),
            counters: Arc::new(SessionCounters::default()),
        }
    }

    pub fn add_oracle(&mut self, full_name: &str, oracle: MockOracle) {
        self.oracles.insert(full_name.to_string(), oracle);
    }

    pub fn add_failure(&mut self, full_name: &str, failure: OpenFailure) {
        self.failures.insert(full_name.to_string(), failure);
    }

    pub fn counters(&self) -> Arc<SessionCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl ProofEnvironment for MockEnvironment {
    async fn open(&self, theorem: &TheoremDescriptor) -> Result<Box<dyn ProofOracle>, SearchError> {
        match self.failures.get(&theorem.full_name) {
            Some(OpenFailure::Setup) => {
                return Err(SearchError::Setup(format!(
                    "no checkout for {}@{}",
                    theorem.url, theorem.commit
                )))
            }
            Some(OpenFailure::Init) => {
                return Err(SearchError::OracleInit(LeanError::LeanMessage(format!(
                    "Unknown constant {}",
                    theorem.full_name
                ))))
            }
            Some(OpenFailure::Panic) => panic!("mock environment panicked opening {}", theorem.full_name),
            None => {}
        }

        let mut oracle = self
            .oracles
            .get(&theorem.full_name)
            .unwrap_or(&self.default)
            .clone();
        oracle.counters = Some(Arc::clone(&self.counters));

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(oracle))
    }
}
