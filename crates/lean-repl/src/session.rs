use std::path::Path;

use crate::types::{LeanError, ProofState, SessionConfig, TacticResult};
use crate::worker::LeanWorker;

/// A proof session for one theorem, owning its own Pantograph process.
///
/// State IDs handed out by a session are only meaningful to that session.
/// Once a fatal error has been observed every later call fails fast with
/// [`LeanError::ProcessDied`] instead of talking to a broken process.
pub struct LeanSession {
    worker: LeanWorker,
    theorem: String,
    initial_state: ProofState,
    tactics_applied: u64,
    dead: bool,
}

impl LeanSession {
    /// Open a session on `theorem`, declared in `module` of the checkout at `project_dir`.
    pub async fn start(
        config: &SessionConfig,
        project_dir: &Path,
        module: &str,
        theorem: &str,
    ) -> Result<Self, LeanError> {
        let worker = LeanWorker::spawn(config, project_dir, module).await?;
        Self::from_worker(worker, theorem).await
    }

    /// Open a session on `theorem` using an already-spawned worker.
    pub async fn from_worker(mut worker: LeanWorker, theorem: &str) -> Result<Self, LeanError> {
        let state_id = worker.start_proof_by_name(theorem).await?;
        let initial_state = worker.print_goals(state_id).await?;

        tracing::debug!(
            theorem,
            state_id,
            goals = initial_state.goals.len(),
            "Started proof session"
        );

        Ok(Self {
            worker,
            theorem: theorem.to_string(),
            initial_state,
            tactics_applied: 0,
            dead: false,
        })
    }

    /// The theorem this session is proving.
    pub fn theorem(&self) -> &str {
        &self.theorem
    }

    /// Root state of the proof.
    pub fn initial_state(&self) -> &ProofState {
        &self.initial_state
    }

    /// Number of tactic applications attempted so far.
    pub fn tactics_applied(&self) -> u64 {
        self.tactics_applied
    }

    /// Apply `tactic` to `state`, which must have come from this session.
    pub async fn apply(
        &mut self,
        state: &ProofState,
        tactic: &str,
    ) -> Result<TacticResult, LeanError> {
        if self.dead {
            return Err(LeanError::ProcessDied);
        }
        self.tactics_applied += 1;

        let result = self.worker.apply_tactic(state.state_id, tactic).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::warn!(theorem = %self.theorem, error = %e, "Lean session lost");
                self.dead = true;
            }
        }
        result
    }

    /// Release the underlying process. Later calls fail with `ProcessDied`.
    pub async fn close(&mut self) {
        self.dead = true;
        tracing::debug!(
            theorem = %self.theorem,
            tactics = self.tactics_applied,
            "Closing proof session"
        );
        self.worker.shutdown().await;
    }
}
